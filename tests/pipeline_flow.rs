use std::fs;

use chrono::{DateTime, Utc};

use churn_engine::ChurnError;
use churn_engine::chest_features::TRAILING_FEATURE_NAMES;
use churn_engine::games_features::GAME_FEATURE_NAMES;
use churn_engine::labels::build_churn_labels;
use churn_engine::pipeline::{self, ChurnPipeline, aggregate_features_for_split};
use churn_engine::records::{ChestEvent, GameRecord, PlayerSlot};

// 2024-01-01 00:00:00 UTC; the horizon sits 120 days later.
const T0: i64 = 1_704_067_200;
const HORIZON: i64 = T0 + 120 * 86_400;

fn game(p0: &str, p1: &str, started: i64, winner: Option<&str>) -> GameRecord {
    let mut record = GameRecord {
        id: Some(format!("g-{started}-{p0}")),
        status: Some("ended".to_string()),
        started_at: Some(started),
        ended_at: Some(started + 360),
        winner: winner.map(str::to_string),
        is_rematch: Some(false),
        ..GameRecord::default()
    };
    record.users = [
        PlayerSlot {
            id: Some(p0.to_string()),
            ..PlayerSlot::default()
        },
        PlayerSlot {
            id: Some(p1.to_string()),
            ..PlayerSlot::default()
        },
    ];
    record.end_stats.total_points = [Some(40.0), Some(55.0)];
    record.end_stats.rating_points = [Some(-10.0), Some(10.0)];
    record
}

fn chest(user: &str, chest_type: &str, opened_with: &str, open_at: i64) -> ChestEvent {
    ChestEvent {
        user_id: Some(user.to_string()),
        chest_type: Some(chest_type.to_string()),
        opened_with: Some(opened_with.to_string()),
        open_at: Some(open_at),
        ..ChestEvent::default()
    }
}

fn horizon() -> DateTime<Utc> {
    DateTime::from_timestamp(HORIZON, 0).unwrap()
}

fn two_player_batch() -> (Vec<GameRecord>, Vec<ChestEvent>) {
    let games = vec![
        game("p1", "p2", HORIZON - 86_400, Some("p1")),
        game("p1", "p2", HORIZON, Some("p2")),
    ];
    let chests = vec![
        chest("p1", "common", "daily", HORIZON - 2 * 86_400),
        chest("p1", "common", "daily", HORIZON - 86_400),
    ];
    (games, chests)
}

fn fitted_two_player_pipeline() -> (ChurnPipeline, Vec<GameRecord>, Vec<ChestEvent>) {
    let (games, chests) = two_player_batch();
    let labels = build_churn_labels(&games, 60, None);
    let mut pipeline = ChurnPipeline::new();
    pipeline.fit(&games, &chests, &labels, horizon()).unwrap();
    (pipeline, games, chests)
}

#[test]
fn locked_schema_is_games_first_then_chests() {
    let (pipeline, _, _) = fitted_two_player_pipeline();
    let names = pipeline.feature_names().expect("fitted schema");

    let games_part: Vec<&str> = names[..GAME_FEATURE_NAMES.len()]
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(games_part, GAME_FEATURE_NAMES);

    assert!(names.iter().any(|n| n == "chest_common"));
    assert!(names.iter().any(|n| n == "open_with_daily"));

    let tail: Vec<&str> = names[names.len() - TRAILING_FEATURE_NAMES.len()..]
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(tail, TRAILING_FEATURE_NAMES);
}

#[test]
fn players_without_chests_join_as_zeros() {
    let (games, chests) = two_player_batch();
    let table = aggregate_features_for_split(&games, &chests, horizon());

    assert_eq!(table.index, vec!["p1", "p2"]);
    assert_eq!(table.value("p1", "total_chests"), Some(2.0));
    assert_eq!(table.value("p2", "total_chests"), Some(0.0));
    assert_eq!(table.value("p2", "chest_common"), Some(0.0));
    assert_eq!(table.value("p2", "days_since_last"), Some(0.0));
    assert_eq!(table.value("p2", "games_played"), Some(2.0));
}

#[test]
fn mixed_batch_aggregates_both_streams_per_player() {
    // Game A decided in 600s, game B still open, one chest for p1 only.
    let mut decided = game("p1", "p2", T0, Some("p1"));
    decided.ended_at = Some(T0 + 600);
    let mut open = game("p1", "p3", T0 + 3_600, None);
    open.ended_at = None;
    let chests = vec![chest("p1", "common", "daily", T0 + 100)];

    let table =
        aggregate_features_for_split(&[decided, open], &chests, horizon());

    assert_eq!(table.index, vec!["p1", "p2", "p3"]);
    assert_eq!(table.value("p1", "games_played"), Some(2.0));
    assert_eq!(table.value("p1", "wins"), Some(1.0));
    assert_eq!(table.value("p1", "winrate"), Some(0.5));
    assert_eq!(table.value("p1", "total_chests"), Some(1.0));
    assert_eq!(table.value("p1", "unique_chests"), Some(1.0));
    assert_eq!(table.value("p1", "chest_common"), Some(1.0));
    assert_eq!(table.value("p1", "open_with_daily"), Some(1.0));
    assert_eq!(table.value("p1", "daily_ratio"), Some(0.0));
    assert_eq!(table.value("p1", "paid_ratio"), Some(0.0));

    for absent in ["p2", "p3"] {
        assert_eq!(table.value(absent, "total_chests"), Some(0.0));
        assert_eq!(table.value(absent, "chest_common"), Some(0.0));
        assert_eq!(table.value(absent, "open_with_daily"), Some(0.0));
    }
}

#[test]
fn transform_reconciles_schema_drift() {
    let (pipeline, games, _) = fitted_two_player_pipeline();

    // New chest type in the scoring batch: the unseen column is dropped,
    // the known one keeps its position.
    let drifted = vec![
        chest("p1", "common", "daily", HORIZON - 86_400),
        chest("p1", "epic", "gems", HORIZON - 3_600),
    ];
    let table = pipeline.transform(&games, &drifted, horizon()).unwrap();
    assert_eq!(
        table.columns,
        pipeline.feature_names().unwrap().to_vec()
    );
    assert!(!table.columns.iter().any(|c| c == "chest_epic"));
    // Training counts were 2 and 0, so mean 1 and scale 1; one open in the
    // scoring batch standardizes to zero.
    assert_eq!(table.value("p1", "chest_common"), Some(0.0));

    // Only the unseen type in the batch: chest_common survives zero-filled,
    // chest_epic never enters the output.
    let epic_only = vec![chest("p1", "epic", "gems", HORIZON - 3_600)];
    let swapped = pipeline.transform(&games, &epic_only, horizon()).unwrap();
    assert!(swapped.columns.iter().any(|c| c == "chest_common"));
    assert!(!swapped.columns.iter().any(|c| c == "chest_epic"));
    assert_eq!(swapped.value("p1", "chest_common"), Some(-1.0));

    // No chests at all: every chest column zero-fills, then standardizes.
    let empty = pipeline.transform(&games, &[], horizon()).unwrap();
    assert_eq!(
        empty.columns,
        pipeline.feature_names().unwrap().to_vec()
    );
    assert_eq!(empty.value("p1", "chest_common"), Some(-1.0));
    assert_eq!(empty.value("p2", "chest_common"), Some(-1.0));
}

#[test]
fn identical_fits_predict_identically() {
    let (games, chests) = two_player_batch();
    let labels = build_churn_labels(&games, 60, None);

    let mut a = ChurnPipeline::new();
    a.fit(&games, &chests, &labels, horizon()).unwrap();
    let mut b = ChurnPipeline::new();
    b.fit(&games, &chests, &labels, horizon()).unwrap();

    assert_eq!(
        a.predict_proba(&games, &chests, horizon()).unwrap(),
        b.predict_proba(&games, &chests, horizon()).unwrap()
    );
}

#[test]
fn lapsed_players_score_above_active_ones() {
    let actives = ["a1", "a2", "a3", "a4"];
    let lapsed = ["c1", "c2"];

    let mut games = Vec::new();
    for week in 0..8i64 {
        let started = HORIZON - week * 7 * 86_400;
        let winner = if week % 2 == 0 { "a1" } else { "a2" };
        games.push(game("a1", "a2", started, Some(winner)));
        games.push(game("a3", "a4", started, Some("a3")));
    }
    games.push(game("c1", "c2", HORIZON - 100 * 86_400, Some("c1")));

    let mut chests = Vec::new();
    for player in &actives {
        for k in 0..5i64 {
            chests.push(chest(player, "common", "daily", HORIZON - k * 86_400));
        }
    }

    let labels = build_churn_labels(&games, 60, None);
    for player in &actives {
        assert_eq!(labels.by_player.get(*player), Some(&0));
    }
    for player in &lapsed {
        assert_eq!(labels.by_player.get(*player), Some(&1));
    }

    let mut pipeline = ChurnPipeline::new();
    pipeline.fit(&games, &chests, &labels, horizon()).unwrap();
    let probs = pipeline.predict_proba(&games, &chests, horizon()).unwrap();

    let max_active = actives
        .iter()
        .map(|p| probs[*p])
        .fold(f64::MIN, f64::max);
    let min_lapsed = lapsed.iter().map(|p| probs[*p]).fold(f64::MAX, f64::min);
    assert!(
        min_lapsed > max_active,
        "lapsed {min_lapsed} should exceed active {max_active}"
    );
}

#[test]
fn unfitted_and_empty_batches_fail_loudly() {
    let pipeline = ChurnPipeline::new();
    assert!(matches!(
        pipeline.transform(&[], &[], horizon()),
        Err(ChurnError::NotFitted)
    ));

    let (fitted, _, chests) = fitted_two_player_pipeline();
    let invalid_only = vec![game("unknown", "none", HORIZON, None)];
    assert!(matches!(
        fitted.transform(&invalid_only, &chests, horizon()),
        Err(ChurnError::EmptyInput(_))
    ));
}

#[test]
fn saved_artifact_reloads_and_reproduces_scores() {
    let (pipeline, games, chests) = fitted_two_player_pipeline();

    let mut artifact = pipeline.to_artifact(horizon()).unwrap();
    artifact.window_days = 60;
    artifact.source = Some("pipeline_flow test".to_string());

    let path = std::env::temp_dir().join(format!("churn_artifact_{}.json", std::process::id()));
    pipeline::save_artifact(&artifact, &path).unwrap();
    let reloaded = pipeline::load_pipeline(&path).unwrap();
    fs::remove_file(&path).ok();

    assert_eq!(
        reloaded.predict_proba(&games, &chests, horizon()).unwrap(),
        pipeline.predict_proba(&games, &chests, horizon()).unwrap()
    );

    let missing = pipeline::load_artifact(&path);
    assert!(missing.is_err());
}
