use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde_json::Value;

use churn_engine::labels::build_churn_labels;
use churn_engine::metrics::evaluate_binary;
use churn_engine::pipeline::{
    self, ChurnPipeline, ValidationSnapshot, aggregate_features_for_split,
};
use churn_engine::records::{ChestEvent, GameRecord, valid_player_id};
use churn_engine::serving::{chests_from_json, games_from_json};
use churn_engine::split::stratified_split;

const DEFAULT_GAMES_PATH: &str = "data/online-games.json";
const DEFAULT_CHESTS_PATH: &str = "data/chests.json";
const DEFAULT_WINDOW_DAYS: i64 = 60;
const DEFAULT_TEST_FRACTION: f64 = 0.2;
const DEFAULT_SPLIT_SEED: u64 = 42;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let games_path = parse_path_arg("--games")
        .or_else(|| std::env::var("CHURN_GAMES_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_GAMES_PATH));
    let chests_path = parse_path_arg("--chests")
        .or_else(|| std::env::var("CHURN_CHESTS_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CHESTS_PATH));
    let out_path = parse_path_arg("--out")
        .or_else(|| std::env::var("CHURN_ARTIFACT_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(pipeline::DEFAULT_ARTIFACT_PATH));
    let window_days = parse_i64_arg("--window-days")
        .or_else(|| env_parse_i64("CHURN_WINDOW_DAYS"))
        .unwrap_or(DEFAULT_WINDOW_DAYS)
        .max(1);
    let test_fraction = parse_f64_arg("--test-fraction")
        .or_else(|| env_parse_f64("CHURN_TEST_FRACTION"))
        .unwrap_or(DEFAULT_TEST_FRACTION)
        .clamp(0.0, 0.9);
    let seed = parse_u64_arg("--seed")
        .or_else(|| env_parse_u64("CHURN_SPLIT_SEED"))
        .unwrap_or(DEFAULT_SPLIT_SEED);

    let games = games_from_json(&read_json_array(&games_path)?);
    let chests = chests_from_json(&read_json_array(&chests_path)?);
    if games.is_empty() {
        return Err(anyhow!("no game records in {}", games_path.display()));
    }
    eprintln!(
        "[INFO] loaded {} games and {} chest events",
        games.len(),
        chests.len()
    );

    let now = Utc::now();
    let labels = build_churn_labels(&games, window_days, None);
    if labels.is_empty() {
        return Err(anyhow!("no labelable players in {}", games_path.display()));
    }
    eprintln!(
        "[INFO] {} players labeled, {} churned, window {} days",
        labels.len(),
        labels.positives(),
        window_days
    );

    // Split on player ids before any fitting so validation players never
    // contribute to the scaler or the weights.
    let features = aggregate_features_for_split(&games, &chests, now);
    let pairs: Vec<(String, u8)> = features
        .index
        .iter()
        .filter_map(|id| labels.by_player.get(id).map(|&y| (id.clone(), y)))
        .collect();
    if pairs.is_empty() {
        return Err(anyhow!("no labeled players intersect the feature table"));
    }
    let (train_ids, test_ids) = stratified_split(&pairs, test_fraction, seed);
    if train_ids.is_empty() {
        return Err(anyhow!("train split is empty; lower --test-fraction"));
    }

    let train_set: HashSet<&str> = train_ids.iter().map(String::as_str).collect();
    let test_set: HashSet<&str> = test_ids.iter().map(String::as_str).collect();
    let train_labels = labels.subset(train_ids.iter().map(String::as_str));

    let train_pos = train_labels.positives();
    let train_neg = train_labels.len() - train_pos;
    let scale_pos_weight = if train_pos > 0 {
        train_neg as f64 / train_pos as f64
    } else {
        1.0
    };

    let mut model = ChurnPipeline::with_scale_pos_weight(scale_pos_weight);
    model.fit(
        &filter_games(&games, &train_set),
        &filter_chests(&chests, &train_set),
        &train_labels,
        now,
    )?;
    eprintln!(
        "[INFO] fitted on {} players (scale_pos_weight {:.2})",
        model.trained_players(),
        scale_pos_weight
    );

    let validation = if test_set.is_empty() {
        eprintln!("[INFO] validation skipped: empty test split");
        None
    } else {
        let probs = model.predict_proba(
            &filter_games(&games, &test_set),
            &filter_chests(&chests, &test_set),
            now,
        )?;
        let mut scored = Vec::new();
        let mut truth = Vec::new();
        for id in &test_ids {
            if let (Some(&p), Some(&y)) = (probs.get(id), labels.by_player.get(id)) {
                scored.push(p);
                truth.push(y);
            }
        }
        let report = evaluate_binary(&scored, &truth);
        println!("validation samples: {}", report.samples);
        println!(
            "accuracy {:.3}  log loss {:.3}  brier {:.3}",
            report.accuracy, report.log_loss, report.brier
        );
        println!(
            "retained  precision {:.3}  recall {:.3}  f1 {:.3}  support {}",
            report.negative.precision,
            report.negative.recall,
            report.negative.f1,
            report.negative.support
        );
        println!(
            "churned   precision {:.3}  recall {:.3}  f1 {:.3}  support {}",
            report.positive.precision,
            report.positive.recall,
            report.positive.f1,
            report.positive.support
        );
        println!("roc auc {:.3}", report.roc_auc);
        Some(ValidationSnapshot {
            samples: report.samples,
            accuracy: report.accuracy,
            log_loss: report.log_loss,
            roc_auc: report.roc_auc,
        })
    };

    let mut artifact = model.to_artifact(now)?;
    artifact.window_days = window_days;
    artifact.source = Some(format!(
        "{} + {}",
        games_path.display(),
        chests_path.display()
    ));
    artifact.validation = validation;
    pipeline::save_artifact(&artifact, &out_path)?;

    println!("churn pipeline written: {}", out_path.display());
    Ok(())
}

fn read_json_array(path: &Path) -> Result<Vec<Value>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(anyhow!("{} is not a json array", path.display())),
    }
}

/// Keeps the games in which any slot belongs to the given players. A game
/// between a kept and a dropped player stays; its rows for the dropped
/// player are ignored later through the label intersection.
fn filter_games(games: &[GameRecord], keep: &HashSet<&str>) -> Vec<GameRecord> {
    games
        .iter()
        .filter(|game| {
            game.users
                .iter()
                .filter_map(|slot| valid_player_id(slot.id.as_deref()))
                .any(|id| keep.contains(id))
        })
        .cloned()
        .collect()
}

fn filter_chests(chests: &[ChestEvent], keep: &HashSet<&str>) -> Vec<ChestEvent> {
    chests
        .iter()
        .filter(|event| {
            valid_player_id(event.user_id.as_deref()).is_some_and(|id| keep.contains(id))
        })
        .cloned()
        .collect()
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(v) = arg.strip_prefix(&format!("{name}="))
            && !v.trim().is_empty()
        {
            return Some(PathBuf::from(v));
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next));
        }
    }
    None
}

fn parse_i64_arg(name: &str) -> Option<i64> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<i64>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<i64>()
        {
            return Some(v);
        }
    }
    None
}

fn parse_u64_arg(name: &str) -> Option<u64> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<u64>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<u64>()
        {
            return Some(v);
        }
    }
    None
}

fn parse_f64_arg(name: &str) -> Option<f64> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<f64>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<f64>()
        {
            return Some(v);
        }
    }
    None
}

fn env_parse_i64(key: &str) -> Option<i64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_parse_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_parse_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
