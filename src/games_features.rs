use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};

use crate::feature_table::FeatureTable;
use crate::records::{GameRecord, valid_player_id};

/// Output columns, in emission order.
pub const GAME_FEATURE_NAMES: [&str; 14] = [
    "games_played",
    "wins",
    "rematch_rate",
    "avg_duration_sec",
    "avg_points",
    "avg_highest_break",
    "avg_pot_success",
    "avg_shot_time",
    "avg_table_time",
    "avg_rating_delta",
    "user_account_age_days",
    "start_hour_mode",
    "start_dow_mode",
    "winrate",
];

const SECONDS_PER_DAY: f64 = 86_400.0;
const MAX_ACCOUNT_AGE_DAYS: f64 = 3_650.0;

/// One long-format row: a single player slot of a single game, carrying
/// that slot's own end-stat values under shared names.
#[derive(Debug, Clone)]
struct SlotRow {
    player_id: String,
    is_rematch: f64,
    is_win: f64,
    duration_sec: f64,
    total_points: f64,
    highest_break: f64,
    pot_success: f64,
    shot_time: f64,
    table_time: f64,
    rating_delta: f64,
    start_hour: i64,
    start_dow: i64,
    account_age_days: f64,
}

#[derive(Debug, Clone, Default)]
struct PlayerGameAgg {
    games: u32,
    wins: f64,
    rematch_sum: f64,
    duration_sum: f64,
    points_sum: f64,
    break_sum: f64,
    pot_sum: f64,
    shot_sum: f64,
    table_sum: f64,
    rating_sum: f64,
    age_sum: f64,
    hour_counts: BTreeMap<i64, u32>,
    dow_counts: BTreeMap<i64, u32>,
}

impl PlayerGameAgg {
    fn push(&mut self, row: &SlotRow) {
        self.games = self.games.saturating_add(1);
        self.wins += row.is_win;
        self.rematch_sum += row.is_rematch;
        self.duration_sum += row.duration_sec;
        self.points_sum += row.total_points;
        self.break_sum += row.highest_break;
        self.pot_sum += row.pot_success;
        self.shot_sum += row.shot_time;
        self.table_sum += row.table_time;
        self.rating_sum += row.rating_delta;
        self.age_sum += row.account_age_days;
        *self.hour_counts.entry(row.start_hour).or_insert(0) += 1;
        *self.dow_counts.entry(row.start_dow).or_insert(0) += 1;
    }

    fn features(&self) -> Vec<f64> {
        let games = self.games as f64;
        let n = games.max(1.0);
        vec![
            games,
            self.wins,
            self.rematch_sum / n,
            (self.duration_sum / n).clamp(0.0, SECONDS_PER_DAY),
            (self.points_sum / n).clamp(0.0, 1e6),
            (self.break_sum / n).clamp(0.0, 1e5),
            self.pot_sum / n,
            self.shot_sum / n,
            self.table_sum / n,
            (self.rating_sum / n).clamp(-1e4, 1e4),
            (self.age_sum / n).clamp(0.0, MAX_ACCOUNT_AGE_DAYS),
            mode(&self.hour_counts),
            mode(&self.dow_counts),
            self.wins / n,
        ]
    }
}

/// Aggregates a game batch into one numeric row per valid player id found in
/// either slot. Stateless; an empty batch yields an empty table.
pub fn extract(games: &[GameRecord]) -> FeatureTable {
    let mut aggs: BTreeMap<String, PlayerGameAgg> = BTreeMap::new();
    for record in games {
        for row in slot_rows(record) {
            aggs.entry(row.player_id.clone()).or_default().push(&row);
        }
    }

    let by_player = aggs
        .into_iter()
        .map(|(id, agg)| (id, agg.features()))
        .collect();
    let columns = GAME_FEATURE_NAMES.iter().map(|c| c.to_string()).collect();
    let mut table = FeatureTable::from_rows(columns, by_player);
    table.sanitize();
    table
}

/// Most frequent value; ties break toward the smallest value, an empty
/// group toward -1.
fn mode(counts: &BTreeMap<i64, u32>) -> f64 {
    let mut best: Option<(i64, u32)> = None;
    for (&value, &count) in counts {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((value, count)),
        }
    }
    best.map(|(value, _)| value as f64).unwrap_or(-1.0)
}

fn slot_rows(record: &GameRecord) -> Vec<SlotRow> {
    let started = record.started_at.and_then(|s| DateTime::from_timestamp(s, 0));
    let ended = record.ended_at.and_then(|s| DateTime::from_timestamp(s, 0));

    let duration_sec = match (started, ended) {
        (Some(s), Some(e)) => ((e - s).num_seconds() as f64).max(0.0),
        _ => 0.0,
    };
    let start_hour = started.map(|dt| dt.hour() as i64).unwrap_or(-1);
    let start_dow = started
        .map(|dt| dt.weekday().num_days_from_monday() as i64)
        .unwrap_or(-1);

    let is_rematch = if record.is_rematch.unwrap_or(false) {
        1.0
    } else {
        0.0
    };
    // A decided game marks every participant; the winner field itself only
    // signals presence.
    let is_win = if record.winner.is_some() { 1.0 } else { 0.0 };

    let stats = &record.end_stats;
    let mut out = Vec::with_capacity(2);
    for slot in 0..2 {
        let Some(player_id) = valid_player_id(record.users[slot].id.as_deref()) else {
            continue;
        };
        out.push(SlotRow {
            player_id: player_id.to_string(),
            is_rematch,
            is_win,
            duration_sec,
            total_points: stats.total_points[slot].unwrap_or(0.0),
            highest_break: stats.highest_break[slot].unwrap_or(0.0),
            pot_success: stats.pot_success[slot].unwrap_or(0.0),
            shot_time: stats.shot_time[slot].unwrap_or(0.0),
            table_time: stats.table_time[slot].unwrap_or(0.0),
            rating_delta: stats.rating_points[slot].unwrap_or(0.0),
            start_hour,
            start_dow,
            account_age_days: account_age_days(started, record.users[slot].created_at.as_deref()),
        });
    }
    out
}

fn account_age_days(started: Option<DateTime<Utc>>, created_raw: Option<&str>) -> f64 {
    let (Some(started), Some(created)) = (started, created_raw.and_then(parse_account_stamp))
    else {
        return 0.0;
    };
    (started.naive_utc() - created).num_days() as f64
}

fn parse_account_stamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{EndStats, PlayerSlot};

    // 2024-01-01 00:00:00 UTC, a Monday.
    const T0: i64 = 1_704_067_200;

    fn game(p0: &str, p1: &str, started: Option<i64>, ended: Option<i64>) -> GameRecord {
        GameRecord {
            started_at: started,
            ended_at: ended,
            users: [
                PlayerSlot {
                    id: Some(p0.to_string()),
                    ..PlayerSlot::default()
                },
                PlayerSlot {
                    id: Some(p1.to_string()),
                    ..PlayerSlot::default()
                },
            ],
            ..GameRecord::default()
        }
    }

    #[test]
    fn one_row_per_distinct_valid_player() {
        let mut decided = game("p1", "p2", Some(T0), Some(T0 + 600));
        decided.winner = Some("p1".to_string());
        let open = game("p1", "p3", Some(T0 + 3600), None);

        let table = extract(&[decided, open]);
        assert_eq!(table.index, vec!["p1", "p2", "p3"]);
        assert_eq!(table.value("p1", "games_played"), Some(2.0));
        assert_eq!(table.value("p1", "wins"), Some(1.0));
        assert_eq!(table.value("p1", "winrate"), Some(0.5));
        assert_eq!(table.value("p1", "avg_duration_sec"), Some(300.0));
        assert_eq!(table.value("p3", "games_played"), Some(1.0));
        assert_eq!(table.value("p3", "wins"), Some(0.0));
    }

    #[test]
    fn invalid_ids_are_dropped_before_grouping() {
        let table = extract(&[
            game("unknown", "p1", Some(T0), None),
            game("nan", "None", Some(T0), None),
        ]);
        assert_eq!(table.index, vec!["p1"]);
    }

    #[test]
    fn empty_and_all_invalid_batches_produce_empty_tables() {
        assert!(extract(&[]).is_empty());
        assert!(extract(&[game("unknown", "nan", Some(T0), None)]).is_empty());
    }

    #[test]
    fn duration_clamps_to_zero_when_end_precedes_start() {
        let table = extract(&[game("p1", "p2", Some(T0 + 600), Some(T0))]);
        assert_eq!(table.value("p1", "avg_duration_sec"), Some(0.0));
    }

    #[test]
    fn missing_start_time_yields_sentinel_hour_and_dow() {
        let table = extract(&[game("p1", "p2", None, None)]);
        assert_eq!(table.value("p1", "start_hour_mode"), Some(-1.0));
        assert_eq!(table.value("p1", "start_dow_mode"), Some(-1.0));
    }

    #[test]
    fn mode_tie_breaks_toward_the_smallest_value() {
        // One game at hour 0 (Monday) and one at hour 14 (Wednesday): a tie,
        // so the smaller value wins.
        let table = extract(&[
            game("p1", "p2", Some(T0), None),
            game("p1", "p2", Some(T0 + 2 * 86_400 + 14 * 3600), None),
        ]);
        assert_eq!(table.value("p1", "start_hour_mode"), Some(0.0));
        assert_eq!(table.value("p1", "start_dow_mode"), Some(0.0));
    }

    #[test]
    fn account_age_averages_in_days_at_match_start() {
        let mut g = game("p1", "p2", Some(T0), None);
        g.users[0].created_at = Some("2023-12-22".to_string());
        let table = extract(&[g]);
        assert_eq!(table.value("p1", "user_account_age_days"), Some(10.0));
        // Slot 1 has no creation stamp, so age defaults to 0.
        assert_eq!(table.value("p2", "user_account_age_days"), Some(0.0));
    }

    #[test]
    fn slot_metrics_pool_across_seats() {
        let mut a = game("p1", "p2", Some(T0), None);
        a.end_stats = EndStats {
            total_points: [Some(40.0), Some(10.0)],
            ..EndStats::default()
        };
        let mut b = game("p3", "p1", Some(T0), None);
        b.end_stats = EndStats {
            total_points: [Some(5.0), Some(20.0)],
            ..EndStats::default()
        };

        let table = extract(&[a, b]);
        assert_eq!(table.value("p1", "avg_points"), Some(30.0));
        assert_eq!(table.value("p2", "avg_points"), Some(10.0));
        assert_eq!(table.value("p3", "avg_points"), Some(5.0));
    }

    #[test]
    fn averages_clip_to_fixed_bounds() {
        let mut g = game("p1", "p2", Some(T0), None);
        g.end_stats = EndStats {
            total_points: [Some(5e7), Some(0.0)],
            rating_points: [Some(-9e9), Some(9e9)],
            ..EndStats::default()
        };
        let table = extract(&[g]);
        assert_eq!(table.value("p1", "avg_points"), Some(1e6));
        assert_eq!(table.value("p1", "avg_rating_delta"), Some(-1e4));
        assert_eq!(table.value("p2", "avg_rating_delta"), Some(1e4));
    }
}
