//! Wire-format adaptation for scoring payloads.
//!
//! Incoming games and chest events arrive as arbitrarily nested JSON. Each
//! object is flattened to dotted keys (`users.0._id`, `score.1`), reconciled
//! against the fixed ingestion columns (missing keys become null, unknown
//! keys are dropped), and only then coerced into typed records. The column
//! lists are the serving-side contract and must not be reordered.

use std::collections::BTreeMap;

use anyhow::Context;
use serde_json::Value;

use crate::records::{ChestEvent, EndStats, GameRecord, PlayerSlot};

pub const GAMES_COLUMNS: [&str; 44] = [
    "_id",
    "game_mode",
    "creator_id",
    "status",
    "started_at",
    "ended_at",
    "winner",
    "score.0",
    "score.1",
    "frames_count",
    "isRematch",
    "updated_at",
    "created_at",
    "end_stats.rating_points.0",
    "end_stats.rating_points.1",
    "end_stats.highest_break.0",
    "end_stats.highest_break.1",
    "end_stats.balls_potted.0",
    "end_stats.balls_potted.1",
    "end_stats.total_points.0",
    "end_stats.total_points.1",
    "end_stats.table_time.0",
    "end_stats.table_time.1",
    "end_stats.pot_success.0",
    "end_stats.pot_success.1",
    "end_stats.shot_time.0",
    "end_stats.shot_time.1",
    "end_stats.game_id",
    "end_stats.updated_at",
    "end_stats.created_at",
    "users.0._id",
    "users.0.username",
    "users.0.created_at",
    "users.0.seconds_in_game",
    "users.0.online.online_sessions",
    "users.0.online_game_rating.value",
    "users.0.energy.count",
    "users.1._id",
    "users.1.username",
    "users.1.created_at",
    "users.1.seconds_in_game",
    "users.1.online.online_sessions",
    "users.1.online_game_rating.value",
    "users.1.energy.count",
];

pub const CHESTS_COLUMNS: [&str; 5] = [
    "user._id",
    "user.username",
    "chest.type",
    "opened_with",
    "open_at",
];

/// Parsed scoring request: both streams, already in typed form.
#[derive(Debug, Clone)]
pub struct ScoringPayload {
    pub games: Vec<GameRecord>,
    pub chests: Vec<ChestEvent>,
}

/// Parses a raw scoring request body. Both `games` and `chests` must be
/// present as arrays; either may be empty.
pub fn parse_scoring_payload(raw: &str) -> anyhow::Result<ScoringPayload> {
    let value: Value = serde_json::from_str(raw).context("parse scoring payload json")?;
    let games = value
        .get("games")
        .and_then(Value::as_array)
        .context("scoring payload is missing a games array")?;
    let chests = value
        .get("chests")
        .and_then(Value::as_array)
        .context("scoring payload is missing a chests array")?;
    Ok(ScoringPayload {
        games: games_from_json(games),
        chests: chests_from_json(chests),
    })
}

/// Flattens nested objects and arrays to dotted keys. Object fields recurse
/// (`end_stats.rating_points`); array items recurse only when they are
/// objects, otherwise the item lands verbatim at `key.index`. A non-object
/// top level flattens to nothing.
pub fn flatten_json(value: &Value) -> BTreeMap<String, Value> {
    let mut flat = BTreeMap::new();
    if let Value::Object(fields) = value {
        for (key, field) in fields {
            flatten_into(key.clone(), field, &mut flat);
        }
    }
    flat
}

fn flatten_into(key: String, value: &Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(fields) => {
            for (name, field) in fields {
                flatten_into(format!("{key}.{name}"), field, out);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let indexed = format!("{key}.{i}");
                if item.is_object() {
                    flatten_into(indexed, item, out);
                } else {
                    out.insert(indexed, item.clone());
                }
            }
        }
        other => {
            out.insert(key, other.clone());
        }
    }
}

/// Projects a flattened object onto the given columns, in order. Missing
/// columns become null; keys outside the list are dropped.
pub fn reindex_row(flat: &BTreeMap<String, Value>, columns: &[&str]) -> Vec<Value> {
    columns
        .iter()
        .map(|col| flat.get(*col).cloned().unwrap_or(Value::Null))
        .collect()
}

pub fn game_from_json(value: &Value) -> GameRecord {
    let flat = flatten_json(value);
    let row = RowView {
        columns: &GAMES_COLUMNS,
        values: reindex_row(&flat, &GAMES_COLUMNS),
    };

    let slot = |n: usize| PlayerSlot {
        id: row.str_field(&format!("users.{n}._id")),
        username: row.str_field(&format!("users.{n}.username")),
        created_at: row.str_field(&format!("users.{n}.created_at")),
        seconds_in_game: row.f64_field(&format!("users.{n}.seconds_in_game")),
        online_sessions: row.f64_field(&format!("users.{n}.online.online_sessions")),
        rating: row.f64_field(&format!("users.{n}.online_game_rating.value")),
        energy: row.f64_field(&format!("users.{n}.energy.count")),
    };

    GameRecord {
        id: row.str_field("_id"),
        game_mode: row.str_field("game_mode"),
        creator_id: row.str_field("creator_id"),
        status: row.str_field("status"),
        started_at: row.epoch_field("started_at"),
        ended_at: row.epoch_field("ended_at"),
        winner: row.str_field("winner"),
        score: [row.f64_field("score.0"), row.f64_field("score.1")],
        frames_count: row.f64_field("frames_count"),
        is_rematch: row.bool_field("isRematch"),
        created_at: row.epoch_field("created_at"),
        updated_at: row.epoch_field("updated_at"),
        users: [slot(0), slot(1)],
        end_stats: EndStats {
            rating_points: row.pair("end_stats.rating_points"),
            highest_break: row.pair("end_stats.highest_break"),
            balls_potted: row.pair("end_stats.balls_potted"),
            total_points: row.pair("end_stats.total_points"),
            table_time: row.pair("end_stats.table_time"),
            pot_success: row.pair("end_stats.pot_success"),
            shot_time: row.pair("end_stats.shot_time"),
            game_id: row.str_field("end_stats.game_id"),
            created_at: row.str_field("end_stats.created_at"),
            updated_at: row.str_field("end_stats.updated_at"),
        },
    }
}

pub fn games_from_json(values: &[Value]) -> Vec<GameRecord> {
    values.iter().map(game_from_json).collect()
}

pub fn chest_from_json(value: &Value) -> ChestEvent {
    let flat = flatten_json(value);
    let row = RowView {
        columns: &CHESTS_COLUMNS,
        values: reindex_row(&flat, &CHESTS_COLUMNS),
    };
    ChestEvent {
        user_id: row.str_field("user._id"),
        username: row.str_field("user.username"),
        chest_type: row.str_field("chest.type"),
        opened_with: row.str_field("opened_with"),
        open_at: row.epoch_field("open_at"),
    }
}

pub fn chests_from_json(values: &[Value]) -> Vec<ChestEvent> {
    values.iter().map(chest_from_json).collect()
}

/// A reindexed row plus the column list it was projected onto. Lookup is a
/// linear scan over at most the games column list.
struct RowView {
    columns: &'static [&'static str],
    values: Vec<Value>,
}

impl RowView {
    fn field(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|col| *col == name)
            .map(|i| &self.values[i])
    }

    fn str_field(&self, name: &str) -> Option<String> {
        self.field(name).and_then(as_str_any)
    }

    fn f64_field(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(as_f64_any)
    }

    fn epoch_field(&self, name: &str) -> Option<i64> {
        self.field(name).and_then(as_epoch_any)
    }

    fn bool_field(&self, name: &str) -> Option<bool> {
        self.field(name).and_then(as_bool_any)
    }

    fn pair(&self, base: &str) -> [Option<f64>; 2] {
        [
            self.f64_field(&format!("{base}.0")),
            self.f64_field(&format!("{base}.1")),
        ]
    }
}

fn as_str_any(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_f64_any(v: &Value) -> Option<f64> {
    if let Some(f) = v.as_f64() {
        return Some(f);
    }
    v.as_str()?.trim().parse::<f64>().ok()
}

fn as_epoch_any(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    if let Some(f) = v.as_f64() {
        return f.is_finite().then_some(f.trunc() as i64);
    }
    let s = v.as_str()?.trim();
    if let Ok(n) = s.parse::<i64>() {
        return Some(n);
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(|f| f.trunc() as i64)
}

fn as_bool_any(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
