use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Utc};

use crate::feature_table::FeatureTable;
use crate::records::{ChestEvent, valid_player_id};

/// Leading fixed columns; the dynamic `chest_*` / `open_with_*` count
/// columns slot in between these and [`TRAILING_FEATURE_NAMES`].
pub const LEADING_FEATURE_NAMES: [&str; 6] = [
    "total_chests",
    "unique_chests",
    "last_open_dow",
    "last_open_month",
    "first_open_dow",
    "first_open_month",
];

pub const TRAILING_FEATURE_NAMES: [&str; 6] = [
    "days_between_first_last",
    "days_since_last",
    "avg_chests_per_day",
    "open_with_paid",
    "paid_ratio",
    "daily_ratio",
];

pub const CHEST_TYPE_PREFIX: &str = "chest_";
pub const OPEN_WITH_PREFIX: &str = "open_with_";

const MAX_TOTAL_CHESTS: f64 = 1e5;
const MAX_SPAN_DAYS: f64 = 1_825.0;

#[derive(Debug, Clone, Default)]
struct PlayerChestAgg {
    total: u32,
    type_counts: BTreeMap<String, u32>,
    method_counts: BTreeMap<String, u32>,
    first_open: Option<DateTime<Utc>>,
    last_open: Option<DateTime<Utc>>,
}

impl PlayerChestAgg {
    fn push(&mut self, chest_type: String, method: String, open_at: Option<DateTime<Utc>>) {
        self.total = self.total.saturating_add(1);
        *self.type_counts.entry(chest_type).or_insert(0) += 1;
        *self.method_counts.entry(method).or_insert(0) += 1;
        if let Some(at) = open_at {
            self.first_open = Some(self.first_open.map_or(at, |cur| cur.min(at)));
            self.last_open = Some(self.last_open.map_or(at, |cur| cur.max(at)));
        }
    }

    fn features(&self, all_types: &BTreeSet<String>, all_methods: &BTreeSet<String>, now: DateTime<Utc>) -> Vec<f64> {
        let total = (self.total as f64).clamp(0.0, MAX_TOTAL_CHESTS);

        let days_between = match (self.first_open, self.last_open) {
            (Some(first), Some(last)) => ((last - first).num_days() as f64).clamp(0.0, MAX_SPAN_DAYS),
            _ => 0.0,
        };
        let days_since_last = self
            .last_open
            .map(|last| ((now - last).num_days() as f64).clamp(0.0, MAX_SPAN_DAYS))
            .unwrap_or(0.0);

        let paid = (self.method_count("store") + self.method_count("gems")) as f64;
        let daily = self.type_count("daily") as f64;

        let mut row = vec![
            total,
            self.type_counts.len() as f64,
            dow_or_sentinel(self.last_open),
            month_or_sentinel(self.last_open),
            dow_or_sentinel(self.first_open),
            month_or_sentinel(self.first_open),
        ];
        for chest_type in all_types {
            row.push(self.type_count(chest_type) as f64);
        }
        for method in all_methods {
            row.push(self.method_count(method) as f64);
        }
        row.extend([
            days_between,
            days_since_last,
            total / days_between.max(1.0),
            paid,
            paid / total.max(1.0),
            daily / total.max(1.0),
        ]);
        row
    }

    fn type_count(&self, chest_type: &str) -> u32 {
        self.type_counts.get(chest_type).copied().unwrap_or(0)
    }

    fn method_count(&self, method: &str) -> u32 {
        self.method_counts.get(method).copied().unwrap_or(0)
    }
}

/// Aggregates a chest-event batch into one row per valid player id. The
/// `chest_*` and `open_with_*` count columns are batch-dependent: one per
/// distinct category observed, in sorted order. `now` anchors the recency
/// features; callers own the clock.
pub fn extract(chests: &[ChestEvent], now: DateTime<Utc>) -> FeatureTable {
    let mut aggs: BTreeMap<String, PlayerChestAgg> = BTreeMap::new();
    let mut all_types = BTreeSet::new();
    let mut all_methods = BTreeSet::new();

    for event in chests {
        let Some(player_id) = valid_player_id(event.user_id.as_deref()) else {
            continue;
        };
        let chest_type = normalize_category(event.chest_type.as_deref());
        let method = normalize_method(event.opened_with.as_deref());
        let open_at = event.open_at.and_then(|s| DateTime::from_timestamp(s, 0));

        all_types.insert(chest_type.clone());
        all_methods.insert(method.clone());
        aggs.entry(player_id.to_string())
            .or_default()
            .push(chest_type, method, open_at);
    }

    let columns = feature_names(&all_types, &all_methods);
    let by_player = aggs
        .into_iter()
        .map(|(id, agg)| (id, agg.features(&all_types, &all_methods, now)))
        .collect();
    let mut table = FeatureTable::from_rows(columns, by_player);
    table.sanitize();
    table
}

pub fn feature_names(types: &BTreeSet<String>, methods: &BTreeSet<String>) -> Vec<String> {
    let mut columns: Vec<String> = LEADING_FEATURE_NAMES.iter().map(|c| c.to_string()).collect();
    columns.extend(types.iter().map(|t| format!("{CHEST_TYPE_PREFIX}{t}")));
    columns.extend(methods.iter().map(|m| format!("{OPEN_WITH_PREFIX}{m}")));
    columns.extend(TRAILING_FEATURE_NAMES.iter().map(|c| c.to_string()));
    columns
}

fn normalize_category(raw: Option<&str>) -> String {
    let norm = raw.unwrap_or("unknown").trim().to_lowercase();
    if norm.is_empty() {
        "unknown".to_string()
    } else {
        norm
    }
}

/// Acquisition method, with storefront aliases folded to one spelling.
fn normalize_method(raw: Option<&str>) -> String {
    let norm = normalize_category(raw);
    match norm.as_str() {
        "game store" | "gamestore" | "shop" => "store".to_string(),
        _ => norm,
    }
}

fn dow_or_sentinel(at: Option<DateTime<Utc>>) -> f64 {
    at.map(|dt| dt.weekday().num_days_from_monday() as f64)
        .unwrap_or(-1.0)
}

fn month_or_sentinel(at: Option<DateTime<Utc>>) -> f64 {
    at.map(|dt| dt.month() as f64).unwrap_or(-1.0)
}
