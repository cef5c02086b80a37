use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::records::{GameRecord, valid_player_id};

/// Binary churn labels keyed by player id, plus the reference horizon they
/// were computed against.
#[derive(Debug, Clone)]
pub struct ChurnLabels {
    pub by_player: BTreeMap<String, u8>,
    pub reference_date: Option<DateTime<Utc>>,
    pub window_days: i64,
}

impl ChurnLabels {
    pub fn positives(&self) -> usize {
        self.by_player.values().filter(|&&y| y == 1).count()
    }

    pub fn len(&self) -> usize {
        self.by_player.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_player.is_empty()
    }

    /// Labels restricted to the given ids, horizon unchanged.
    pub fn subset<'a, I>(&self, ids: I) -> ChurnLabels
    where
        I: IntoIterator<Item = &'a str>,
    {
        let by_player = ids
            .into_iter()
            .filter_map(|id| self.by_player.get(id).map(|&y| (id.to_string(), y)))
            .collect();
        ChurnLabels {
            by_player,
            reference_date: self.reference_date,
            window_days: self.window_days,
        }
    }
}

/// Labels every valid player id appearing in either slot: churn = 1 when the
/// player's most recent match start precedes the reference date by strictly
/// more than `window_days`.
///
/// The reference date defaults to the latest parseable match start in the
/// whole batch, so players active right at the horizon can never be labeled
/// churned. That ceiling is part of the label definition; pass an explicit
/// `reference_date` to measure against a different point.
pub fn build_churn_labels(
    games: &[GameRecord],
    window_days: i64,
    reference_date: Option<DateTime<Utc>>,
) -> ChurnLabels {
    let starts: Vec<Option<DateTime<Utc>>> = games
        .iter()
        .map(|g| g.started_at.and_then(|s| DateTime::from_timestamp(s, 0)))
        .collect();

    let reference = reference_date.or_else(|| starts.iter().flatten().max().copied());

    let mut last_game: BTreeMap<String, Option<DateTime<Utc>>> = BTreeMap::new();
    for (game, started) in games.iter().zip(&starts) {
        for slot in &game.users {
            let Some(player_id) = valid_player_id(slot.id.as_deref()) else {
                continue;
            };
            let entry = last_game.entry(player_id.to_string()).or_insert(None);
            if let Some(at) = started {
                *entry = Some(entry.map_or(*at, |cur| cur.max(*at)));
            }
        }
    }

    let by_player = last_game
        .into_iter()
        .map(|(id, last)| {
            let churned = match (reference, last) {
                (Some(reference), Some(last)) => (reference - last).num_days() > window_days,
                // No measurable recency: cannot be called churned.
                _ => false,
            };
            (id, u8::from(churned))
        })
        .collect();

    ChurnLabels {
        by_player,
        reference_date: reference,
        window_days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::PlayerSlot;

    // 2024-06-01 00:00:00 UTC.
    const HORIZON: i64 = 1_717_200_000;

    fn game(p0: &str, p1: &str, started: Option<i64>) -> GameRecord {
        GameRecord {
            started_at: started,
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
    fn window_boundary_is_strict() {
        let games = vec![
            game("fresh", "edge", Some(HORIZON)),
            game("edge", "gone", Some(HORIZON - 60 * 86_400)),
            game("gone", "fresh", Some(HORIZON - 61 * 86_400)),
        ];
        // "edge" last played exactly 60 days before the horizon, "gone" 61.
        let labels = build_churn_labels(&games, 60, None);

        assert_eq!(labels.by_player.get("fresh"), Some(&0));
        assert_eq!(labels.by_player.get("edge"), Some(&0));
        assert_eq!(labels.by_player.get("gone"), Some(&1));
        assert_eq!(labels.positives(), 1);
    }

    #[test]
    fn reference_defaults_to_the_latest_observed_start() {
        let games = vec![
            game("a", "b", Some(HORIZON - 100 * 86_400)),
            game("c", "d", Some(HORIZON)),
        ];
        let labels = build_churn_labels(&games, 60, None);
        assert_eq!(
            labels.reference_date,
            DateTime::from_timestamp(HORIZON, 0)
        );
        // The players at the horizon itself can never be labeled churned.
        assert_eq!(labels.by_player.get("c"), Some(&0));
        assert_eq!(labels.by_player.get("d"), Some(&0));
        assert_eq!(labels.by_player.get("a"), Some(&1));
    }

    #[test]
    fn explicit_reference_overrides_the_horizon() {
        let games = vec![game("a", "b", Some(HORIZON - 61 * 86_400))];
        let reference = DateTime::from_timestamp(HORIZON, 0);
        let labels = build_churn_labels(&games, 60, reference);
        assert_eq!(labels.by_player.get("a"), Some(&1));
        assert_eq!(labels.reference_date, reference);
    }

    #[test]
    fn players_without_a_parseable_start_default_to_retained() {
        let games = vec![
            game("silent", "silent2", None),
            game("active", "silent", Some(HORIZON)),
        ];
        let labels = build_churn_labels(&games, 60, None);
        assert_eq!(labels.by_player.get("silent2"), Some(&0));
        assert_eq!(labels.by_player.get("silent"), Some(&0));
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn invalid_ids_get_no_label() {
        let games = vec![game("unknown", "p1", Some(HORIZON))];
        let labels = build_churn_labels(&games, 60, None);
        assert_eq!(labels.len(), 1);
        assert!(labels.by_player.contains_key("p1"));
    }
}
