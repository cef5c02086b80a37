/// Sentinel ids that must never be treated as a real player identity.
pub const INVALID_ID_TOKENS: [&str; 3] = ["unknown", "nan", "none"];

/// One match row as delivered by the game feed. Two player slots (0/1);
/// `end_stats` carries the per-slot metric pairs indexed the same way.
#[derive(Debug, Clone, Default)]
pub struct GameRecord {
    pub id: Option<String>,
    pub game_mode: Option<String>,
    pub creator_id: Option<String>,
    pub status: Option<String>,
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub winner: Option<String>,
    pub score: [Option<f64>; 2],
    pub frames_count: Option<f64>,
    pub is_rematch: Option<bool>,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub users: [PlayerSlot; 2],
    pub end_stats: EndStats,
}

#[derive(Debug, Clone, Default)]
pub struct PlayerSlot {
    pub id: Option<String>,
    pub username: Option<String>,
    /// Account creation stamp as delivered (RFC 3339 or date string).
    pub created_at: Option<String>,
    pub seconds_in_game: Option<f64>,
    pub online_sessions: Option<f64>,
    pub rating: Option<f64>,
    pub energy: Option<f64>,
}

/// End-of-game metrics, one value per slot. The trailing metadata stamps
/// are carried through parsing but excluded from numeric aggregation.
#[derive(Debug, Clone, Default)]
pub struct EndStats {
    pub rating_points: [Option<f64>; 2],
    pub highest_break: [Option<f64>; 2],
    pub balls_potted: [Option<f64>; 2],
    pub total_points: [Option<f64>; 2],
    pub table_time: [Option<f64>; 2],
    pub pot_success: [Option<f64>; 2],
    pub shot_time: [Option<f64>; 2],
    pub game_id: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// One reward-open event.
#[derive(Debug, Clone, Default)]
pub struct ChestEvent {
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub chest_type: Option<String>,
    pub opened_with: Option<String>,
    pub open_at: Option<i64>,
}

/// Returns the id verbatim when it names a real player. Validity is judged
/// on the trimmed, lowercased form; the raw spelling is what gets used as
/// the grouping key.
pub fn valid_player_id(raw: Option<&str>) -> Option<&str> {
    let id = raw?;
    let norm = id.trim().to_ascii_lowercase();
    if norm.is_empty() || INVALID_ID_TOKENS.contains(&norm.as_str()) {
        return None;
    }
    Some(id)
}
