use std::collections::{BTreeMap, HashMap, HashSet};

/// Per-player feature matrix: one row per player id, one cell per named
/// column. Row order follows the lexicographic order of the ids, which keeps
/// repeated runs over the same batch reproducible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub index: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureTable {
    pub fn from_rows(columns: Vec<String>, by_player: BTreeMap<String, Vec<f64>>) -> Self {
        let mut index = Vec::with_capacity(by_player.len());
        let mut rows = Vec::with_capacity(by_player.len());
        for (id, row) in by_player {
            index.push(id);
            rows.push(row);
        }
        Self {
            columns,
            index,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.index
            .iter()
            .map(String::as_str)
            .zip(self.rows.iter().map(Vec::as_slice))
    }

    /// Cell lookup by player id and column name. Linear scans; meant for
    /// assertions and spot reads, not bulk access.
    pub fn value(&self, player_id: &str, column: &str) -> Option<f64> {
        let row = self.index.iter().position(|id| id == player_id)?;
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(col).copied()
    }

    /// Left join keyed on player id, `self` as the anchor: every row of
    /// `self` survives, right-side columns zero-fill when the player has no
    /// row on the right.
    pub fn left_join(&self, right: &FeatureTable) -> FeatureTable {
        let mut columns = self.columns.clone();
        columns.extend(right.columns.iter().cloned());
        let width = columns.len();

        let right_pos: HashMap<&str, usize> = right
            .index
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.as_str(), idx))
            .collect();

        let rows = self
            .index
            .iter()
            .zip(&self.rows)
            .map(|(id, left_row)| {
                let mut row = left_row.clone();
                match right_pos.get(id.as_str()) {
                    Some(&idx) => row.extend_from_slice(&right.rows[idx]),
                    None => row.resize(width, 0.0),
                }
                row
            })
            .collect();

        FeatureTable {
            columns,
            index: self.index.clone(),
            rows,
        }
    }

    /// Replaces every NaN/infinite cell with 0.
    pub fn sanitize(&mut self) {
        for row in &mut self.rows {
            for v in row.iter_mut() {
                if !v.is_finite() {
                    *v = 0.0;
                }
            }
        }
    }

    /// Reconciles this table against a locked column list: expected columns
    /// absent from the batch are inserted as 0, batch columns outside the
    /// locked list are dropped, and the order is rewritten to match exactly.
    /// Drift in either direction is logged, never fatal.
    pub fn reindex_columns(&mut self, locked: &[String]) {
        if self.columns.as_slice() == locked {
            return;
        }

        let have: HashMap<&str, usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.as_str(), idx))
            .collect();
        let locked_set: HashSet<&str> = locked.iter().map(String::as_str).collect();

        let missing: Vec<&str> = locked
            .iter()
            .map(String::as_str)
            .filter(|c| !have.contains_key(*c))
            .collect();
        let extra: Vec<&str> = self
            .columns
            .iter()
            .map(String::as_str)
            .filter(|c| !locked_set.contains(*c))
            .collect();
        if !missing.is_empty() {
            log::warn!(
                "feature schema drift: {} expected column(s) absent from batch, zero-filled: {:?}",
                missing.len(),
                missing
            );
        }
        if !extra.is_empty() {
            log::warn!(
                "feature schema drift: {} batch column(s) outside the trained schema, dropped: {:?}",
                extra.len(),
                extra
            );
        }

        let rows: Vec<Vec<f64>> = self
            .rows
            .iter()
            .map(|row| {
                locked
                    .iter()
                    .map(|name| {
                        have.get(name.as_str())
                            .and_then(|&idx| row.get(idx).copied())
                            .unwrap_or(0.0)
                    })
                    .collect()
            })
            .collect();

        self.rows = rows;
        self.columns = locked.to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[(&str, &[f64])]) -> FeatureTable {
        let by_player = rows
            .iter()
            .map(|(id, row)| (id.to_string(), row.to_vec()))
            .collect();
        FeatureTable::from_rows(columns.iter().map(|c| c.to_string()).collect(), by_player)
    }

    #[test]
    fn index_is_sorted_by_player_id() {
        let t = table(&["a"], &[("p9", &[9.0]), ("p1", &[1.0]), ("p5", &[5.0])]);
        assert_eq!(t.index, vec!["p1", "p5", "p9"]);
        assert_eq!(t.rows[0], vec![1.0]);
    }

    #[test]
    fn left_join_zero_fills_absent_right_rows() {
        let games = table(&["g"], &[("p1", &[1.0]), ("p2", &[2.0])]);
        let chests = table(&["c1", "c2"], &[("p1", &[10.0, 20.0]), ("p3", &[99.0, 99.0])]);
        let joined = games.left_join(&chests);

        assert_eq!(joined.columns, vec!["g", "c1", "c2"]);
        assert_eq!(joined.index, vec!["p1", "p2"]);
        assert_eq!(joined.rows[0], vec![1.0, 10.0, 20.0]);
        assert_eq!(joined.rows[1], vec![2.0, 0.0, 0.0]);
    }

    #[test]
    fn sanitize_zeroes_non_finite_cells() {
        let mut t = table(&["a", "b"], &[("p1", &[f64::NAN, f64::INFINITY])]);
        t.sanitize();
        assert_eq!(t.rows[0], vec![0.0, 0.0]);
    }

    #[test]
    fn reindex_inserts_drops_and_reorders() {
        let mut t = table(&["b", "x", "a"], &[("p1", &[2.0, 9.0, 1.0])]);
        let locked = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        t.reindex_columns(&locked);

        assert_eq!(t.columns, locked);
        assert_eq!(t.rows[0], vec![1.0, 2.0, 0.0]);
    }

    #[test]
    fn reindex_is_a_no_op_on_matching_schema() {
        let mut t = table(&["a", "b"], &[("p1", &[1.0, 2.0])]);
        let locked = vec!["a".to_string(), "b".to_string()];
        t.reindex_columns(&locked);
        assert_eq!(t.rows[0], vec![1.0, 2.0]);
    }
}
