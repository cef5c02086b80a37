use serde::{Deserialize, Serialize};

/// Per-column standardization fitted on the training matrix: population
/// mean and standard deviation. Zero-variance columns keep a scale of 1 so
/// they pass through centered instead of exploding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        let n = rows.len() as f64;
        if width == 0 || rows.is_empty() {
            return Self {
                mean: vec![0.0; width],
                scale: vec![1.0; width],
            };
        }

        let mut mean = vec![0.0; width];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut scale = vec![0.0; width];
        for row in rows {
            for ((s, m), v) in scale.iter_mut().zip(&mean).zip(row) {
                *s += (v - m).powi(2);
            }
        }
        for s in &mut scale {
            let std = (*s / n).sqrt();
            *s = if std.is_finite() && std > 0.0 { std } else { 1.0 };
        }

        Self { mean, scale }
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn fit_computes_population_moments() {
        let rows = vec![vec![1.0, 10.0], vec![3.0, 10.0], vec![5.0, 10.0]];
        let scaler = StandardScaler::fit(&rows);

        assert_relative_eq!(scaler.mean[0], 3.0);
        assert_relative_eq!(scaler.scale[0], (8.0_f64 / 3.0).sqrt());
        // Constant column: centered, scale pinned to 1.
        assert_relative_eq!(scaler.mean[1], 10.0);
        assert_relative_eq!(scaler.scale[1], 1.0);

        let out = scaler.transform_row(&[3.0, 10.0]);
        assert_relative_eq!(out[0], 0.0);
        assert_relative_eq!(out[1], 0.0);
    }

    #[test]
    fn transform_standardizes_against_fit_moments() {
        let rows = vec![vec![0.0], vec![2.0]];
        let scaler = StandardScaler::fit(&rows);
        let out = scaler.transform_row(&[4.0]);
        assert_relative_eq!(out[0], 3.0);
    }

    #[test]
    fn empty_fit_yields_an_empty_scaler() {
        let scaler = StandardScaler::fit(&[]);
        assert_eq!(scaler.width(), 0);
        assert!(scaler.transform_row(&[]).is_empty());
    }
}
