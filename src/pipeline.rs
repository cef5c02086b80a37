use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chest_features;
use crate::classifier::{BinaryClassifier, LogisticModel};
use crate::error::{ChurnError, Result};
use crate::feature_table::FeatureTable;
use crate::games_features;
use crate::labels::ChurnLabels;
use crate::records::{ChestEvent, GameRecord};
use crate::scaler::StandardScaler;

pub const ARTIFACT_VERSION: u32 = 1;
pub const DEFAULT_ARTIFACT_PATH: &str = "churn_pipeline.json";

/// Everything `fit` locks in: the ordered feature schema, the scaler
/// moments, and how many players the model saw.
#[derive(Debug, Clone)]
struct FittedState {
    feature_names: Vec<String>,
    scaler: StandardScaler,
    trained_players: usize,
}

/// Orchestrates the two extractors, the games-anchored join, the locked
/// feature schema, and the fitted scaler + classifier. Unfitted pipelines
/// can only fail `transform`/`predict_proba`; a fitted pipeline is
/// read-only and safe to share across threads.
#[derive(Debug, Clone)]
pub struct ChurnPipeline<M: BinaryClassifier = LogisticModel> {
    model: M,
    fitted: Option<FittedState>,
}

impl ChurnPipeline<LogisticModel> {
    pub fn new() -> Self {
        Self::with_model(LogisticModel::default())
    }

    pub fn with_scale_pos_weight(scale_pos_weight: f64) -> Self {
        Self::with_model(LogisticModel::with_scale_pos_weight(scale_pos_weight))
    }

    /// Rebuilds a fitted pipeline from a persisted artifact, refusing
    /// artifacts whose schema and parameter lengths disagree.
    pub fn from_artifact(artifact: PipelineArtifact) -> Result<Self> {
        let width = artifact.feature_names.len();
        if width == 0 {
            return Err(ChurnError::Artifact(
                "artifact has an empty feature schema".to_string(),
            ));
        }
        if artifact.feature_means.len() != width
            || artifact.feature_scales.len() != width
            || artifact.model.weights.len() != width
        {
            return Err(ChurnError::Artifact(format!(
                "artifact parameter lengths disagree with its {width}-column schema"
            )));
        }

        Ok(Self {
            model: artifact.model,
            fitted: Some(FittedState {
                feature_names: artifact.feature_names,
                scaler: StandardScaler {
                    mean: artifact.feature_means,
                    scale: artifact.feature_scales,
                },
                trained_players: artifact.trained_players,
            }),
        })
    }

    /// Snapshot of the fitted state for persistence. The caller fills in
    /// provenance (`source`, `window_days`, `validation`) before saving.
    pub fn to_artifact(&self, now: DateTime<Utc>) -> Result<PipelineArtifact> {
        let state = self.fitted.as_ref().ok_or(ChurnError::NotFitted)?;
        Ok(PipelineArtifact {
            version: ARTIFACT_VERSION,
            generated_at: now.to_rfc3339(),
            source: None,
            window_days: 0,
            trained_players: state.trained_players,
            feature_names: state.feature_names.clone(),
            feature_means: state.scaler.mean.clone(),
            feature_scales: state.scaler.scale.clone(),
            model: self.model.clone(),
            validation: None,
        })
    }
}

impl Default for ChurnPipeline<LogisticModel> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: BinaryClassifier> ChurnPipeline<M> {
    pub fn with_model(model: M) -> Self {
        Self {
            model,
            fitted: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// The locked, ordered feature schema. `None` until fitted.
    pub fn feature_names(&self) -> Option<&[String]> {
        self.fitted.as_ref().map(|s| s.feature_names.as_slice())
    }

    pub fn trained_players(&self) -> usize {
        self.fitted.as_ref().map(|s| s.trained_players).unwrap_or(0)
    }

    /// Extracts, joins, and intersects with the labeled players, then fits
    /// the scaler and classifier on exactly that matrix and locks the
    /// feature schema.
    pub fn fit(
        &mut self,
        games: &[GameRecord],
        chests: &[ChestEvent],
        labels: &ChurnLabels,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let features = join_features(games, chests, now);
        if features.is_empty() {
            return Err(ChurnError::EmptyInput("no valid game rows to fit on"));
        }

        let mut matrix = Vec::new();
        let mut y = Vec::new();
        for (id, row) in features.iter() {
            if let Some(&label) = labels.by_player.get(id) {
                matrix.push(row.to_vec());
                y.push(label);
            }
        }
        if matrix.is_empty() {
            return Err(ChurnError::EmptyInput(
                "no labeled players intersect the feature table",
            ));
        }

        let scaler = StandardScaler::fit(&matrix);
        let scaled: Vec<Vec<f64>> = matrix.iter().map(|row| scaler.transform_row(row)).collect();
        self.model.fit(&scaled, &y)?;

        self.fitted = Some(FittedState {
            feature_names: features.columns,
            scaler,
            trained_players: y.len(),
        });
        Ok(())
    }

    /// Re-extracts with the same machinery as `fit`, reconciles the batch's
    /// columns against the locked schema, and applies the already-fitted
    /// scaler. Never refits anything.
    pub fn transform(
        &self,
        games: &[GameRecord],
        chests: &[ChestEvent],
        now: DateTime<Utc>,
    ) -> Result<FeatureTable> {
        let state = self.fitted.as_ref().ok_or(ChurnError::NotFitted)?;

        let mut features = join_features(games, chests, now);
        if features.is_empty() {
            return Err(ChurnError::EmptyInput("no valid game rows to transform"));
        }

        features.reindex_columns(&state.feature_names);
        for row in &mut features.rows {
            *row = state.scaler.transform_row(row);
        }
        Ok(features)
    }

    /// Positive-class (churn) probability per player id.
    pub fn predict_proba(
        &self,
        games: &[GameRecord],
        chests: &[ChestEvent],
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<String, f64>> {
        let features = self.transform(games, chests, now)?;
        Ok(features
            .iter()
            .map(|(id, row)| (id.to_string(), self.model.predict_proba(row)))
            .collect())
    }
}

/// Fresh extraction + join with no schema lock and no scaling: the feature
/// table used to pick a train/validation split before any fitting happens.
/// Extraction is stateless, so this is exactly what `fit` will see.
pub fn aggregate_features_for_split(
    games: &[GameRecord],
    chests: &[ChestEvent],
    now: DateTime<Utc>,
) -> FeatureTable {
    join_features(games, chests, now)
}

fn join_features(games: &[GameRecord], chests: &[ChestEvent], now: DateTime<Utc>) -> FeatureTable {
    let games_table = games_features::extract(games);
    let chests_table = chest_features::extract(chests, now);
    let mut features = games_table.left_join(&chests_table);
    features.sanitize();
    features
}

/// Persisted form of a fitted pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineArtifact {
    pub version: u32,
    pub generated_at: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub window_days: i64,
    #[serde(default)]
    pub trained_players: usize,
    #[serde(default)]
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub feature_means: Vec<f64>,
    #[serde(default)]
    pub feature_scales: Vec<f64>,
    #[serde(default)]
    pub model: LogisticModel,
    #[serde(default)]
    pub validation: Option<ValidationSnapshot>,
}

/// Held-out quality figures recorded next to the parameters at train time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ValidationSnapshot {
    pub samples: usize,
    pub accuracy: f64,
    pub log_loss: f64,
    pub roc_auc: f64,
}

pub fn save_artifact(artifact: &PipelineArtifact, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok();
    }
    let raw = serde_json::to_string_pretty(artifact).context("serialize churn artifact")?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, raw).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename into {}", path.display()))?;
    Ok(())
}

pub fn load_artifact(path: &Path) -> anyhow::Result<PipelineArtifact> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read churn artifact {}", path.display()))?;
    serde_json::from_str::<PipelineArtifact>(&raw)
        .with_context(|| format!("parse churn artifact {}", path.display()))
}

pub fn load_pipeline(path: &Path) -> anyhow::Result<ChurnPipeline<LogisticModel>> {
    let artifact = load_artifact(path)?;
    ChurnPipeline::from_artifact(artifact)
        .with_context(|| format!("rebuild pipeline from {}", path.display()))
}

/// Process-wide fitted pipeline, loaded once from `CHURN_ARTIFACT_PATH` (or
/// the default path) and read-only thereafter. `None` when no usable
/// artifact exists; the failure is logged, not raised, so callers decide
/// whether a missing model is fatal.
pub fn global_pipeline() -> Option<&'static ChurnPipeline<LogisticModel>> {
    static PIPELINE: OnceLock<Option<ChurnPipeline<LogisticModel>>> = OnceLock::new();
    PIPELINE
        .get_or_init(|| {
            let path =
                artifact_path_override().unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_PATH));
            match load_pipeline(&path) {
                Ok(pipeline) => Some(pipeline),
                Err(err) => {
                    log::warn!("churn artifact unavailable at {}: {err:#}", path.display());
                    None
                }
            }
        })
        .as_ref()
}

fn artifact_path_override() -> Option<PathBuf> {
    env::var("CHURN_ARTIFACT_PATH")
        .ok()
        .map(|s| PathBuf::from(s.trim().to_string()))
}
