//! Player churn prediction for online pool matches.
//!
//! Two event streams come in: finished games (two player slots per row,
//! with end-of-game stats) and chest-open events. Per-player behavioral
//! features are aggregated from both, joined games-first, scaled, and fed
//! to a logistic model that scores the probability a player lapses beyond
//! the churn window. A fitted pipeline locks its feature schema at train
//! time and reconciles every later batch against it, so serving never
//! silently shifts columns.

pub mod chest_features;
pub mod classifier;
pub mod error;
pub mod feature_table;
pub mod games_features;
pub mod labels;
pub mod metrics;
pub mod pipeline;
pub mod records;
pub mod scaler;
pub mod serving;
pub mod split;

pub use error::{ChurnError, Result};
pub use pipeline::ChurnPipeline;
