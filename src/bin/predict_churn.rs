use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;

use churn_engine::pipeline::{self, load_pipeline};
use churn_engine::serving::parse_scoring_payload;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let payload_path = parse_path_arg("--payload").ok_or_else(|| {
        anyhow!("usage: predict_churn --payload <scoring.json> [--artifact <churn_pipeline.json>]")
    })?;
    let artifact_path = parse_path_arg("--artifact")
        .or_else(|| std::env::var("CHURN_ARTIFACT_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(pipeline::DEFAULT_ARTIFACT_PATH));

    let model = load_pipeline(&artifact_path)?;
    let raw = fs::read_to_string(&payload_path)
        .with_context(|| format!("read {}", payload_path.display()))?;
    let payload = parse_scoring_payload(&raw)?;
    eprintln!(
        "[INFO] scoring {} games and {} chest events",
        payload.games.len(),
        payload.chests.len()
    );

    let probs = model.predict_proba(&payload.games, &payload.chests, Utc::now())?;
    eprintln!("[INFO] predictions for {} players", probs.len());

    let out = serde_json::json!({ "probabilities": probs });
    println!(
        "{}",
        serde_json::to_string_pretty(&out).context("serialize predictions")?
    );
    Ok(())
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
