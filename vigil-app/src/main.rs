use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tether::build_from_config;
use vigil_common::observability::{LogConfig, LogFormat, init_logging};
use vigil_config::{VigilConfig, VigilConfigLoader};
mod tether;

/// Watch a roster of X accounts and push the last day's posts to OneBot.
#[derive(Debug, Parser)]
#[command(name = "vigil", version)]
struct Args {
    /// YAML config file. Without it `vigil.yaml` is read when present.
    #[arg(short, long, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    /// Digest title.
    #[arg(short, long, default_value = "X")]
    label: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1) Load config (env wins)
    let loader = VigilConfigLoader::new();
    let loader = match &args.config {
        Some(path) => loader.with_file(path),
        None => loader.with_optional_file("vigil.yaml"),
    };
    let cfg: VigilConfig = loader.load()?;

    // 2) Logging from the `logging` section
    let log_path = init_logging(LogConfig {
        log_dir: cfg.logging.dir.clone(),
        emit_stderr: cfg.logging.stderr,
        format: LogFormat::parse_lenient(&cfg.logging.format),
        ..LogConfig::default()
    })?;
    tracing::info!(log_path=%log_path.display(), label=%args.label, "vigil.start");

    // 3) Wire and run once
    let tether = build_from_config(&cfg, &args.label)?;
    tether.run().await?;
    Ok(())
}
