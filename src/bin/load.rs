//! Ingestion CLI entry point (`weather-ingest-load`): a thin wrapper around
//! the library's Configuration Loader and Ingestion Orchestrator.

use clap::Parser;
use eyre::{eyre, Result};
use fs2::FileExt;
use std::path::PathBuf;
use weather_ingest::config::Config;
use weather_ingest::events::{self, RunId};
use weather_ingest::orchestrator::{self, PreflightError};

/// Exit code when every requested chunk finished or was skipped.
const EXIT_OK: i32 = 0;
/// Exit code when at least one chunk failed.
const EXIT_CHUNK_FAILED: i32 = 1;
/// Distinct exit code for a configuration error.
const EXIT_CONFIG_ERROR: i32 = 2;
/// Distinct exit code when preflight failed.
const EXIT_PREFLIGHT_FAILED: i32 = 3;

#[derive(Parser, Debug)]
#[command(
    name = "weather-ingest-load",
    version,
    about = "Ingest hourly in-situ weather observations from an OGC EDR endpoint"
)]
struct Args {
    /// Station selector: one key, a comma-separated list, or a group name.
    #[arg(long)]
    station: String,

    /// First year to ingest (inclusive).
    #[arg(long)]
    start_year: i32,

    /// Last year to ingest (inclusive).
    #[arg(long)]
    end_year: i32,

    /// Max concurrent station pipelines.
    #[arg(long, default_value_t = 10)]
    parallelism: usize,

    /// Re-run even if the ledger reports the chunk already loaded.
    #[arg(long)]
    force: bool,

    #[arg(long)]
    verbose: bool,

    #[arg(long, default_value = "https://api.dataplatform.knmi.nl/edr/v1")]
    base_url: String,

    #[arg(long, default_value = "observations")]
    collection: String,

    /// Environment variable name that carries the EDR API credential.
    #[arg(long, default_value = "WEATHER_EDR_API_KEY")]
    credential_env: String,

    #[arg(long, default_value = "data/raw")]
    raw_root: PathBuf,

    #[arg(long, default_value = "data/refined")]
    refined_root: PathBuf,

    #[arg(long, default_value = "data/metadata")]
    metadata_root: PathBuf,

    #[arg(long, default_value = "data/metadata/stations.json")]
    stations_file: PathBuf,

    /// Max retry attempts per chunk.
    #[arg(long, default_value_t = 5)]
    retry_cap: u32,

    /// Per-attempt network timeout, in seconds.
    #[arg(long, default_value_t = 60)]
    attempt_timeout_seconds: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    events::init_event_log(args.verbose);

    let cfg = match Config::load(
        args.base_url,
        args.collection,
        &args.credential_env,
        args.raw_root,
        args.refined_root,
        args.metadata_root,
        args.parallelism,
        args.retry_cap,
        args.attempt_timeout_seconds,
        args.stations_file,
    ) {
        Ok(cfg) => cfg,
        Err(err) => {
            tracing::error!(error = %err, "configuration error");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    if let Err(err) = cfg.validate_year_range(args.start_year, args.end_year) {
        tracing::error!(error = %err, "configuration error");
        std::process::exit(EXIT_CONFIG_ERROR);
    }

    let station_keys = match cfg.registry.resolve_selector(&args.station) {
        Ok(keys) => keys,
        Err(err) => {
            tracing::error!(error = %err, "configuration error");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    // Single-instance guard: one ingestion run per metadata root at a time.
    std::fs::create_dir_all(&cfg.metadata_root)
        .map_err(|e| eyre!("failed to create metadata root {}: {e}", cfg.metadata_root.display()))?;
    let lock_path = cfg.metadata_root.join("load.lock");
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&lock_path)
        .map_err(|e| eyre!("failed to open lock file {}: {e}", lock_path.display()))?;
    lock_file
        .try_lock_exclusive()
        .map_err(|e| eyre!("another ingestion run holds the lock ({}): {e}", lock_path.display()))?;
    let _lock_guard = lock_file;

    let run_id = RunId::new();

    tracing::info!(
        run_id = %run_id,
        stations = station_keys.len(),
        start_year = args.start_year,
        end_year = args.end_year,
        parallelism = cfg.parallelism,
        force = args.force,
        "ingestion run starting"
    );

    let run = match orchestrator::ingest(
        &cfg,
        run_id,
        station_keys,
        args.start_year,
        args.end_year,
        args.force,
    )
    .await
    {
        Ok(run) => run,
        Err(PreflightError::NoStations) => {
            tracing::error!("no stations resolved from selector");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
        Err(err @ PreflightError::Retrieve(_)) => {
            tracing::error!(error = %err, "preflight probe failed; aborting before launching workers");
            std::process::exit(EXIT_PREFLIGHT_FAILED);
        }
    };

    let (completed, skipped, failed) = run.totals();
    tracing::info!(completed, skipped, failed, "ingestion run finished");

    if run.any_failed() {
        std::process::exit(EXIT_CHUNK_FAILED);
    }

    std::process::exit(EXIT_OK);
}
