//! Refinement CLI entry point (`weather-ingest-refine`): invokes the
//! Refiner (C6) for each requested (station, year), independently of the
//! ingestion pipeline.

use clap::Parser;
use eyre::{eyre, Result};
use fs2::FileExt;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use weather_ingest::config::Config;
use weather_ingest::events::{self, RunId};
use weather_ingest::refine::{self, RefineOutcome};

const EXIT_OK: i32 = 0;
const EXIT_REFINE_FAILED: i32 = 1;
const EXIT_CONFIG_ERROR: i32 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "weather-ingest-refine",
    version,
    about = "Flatten ingested weather observations into monthly columnar partitions"
)]
struct Args {
    /// Station selector: one key, a comma-separated list, or a group name.
    #[arg(long)]
    station: String,

    /// First year to refine (inclusive).
    #[arg(long)]
    start_year: i32,

    /// Last year to refine (inclusive).
    #[arg(long)]
    end_year: i32,

    #[arg(long, default_value_t = 10)]
    parallelism: usize,

    /// Recompute and rewrite all 12 months even if already refined.
    #[arg(long)]
    force: bool,

    #[arg(long)]
    verbose: bool,

    #[arg(long, default_value = "https://api.dataplatform.knmi.nl/edr/v1")]
    base_url: String,

    #[arg(long, default_value = "observations")]
    collection: String,

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

    #[arg(long, default_value_t = 5)]
    retry_cap: u32,

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

    std::fs::create_dir_all(&cfg.metadata_root)
        .map_err(|e| eyre!("failed to create metadata root {}: {e}", cfg.metadata_root.display()))?;
    let lock_path = cfg.metadata_root.join("refine.lock");
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&lock_path)
        .map_err(|e| eyre!("failed to open lock file {}: {e}", lock_path.display()))?;
    lock_file
        .try_lock_exclusive()
        .map_err(|e| eyre!("another refinement run holds the lock ({}): {e}", lock_path.display()))?;
    let _lock_guard = lock_file;

    let run_id = RunId::new();
    let any_failed = Arc::new(AtomicBool::new(false));

    tracing::info!(
        run_id = %run_id,
        stations = station_keys.len(),
        start_year = args.start_year,
        end_year = args.end_year,
        parallelism = cfg.parallelism,
        "refinement run starting"
    );

    // One job per (station, year), bounded by `cfg.parallelism` concurrent
    // workers — the same `for_each_concurrent` shape the Orchestrator uses
    // to fan out Station Pipelines. Each `refine_station_year` call is
    // blocking (file IO plus Parquet encode), so it runs on a blocking
    // thread rather than tying up the async executor.
    let jobs: Vec<(String, String, i32)> = station_keys
        .iter()
        .flat_map(|station_key| {
            let station = cfg
                .registry
                .get(station_key)
                .expect("resolved station key exists in the registry");
            (args.start_year..=args.end_year)
                .map(move |year| (station_key.clone(), station.id.clone(), year))
        })
        .collect();

    stream::iter(jobs)
        .for_each_concurrent(cfg.parallelism, |(station_key, station_id, year)| {
            let cfg = cfg.clone();
            let force = args.force;
            let any_failed = any_failed.clone();
            async move {
                let log_station_key = station_key.clone();
                let result = tokio::task::spawn_blocking(move || {
                    refine::refine_station_year(&cfg, run_id, &station_key, &station_id, year, force)
                })
                .await
                .expect("refine worker task panicked");

                match result {
                    Ok(RefineOutcome::Refined { months_written }) => {
                        tracing::info!(station_key = %log_station_key, year, months_written, "refined");
                    }
                    Ok(RefineOutcome::Skipped) => {
                        tracing::info!(station_key = %log_station_key, year, "already refined; skipped");
                    }
                    Err(err) => {
                        any_failed.store(true, Ordering::SeqCst);
                        tracing::warn!(station_key = %log_station_key, year, error = %err, "refine failed");
                    }
                }
            }
        })
        .await;

    if any_failed.load(Ordering::SeqCst) {
        std::process::exit(EXIT_REFINE_FAILED);
    }

    std::process::exit(EXIT_OK);
}
