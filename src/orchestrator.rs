//! Ingestion Orchestrator (C5): runs N Station Pipelines concurrently with
//! bounded parallelism, aggregates per-station outcomes, and emits the run
//! summary.
//!
//! Bounded fan-out via `stream::iter(..).for_each_concurrent(max_concurrency,
//! ..)`, with results folded into a shared accumulator. Per-station outcomes
//! carry more than a flat counter, so they're collected into a
//! `Vec<PerStationOutcome>` behind a `tokio::sync::Mutex` rather than
//! individual atomics.

use crate::config::Config;
use crate::error::RetrieveError;
use crate::events::{self, RunId};
use crate::http_client::HttpRetriever;
use crate::station::{self, PerStationOutcome};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub stations: Vec<PerStationOutcome>,
}

impl RunOutcome {
    /// Non-zero exit signal: true if any station reported any failed chunk,
    /// even if other chunks succeeded.
    pub fn any_failed(&self) -> bool {
        self.stations.iter().any(|s| s.has_failures())
    }

    pub fn totals(&self) -> (usize, usize, usize) {
        self.stations.iter().fold((0, 0, 0), |(c, s, f), o| {
            (c + o.completed, s + o.skipped, f + o.failed.len())
        })
    }
}

#[derive(Debug)]
pub enum PreflightError {
    NoStations,
    Retrieve(RetrieveError),
}

impl std::fmt::Display for PreflightError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreflightError::NoStations => write!(f, "no stations resolved for this run"),
            PreflightError::Retrieve(err) => write!(f, "preflight probe failed: {err}"),
        }
    }
}

impl std::error::Error for PreflightError {}

/// Probes the upstream with a minimal one-day request against the first
/// resolved station, deterministically, before fanning out any station
/// pipeline. A probe failure is fatal and aborts the run before launching
/// workers.
async fn preflight(
    run_id: RunId,
    retriever: &HttpRetriever,
    cfg: &Config,
    station_keys: &[String],
) -> Result<(), PreflightError> {
    let Some(first) = station_keys.first() else {
        return Err(PreflightError::NoStations);
    };
    let station = cfg
        .registry
        .get(first)
        .expect("resolved station key exists in the registry");

    match retriever.probe(run_id, first, &station.id).await {
        Ok(()) => {
            events::preflight_ok(run_id, first);
            Ok(())
        }
        Err(err) => {
            events::preflight_failed(run_id, first, &err.to_string());
            Err(PreflightError::Retrieve(err))
        }
    }
}

/// Runs ingestion for every resolved station over `start_year..=end_year`,
/// bounded by `cfg.parallelism` concurrent Station Pipelines. Stations are
/// independent units; no cross-station ordering is guaranteed.
pub async fn ingest(
    cfg: &Config,
    run_id: RunId,
    station_keys: Vec<String>,
    start_year: i32,
    end_year: i32,
    force: bool,
) -> Result<RunOutcome, PreflightError> {
    let retriever = Arc::new(HttpRetriever::new(cfg));

    preflight(run_id, &retriever, cfg, &station_keys).await?;

    let started = Instant::now();
    let outcomes: Arc<Mutex<Vec<PerStationOutcome>>> =
        Arc::new(Mutex::new(Vec::with_capacity(station_keys.len())));
    let total_stations = station_keys.len();

    stream::iter(station_keys)
        .for_each_concurrent(cfg.parallelism, |station_key| {
            let cfg = cfg.clone();
            let retriever = retriever.clone();
            let outcomes = outcomes.clone();
            async move {
                let outcome = station::run(
                    &cfg,
                    run_id,
                    &retriever,
                    &station_key,
                    start_year,
                    end_year,
                    force,
                )
                .await;
                outcomes.lock().await.push(outcome);
            }
        })
        .await;

    let stations = Arc::try_unwrap(outcomes)
        .expect("all station workers have finished by this point")
        .into_inner();

    let run = RunOutcome { stations };
    let (completed, skipped, failed) = run.totals();
    events::run_complete(
        run_id,
        total_stations,
        completed,
        skipped,
        failed,
        started.elapsed().as_millis() as u64,
    );

    Ok(run)
}
