//! Station Pipeline (C4): for one station, enumerates chunks over a
//! requested year range, consults the ledger, and drives C1→C2→C3 for each
//! missing chunk.
//!
//! Years are processed strictly sequentially, one full fetch-store-record
//! step before the next. This gives a single-writer-per-ledger discipline
//! without any in-file locking, and a failure on one year never aborts the
//! station — historical immutability makes later years safe to attempt
//! regardless.

use crate::config::Config;
use crate::error::RetrieveError;
use crate::events::{self, RunId};
use crate::http_client::HttpRetriever;
use crate::ledger::IngestionLedger;
use crate::store;
use chrono::Utc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkFailureKind {
    ClientError,
    Exhausted,
    Io,
}

#[derive(Debug, Clone)]
pub struct ChunkFailure {
    pub year: i32,
    pub kind: ChunkFailureKind,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct PerStationOutcome {
    pub station_key: String,
    pub completed: usize,
    pub skipped: usize,
    pub failed: Vec<ChunkFailure>,
}

impl PerStationOutcome {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Runs one station's ingestion across `start_year..=end_year`, strictly in
/// ascending order.
pub async fn run(
    cfg: &Config,
    run_id: RunId,
    retriever: &HttpRetriever,
    station_key: &str,
    start_year: i32,
    end_year: i32,
    force: bool,
) -> PerStationOutcome {
    let started = Instant::now();
    let station = cfg
        .registry
        .get(station_key)
        .expect("station key already resolved against the registry");

    let mut ledger = match IngestionLedger::load(&cfg.ingestion_ledger_dir(), station_key) {
        Ok(ledger) => ledger,
        Err(err) => {
            // A corrupt ledger is treated as "nothing loaded yet"; every
            // chunk is re-attempted and the first success overwrites it.
            tracing::warn!(station_key, error = %err, "failed to load ingestion ledger; treating as empty");
            IngestionLedger::empty(station_key)
        }
    };

    let mut outcome = PerStationOutcome {
        station_key: station_key.to_string(),
        ..Default::default()
    };

    for year in start_year..=end_year {
        let final_path = cfg.raw_artifact_path(&station.id, year);

        if !force && ledger.is_loaded(year) && final_path.exists() {
            outcome.skipped += 1;
            events::chunk_skipped(run_id, station_key, year);
            continue;
        }

        let chunk_started = Instant::now();
        match retriever.fetch(run_id, station_key, &station.id, year).await {
            Ok(bytes) => match store::put_bytes(&final_path, &bytes) {
                Ok(()) => {
                    let size_bytes = bytes.len() as u64;
                    let loaded_at = Utc::now();
                    if let Err(err) = ledger.record(
                        &cfg.ingestion_ledger_dir(),
                        year,
                        final_path.display().to_string(),
                        size_bytes,
                        loaded_at,
                    ) {
                        outcome.failed.push(ChunkFailure {
                            year,
                            kind: ChunkFailureKind::Io,
                            reason: err.to_string(),
                        });
                        events::chunk_failed(run_id, station_key, year, "ledger_write", &err.to_string());
                        continue;
                    }
                    outcome.completed += 1;
                    events::chunk_completed(
                        run_id,
                        station_key,
                        year,
                        size_bytes,
                        chunk_started.elapsed().as_millis() as u64,
                    );
                }
                Err(err) => {
                    // Artifact, if partially written, is cleaned up by the
                    // store's own temp-file rule; the ledger stays
                    // untouched, so this chunk is re-attempted next run.
                    outcome.failed.push(ChunkFailure {
                        year,
                        kind: ChunkFailureKind::Io,
                        reason: err.to_string(),
                    });
                    events::chunk_failed(run_id, station_key, year, "io_error", &err.to_string());
                }
            },
            Err(err @ RetrieveError::ClientError { .. }) => {
                outcome.failed.push(ChunkFailure {
                    year,
                    kind: ChunkFailureKind::ClientError,
                    reason: err.to_string(),
                });
                events::chunk_failed(run_id, station_key, year, "client_error", &err.to_string());
            }
            Err(err @ RetrieveError::Exhausted { .. }) => {
                outcome.failed.push(ChunkFailure {
                    year,
                    kind: ChunkFailureKind::Exhausted,
                    reason: err.to_string(),
                });
                events::chunk_failed(run_id, station_key, year, "exhausted", &err.to_string());
            }
        }
    }

    events::station_complete(
        run_id,
        station_key,
        outcome.completed,
        outcome.skipped,
        outcome.failed.len(),
        started.elapsed().as_millis() as u64,
    );

    outcome
}
