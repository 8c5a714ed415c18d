//! Structured Event Log (C7): one record per event, dual-sunk to a
//! machine-readable layer and a human-readable layer that cannot block one
//! another.
//!
//! Initialization installs two independent `tracing_subscriber` layers: a
//! JSON-formatting layer (the machine sink) and a plain `fmt` layer (the
//! human sink), composed via `tracing_subscriber::registry()`. Each event
//! kind is emitted through `tracing::event!` at a level appropriate to its
//! severity, carrying the relevant fields (run id, station key, year) as
//! structured fields rather than interpolated text, so the machine sink can
//! index them.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use uuid::Uuid;

/// Installs the dual-sink subscriber. Call once at process start.
pub fn init_event_log(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("weather_ingest={default_level}")));

    let human = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(filter);

    let machine = tracing_subscriber::fmt::layer()
        .json()
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("weather_ingest={default_level}"))
        }));

    tracing_subscriber::registry()
        .with(human)
        .with(machine)
        .init();
}

/// One per-run correlation id, threaded through every event emitted during
/// that run.
#[derive(Debug, Clone, Copy)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! emit {
    ($lvl:ident, $kind:expr, $run_id:expr, $($field:tt)*) => {
        tracing::event!(tracing::Level::$lvl, event_kind = $kind, run_id = %$run_id, $($field)*);
    };
}

pub fn preflight_ok(run_id: RunId, station_key: &str) {
    emit!(INFO, "preflight_ok", run_id, station_key, "preflight probe succeeded");
}

pub fn preflight_failed(run_id: RunId, station_key: &str, error: &str) {
    emit!(ERROR, "preflight_failed", run_id, station_key, error, "preflight probe failed");
}

pub fn chunk_attempt(
    run_id: RunId,
    station_key: &str,
    year: i32,
    attempt: u32,
    status: Option<u16>,
    latency_ms: u64,
    bytes: Option<u64>,
) {
    emit!(
        DEBUG,
        "chunk_attempt",
        run_id,
        station_key,
        year,
        attempt,
        status,
        latency_ms,
        bytes,
        "retrieval attempt"
    );
}

pub fn chunk_completed(
    run_id: RunId,
    station_key: &str,
    year: i32,
    bytes: u64,
    duration_ms: u64,
) {
    emit!(
        INFO,
        "chunk_completed",
        run_id,
        station_key,
        year,
        bytes,
        duration_ms,
        "chunk materialized"
    );
}

pub fn chunk_skipped(run_id: RunId, station_key: &str, year: i32) {
    emit!(INFO, "chunk_skipped", run_id, station_key, year, "chunk already loaded");
}

pub fn chunk_failed(run_id: RunId, station_key: &str, year: i32, error_kind: &str, error: &str) {
    emit!(
        WARN,
        "chunk_failed",
        run_id,
        station_key,
        year,
        error_kind,
        error,
        "chunk failed"
    );
}

pub fn station_complete(
    run_id: RunId,
    station_key: &str,
    completed: usize,
    skipped: usize,
    failed: usize,
    duration_ms: u64,
) {
    emit!(
        INFO,
        "station_complete",
        run_id,
        station_key,
        completed,
        skipped,
        failed,
        duration_ms,
        "station pipeline finished"
    );
}

pub fn run_complete(
    run_id: RunId,
    stations: usize,
    completed: usize,
    skipped: usize,
    failed: usize,
    duration_ms: u64,
) {
    emit!(
        INFO,
        "run_complete",
        run_id,
        stations,
        completed,
        skipped,
        failed,
        duration_ms,
        "run finished"
    );
}

pub fn refine_month(run_id: RunId, station_key: &str, year: i32, month: u32, rows: usize) {
    emit!(
        INFO,
        "refine_month",
        run_id,
        station_key,
        year,
        month,
        rows,
        "monthly partition written"
    );
}

pub fn refine_failed(run_id: RunId, station_key: &str, year: i32, missing: &str, error: &str) {
    emit!(
        WARN,
        "refine_failed",
        run_id,
        station_key,
        year,
        missing,
        error,
        "refinement failed for year"
    );
}
