//! Typed error kinds for each component.

use std::time::Duration;
use thiserror::Error;

/// Outcome classification for one HTTP retrieval attempt or exhausted retry budget (C1).
#[derive(Debug, Error)]
pub enum RetrieveError {
    /// Non-retryable 4xx (not 429) from the upstream for this chunk.
    #[error("client error: upstream returned status {status} for station {station_id} year {year}")]
    ClientError {
        station_id: String,
        year: i32,
        status: u16,
    },

    /// Retry budget exhausted without a successful response.
    #[error("retries exhausted for station {station_id} year {year} after {attempts} attempts: {cause}")]
    Exhausted {
        station_id: String,
        year: i32,
        attempts: u32,
        cause: String,
    },
}

impl RetrieveError {
    pub fn station_id(&self) -> &str {
        match self {
            RetrieveError::ClientError { station_id, .. } => station_id,
            RetrieveError::Exhausted { station_id, .. } => station_id,
        }
    }

    pub fn year(&self) -> i32 {
        match self {
            RetrieveError::ClientError { year, .. } => *year,
            RetrieveError::Exhausted { year, .. } => *year,
        }
    }
}

/// A single retrieval attempt's outcome, used internally by the retry loop.
#[derive(Debug)]
pub(crate) enum AttemptOutcome {
    Success(bytes::Bytes),
    RateLimited { retry_after: Option<Duration> },
    Transient(String),
    ClientError(u16),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create parent directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write temp file {path}: {source}")]
    WriteTemp {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to rename {from} -> {to}: {source}")]
    Rename {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode parquet table for {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: parquet::errors::ParquetError,
    },
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to read ledger {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse ledger {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum RefineError {
    #[error("no ingestion ledger entry for station {station_key} year {year}")]
    NotIngested { station_key: String, year: i32 },

    #[error("raw artifact for station {station_key} year {year} is malformed: {reason}")]
    MalformedPayload {
        station_key: String,
        year: i32,
        reason: String,
    },

    #[error("failed to read raw artifact {path}: {source}")]
    ReadRaw {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Some months were written, some were not; caller should retry the missing ones.
    #[error("partial refine for station {station_key} year {year}: {} months missing", missing.len())]
    PartialRefine {
        station_key: String,
        year: i32,
        missing: Vec<u32>,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0} for the API credential")]
    MissingCredential(String),

    #[error("unknown station key or group: {0}")]
    UnknownStation(String),

    #[error("invalid year range: start {start} > end {end}")]
    InvalidYearRange { start: i32, end: i32 },

    #[error("failed to read station registry {path}: {source}")]
    ReadRegistry {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse station registry {path}: {source}")]
    ParseRegistry {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("concurrency cap must be > 0")]
    InvalidConcurrency,
}
