//! Configuration Loader (C8): assembles an immutable run configuration from
//! CLI flags, the API credential environment variable, and the station
//! registry. No module-level mutable state — every component receives its
//! `Config` explicitly at construction.

use crate::error::ConfigError;
use crate::registry::StationRegistry;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub collection: String,
    pub credential: String,

    pub raw_root: PathBuf,
    pub refined_root: PathBuf,
    pub metadata_root: PathBuf,

    pub parallelism: usize,
    pub retry_cap: u32,
    pub attempt_timeout: Duration,

    pub registry: StationRegistry,
}

impl Config {
    /// Build a `Config` from already-parsed CLI primitives plus environment
    /// and filesystem lookups: validate eagerly, fail fast, construct once.
    #[allow(clippy::too_many_arguments)]
    pub fn load(
        base_url: String,
        collection: String,
        credential_env: &str,
        raw_root: PathBuf,
        refined_root: PathBuf,
        metadata_root: PathBuf,
        parallelism: usize,
        retry_cap: u32,
        attempt_timeout_secs: u64,
        registry_path: PathBuf,
    ) -> Result<Self, ConfigError> {
        let credential = env::var(credential_env)
            .map_err(|_| ConfigError::MissingCredential(credential_env.to_string()))?;

        if parallelism == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }

        let registry = StationRegistry::load(&registry_path)?;

        Ok(Self {
            base_url,
            collection,
            credential,
            raw_root,
            refined_root,
            metadata_root,
            parallelism,
            retry_cap: retry_cap.max(1),
            attempt_timeout: Duration::from_secs(attempt_timeout_secs.max(1)),
            registry,
        })
    }

    pub fn ingestion_ledger_dir(&self) -> PathBuf {
        self.metadata_root.join("ingestion")
    }

    pub fn refinement_ledger_dir(&self) -> PathBuf {
        self.metadata_root.join("refined")
    }

    pub fn raw_artifact_path(&self, station_id: &str, year: i32) -> PathBuf {
        self.raw_root
            .join(format!("station_id={station_id}"))
            .join(format!("year={year:04}"))
            .join("data.json")
    }

    pub fn refined_partition_path(&self, station_id: &str, year: i32, month: u32) -> PathBuf {
        self.refined_root
            .join(format!("station_id={station_id}"))
            .join(format!("year={year:04}"))
            .join(format!("month={month:02}"))
            .join("data.parquet")
    }

    pub fn validate_year_range(&self, start: i32, end: i32) -> Result<(), ConfigError> {
        if start > end {
            return Err(ConfigError::InvalidYearRange { start, end });
        }
        Ok(())
    }
}
