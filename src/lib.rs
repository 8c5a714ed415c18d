//! Historical weather-observation ingestion and refinement engine.
//!
//! Pulls hourly in-situ meteorological observations for a fixed set of
//! stations from an OGC Environmental Data Retrieval (EDR) endpoint,
//! materializes each response as an immutable raw artifact in a
//! partitioned layout, and derives a columnar, partition-pruned
//! representation from those artifacts.
//!
//! Every component (C1–C8) is exposed here so the two CLI binaries
//! (`weather-ingest-load`, `weather-ingest-refine`) stay thin wrappers, and
//! so the orchestrator is unit-testable by constructing alternate
//! `Config`s per test rather than reading process-wide state.

pub mod config;
pub mod coverage;
pub mod error;
pub mod events;
pub mod http_client;
pub mod ledger;
pub mod orchestrator;
pub mod refine;
pub mod registry;
pub mod retry;
pub mod station;
pub mod store;
