//! Progress Ledger (C3): per-station persistent record of materialized
//! work, the sole source of truth for idempotent resume.
//!
//! One typed struct per shape (`load`, `save`, small mutation methods that
//! keep derived summary fields in sync) in two parallel forms — one entry
//! per year, one entry per (year, month) — plus a migrate-on-read path for
//! a legacy bare-year-list format.

use crate::error::LedgerError;
use crate::store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------
// Ingestion ledger
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct YearEntry {
    pub loaded_at: DateTime<Utc>,
    pub path: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct IngestionSummary {
    pub years_loaded: usize,
    pub total_size_bytes: u64,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestionLedger {
    pub station_key: String,
    pub years: BTreeMap<i32, YearEntry>,
    pub summary: IngestionSummary,
}

/// Pre-canonical shape: a bare list of year integers. Tolerated on read and
/// rewritten to the canonical shape on the next `record`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LegacyOrCanonicalIngestion {
    Canonical(IngestionLedger),
    Legacy(Vec<i32>),
}

impl IngestionLedger {
    pub fn empty(station_key: &str) -> Self {
        Self {
            station_key: station_key.to_string(),
            years: BTreeMap::new(),
            summary: IngestionSummary::default(),
        }
    }

    fn path_for(metadata_root: &Path, station_key: &str) -> PathBuf {
        metadata_root.join(format!("{station_key}.json"))
    }

    pub fn load(metadata_root: &Path, station_key: &str) -> Result<Self, LedgerError> {
        let path = Self::path_for(metadata_root, station_key);
        if !path.exists() {
            return Ok(Self::empty(station_key));
        }

        let raw = fs::read_to_string(&path).map_err(|source| LedgerError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let parsed: LegacyOrCanonicalIngestion =
            serde_json::from_str(&raw).map_err(|source| LedgerError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        Ok(match parsed {
            LegacyOrCanonicalIngestion::Canonical(ledger) => ledger,
            LegacyOrCanonicalIngestion::Legacy(years) => {
                let synthetic_now = Utc::now();
                let mut ledger = Self::empty(station_key);
                for year in years {
                    ledger.years.insert(
                        year,
                        YearEntry {
                            loaded_at: synthetic_now,
                            path: String::new(),
                            size_bytes: 0,
                        },
                    );
                }
                ledger.recompute_summary();
                ledger
            }
        })
    }

    pub fn is_loaded(&self, year: i32) -> bool {
        self.years.contains_key(&year)
    }

    fn recompute_summary(&mut self) {
        self.summary.years_loaded = self.years.len();
        self.summary.total_size_bytes = self.years.values().map(|e| e.size_bytes).sum();
        self.summary.year_min = self.years.keys().next().copied();
        self.summary.year_max = self.years.keys().next_back().copied();
        self.summary.updated_at = Some(Utc::now());
    }

    /// Add or replace a year's entry, recompute the summary, and persist
    /// atomically.
    pub fn record(
        &mut self,
        metadata_root: &Path,
        year: i32,
        path: String,
        size_bytes: u64,
        loaded_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.years.insert(
            year,
            YearEntry {
                loaded_at,
                path,
                size_bytes,
            },
        );
        self.recompute_summary();
        self.save(metadata_root)
    }

    pub fn save(&self, metadata_root: &Path) -> Result<(), LedgerError> {
        let path = Self::path_for(metadata_root, &self.station_key);
        let json = serde_json::to_vec_pretty(self).expect("ledger serialization is infallible");
        store::put_bytes(&path, &json)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Refinement ledger
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthEntry {
    pub refined_at: DateTime<Utc>,
    pub path: String,
    pub size_bytes: u64,
    pub row_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RefinementSummary {
    pub months_refined: usize,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Key is the literal `YYYY-MM` string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefinementLedger {
    pub station_key: String,
    pub months: BTreeMap<String, MonthEntry>,
    pub summary: RefinementSummary,
}

impl RefinementLedger {
    pub fn empty(station_key: &str) -> Self {
        Self {
            station_key: station_key.to_string(),
            months: BTreeMap::new(),
            summary: RefinementSummary::default(),
        }
    }

    fn path_for(metadata_root: &Path, station_key: &str) -> PathBuf {
        metadata_root.join(format!("{station_key}.json"))
    }

    fn month_key(year: i32, month: u32) -> String {
        format!("{year:04}-{month:02}")
    }

    pub fn load(metadata_root: &Path, station_key: &str) -> Result<Self, LedgerError> {
        let path = Self::path_for(metadata_root, station_key);
        if !path.exists() {
            return Ok(Self::empty(station_key));
        }
        let raw = fs::read_to_string(&path).map_err(|source| LedgerError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let ledger: RefinementLedger =
            serde_json::from_str(&raw).map_err(|source| LedgerError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        Ok(ledger)
    }

    pub fn is_refined(&self, year: i32, month: u32) -> bool {
        self.months.contains_key(&Self::month_key(year, month))
    }

    /// The recorded entry for one calendar month, if present.
    pub fn entry(&self, year: i32, month: u32) -> Option<&MonthEntry> {
        self.months.get(&Self::month_key(year, month))
    }

    /// True once all 12 calendar months of `year` have an entry.
    pub fn year_complete(&self, year: i32) -> bool {
        (1..=12).all(|m| self.is_refined(year, m))
    }

    fn recompute_summary(&mut self) {
        self.summary.months_refined = self.months.len();
        let years: Vec<i32> = self
            .months
            .keys()
            .filter_map(|k| k.split('-').next().and_then(|y| y.parse().ok()))
            .collect();
        self.summary.year_min = years.iter().min().copied();
        self.summary.year_max = years.iter().max().copied();
        self.summary.updated_at = Some(Utc::now());
    }

    pub fn record(
        &mut self,
        metadata_root: &Path,
        year: i32,
        month: u32,
        path: String,
        size_bytes: u64,
        row_count: u64,
        refined_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.months.insert(
            Self::month_key(year, month),
            MonthEntry {
                refined_at,
                path,
                size_bytes,
                row_count,
            },
        );
        self.recompute_summary();
        self.save(metadata_root)
    }

    pub fn save(&self, metadata_root: &Path) -> Result<(), LedgerError> {
        let path = Self::path_for(metadata_root, &self.station_key);
        let json = serde_json::to_vec_pretty(self).expect("ledger serialization is infallible");
        store::put_bytes(&path, &json)?;
        Ok(())
    }
}
