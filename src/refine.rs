//! Refiner (C6): reads a raw artifact, flattens its CoverageJSON payload
//! into row-major form, partitions by calendar month, and writes 12 monthly
//! columnar tables via the Atomic Store. Partition directory walk and
//! tmp-then-final rename per output file; rows accumulate in memory and
//! flush at each partition boundary. Ledger/partial-failure bookkeeping
//! reuses `RefinementLedger` from `ledger.rs`.

use crate::config::Config;
use crate::coverage::{self, Row};
use crate::error::RefineError;
use crate::events::{self, RunId};
use crate::ledger::{IngestionLedger, RefinementLedger};
use crate::store;
use arrow::array::{Array, Float64Array, Int32Array, StringArray, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineOutcome {
    Refined { months_written: u32 },
    Skipped,
}

/// True if `month` has a refinement ledger entry *and* the file it points
/// at still exists. A month whose entry survives but whose file was
/// removed out-of-band (or never finished writing) is not "present" —
/// mirrors the ingestion side's `final_path.exists()` guard at
/// `station.rs`'s skip check.
fn month_materialized(
    ledger: &RefinementLedger,
    cfg: &Config,
    station_id: &str,
    year: i32,
    month: u32,
) -> bool {
    let Some(entry) = ledger.entry(year, month) else {
        return false;
    };
    let path = if entry.path.is_empty() {
        cfg.refined_partition_path(station_id, year, month)
    } else {
        PathBuf::from(&entry.path)
    };
    path.exists()
}

/// Refines one (station, year) raw artifact into 12 monthly partitions.
/// Months already present in the refinement ledger *and* materialized on
/// disk are left untouched unless `force` is set.
pub fn refine_station_year(
    cfg: &Config,
    run_id: RunId,
    station_key: &str,
    station_id: &str,
    year: i32,
    force: bool,
) -> Result<RefineOutcome, RefineError> {
    let ingestion_ledger = IngestionLedger::load(&cfg.ingestion_ledger_dir(), station_key)?;
    let Some(entry) = ingestion_ledger.years.get(&year) else {
        return Err(RefineError::NotIngested {
            station_key: station_key.to_string(),
            year,
        });
    };

    let mut refinement_ledger = RefinementLedger::load(&cfg.refinement_ledger_dir(), station_key)?;

    let year_fully_materialized =
        (1..=12u32).all(|m| month_materialized(&refinement_ledger, cfg, station_id, year, m));
    if !force && year_fully_materialized {
        return Ok(RefineOutcome::Skipped);
    }

    let raw_path = if entry.path.is_empty() {
        cfg.raw_artifact_path(station_id, year)
    } else {
        PathBuf::from(&entry.path)
    };

    let payload = fs::read(&raw_path).map_err(|source| RefineError::ReadRaw {
        path: raw_path.display().to_string(),
        source,
    })?;

    let (rows, param_names) = coverage::flatten(station_key, station_id, year, &payload)?;

    // Partition by month, deduping by timestamp within a month: when two
    // rows share a timestamp, the row appearing later in the source axis
    // wins. `BTreeMap::insert` overwriting on a repeated key, fed in source
    // order, gives exactly that, and iteration order is then ascending
    // timestamp for free.
    let mut by_month: BTreeMap<u32, BTreeMap<DateTime<Utc>, Row>> =
        (1..=12u32).map(|m| (m, BTreeMap::new())).collect();
    for row in rows {
        by_month
            .get_mut(&row.month)
            .expect("coverage::flatten derives month in 1..=12")
            .insert(row.timestamp, row);
    }

    let mut missing = Vec::new();
    let mut months_written = 0u32;

    for month in 1..=12u32 {
        if !force && month_materialized(&refinement_ledger, cfg, station_id, year, month) {
            continue;
        }

        let rows_for_month: Vec<&Row> = by_month[&month].values().collect();
        let batch = build_record_batch(station_id, &param_names, &rows_for_month);

        let path = cfg.refined_partition_path(station_id, year, month);
        match store::put_table(&path, &batch) {
            Ok(()) => {
                let size_bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                refinement_ledger.record(
                    &cfg.refinement_ledger_dir(),
                    year,
                    month,
                    path.display().to_string(),
                    size_bytes,
                    rows_for_month.len() as u64,
                    Utc::now(),
                )?;
                events::refine_month(run_id, station_key, year, month, rows_for_month.len());
                months_written += 1;
            }
            Err(err) => {
                // Already-written months stay in place (each atomically
                // complete); the next invocation skips them and retries
                // only the missing ones.
                missing.push(month);
                events::refine_failed(
                    run_id,
                    station_key,
                    year,
                    &format!("{missing:?}"),
                    &err.to_string(),
                );
            }
        }
    }

    if !missing.is_empty() {
        return Err(RefineError::PartialRefine {
            station_key: station_key.to_string(),
            year,
            missing,
        });
    }

    Ok(RefineOutcome::Refined { months_written })
}

/// Builds the Arrow schema and `RecordBatch` for one monthly partition.
/// Column set is `timestamp`, `station_id`, one `Float64` column per
/// discovered parameter name, then the partitioning-only `year`/`month`
/// columns. An empty `rows` slice still yields a zero-row batch with the
/// full inferred schema, so every refined year has exactly 12 monthly
/// files even for months with no observations.
fn build_record_batch(station_id: &str, param_names: &[String], rows: &[&Row]) -> RecordBatch {
    let mut fields = vec![
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
            false,
        ),
        Field::new("station_id", DataType::Utf8, false),
    ];
    for name in param_names {
        fields.push(Field::new(name, DataType::Float64, true));
    }
    fields.push(Field::new("year", DataType::Int32, false));
    fields.push(Field::new("month", DataType::Int32, false));

    let schema = Arc::new(Schema::new(fields));

    let timestamps: Vec<i64> = rows.iter().map(|r| r.timestamp.timestamp_millis()).collect();
    let ts_array = TimestampMillisecondArray::from(timestamps).with_timezone("UTC");

    let station_ids: Vec<&str> = rows.iter().map(|_| station_id).collect();
    let station_array = StringArray::from(station_ids);

    let years: Vec<i32> = rows.iter().map(|r| r.year).collect();
    let months: Vec<i32> = rows.iter().map(|r| r.month as i32).collect();

    let mut columns: Vec<Arc<dyn Array>> = vec![Arc::new(ts_array), Arc::new(station_array)];

    for name in param_names {
        let values: Vec<Option<f64>> = rows
            .iter()
            .map(|r| r.params.get(name).copied().flatten())
            .collect();
        columns.push(Arc::new(Float64Array::from(values)));
    }

    columns.push(Arc::new(Int32Array::from(years)));
    columns.push(Arc::new(Int32Array::from(months)));

    RecordBatch::try_new(schema, columns).expect("schema and columns are constructed in lockstep")
}
