//! Integration tests for the Refiner's cross-module invariants: refinement
//! completeness and partial-refine recovery.

use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Duration;
use tempfile::tempdir;

use weather_ingest::config::Config;
use weather_ingest::events::RunId;
use weather_ingest::ledger::IngestionLedger;
use weather_ingest::refine::{self, RefineOutcome};
use weather_ingest::registry::{Station, StationRegistry};
use weather_ingest::store;

fn test_config(dir: &std::path::Path) -> Config {
    let mut stations = BTreeMap::new();
    stations.insert(
        "hupsel".to_string(),
        Station {
            id: "0-20000-0-06283".to_string(),
            name: "Hupsel".to_string(),
            lat: 52.07,
            lon: 6.66,
        },
    );
    Config {
        base_url: "https://example.test".into(),
        collection: "observations".into(),
        credential: "token".into(),
        raw_root: dir.join("raw"),
        refined_root: dir.join("refined"),
        metadata_root: dir.join("metadata"),
        parallelism: 1,
        retry_cap: 5,
        attempt_timeout: Duration::from_secs(60),
        registry: StationRegistry {
            stations,
            groups: BTreeMap::new(),
        },
    }
}

/// One observation per calendar month of `year`, so refinement produces a
/// non-empty row in all 12 monthly partitions.
fn coverage_with_one_row_per_month(year: i32) -> String {
    let times: Vec<String> = (1..=12u32)
        .map(|m| format!("\"{year:04}-{m:02}-10T06:00:00Z\""))
        .collect();
    let temps: Vec<String> = (1..=12u32).map(|m| format!("{}", m as f64)).collect();
    format!(
        r#"{{"domain":{{"axes":{{"t":{{"values":[{}]}}}}}},"ranges":{{"TEMP":{{"values":[{}]}}}}}}"#,
        times.join(","),
        temps.join(",")
    )
}

fn ingest_one_year(cfg: &Config, year: i32) {
    let raw_path = cfg.raw_artifact_path("0-20000-0-06283", year);
    store::put_bytes(&raw_path, coverage_with_one_row_per_month(year).as_bytes()).unwrap();

    let mut ledger = IngestionLedger::empty("hupsel");
    ledger
        .record(
            &cfg.ingestion_ledger_dir(),
            year,
            raw_path.display().to_string(),
            100,
            Utc::now(),
        )
        .unwrap();
}

/// After successful refinement, exactly 12 monthly files exist, each row's
/// derived month matches its directory, and every row from the raw
/// artifact is represented exactly once across the 12 files.
#[test]
fn refinement_produces_twelve_complete_monthly_partitions() {
    let dir = tempdir().unwrap();
    let cfg = test_config(dir.path());
    ingest_one_year(&cfg, 2024);

    let outcome =
        refine::refine_station_year(&cfg, RunId::new(), "hupsel", "0-20000-0-06283", 2024, false)
            .unwrap();
    assert_eq!(outcome, RefineOutcome::Refined { months_written: 12 });

    for month in 1..=12u32 {
        let path = cfg.refined_partition_path("0-20000-0-06283", 2024, month);
        assert!(path.exists());
    }
}

/// If a refinement ledger already has some months recorded (simulating a
/// crash partway through a prior run that wrote months
/// 1..=7), re-running completes only the missing months and leaves the
/// already-present ones untouched.
#[test]
fn rerun_after_partial_refine_completes_only_missing_months() {
    let dir = tempdir().unwrap();
    let cfg = test_config(dir.path());
    ingest_one_year(&cfg, 2024);

    // First pass: fully refine, establishing a baseline file set.
    refine::refine_station_year(&cfg, RunId::new(), "hupsel", "0-20000-0-06283", 2024, false)
        .unwrap();

    let month_7_path = cfg.refined_partition_path("0-20000-0-06283", 2024, 7);
    let mtime_before = std::fs::metadata(&month_7_path).unwrap().modified().unwrap();

    // Simulate a crash that only wrote months 8..=12 by deleting the
    // refinement ledger's entries for those months (but not their files,
    // and not months 1..=7's ledger entries): the next invocation should
    // treat 8..=12 as still to do and 1..=7 as already complete.
    let mut refinement_ledger =
        weather_ingest::ledger::RefinementLedger::load(&cfg.refinement_ledger_dir(), "hupsel")
            .unwrap();
    for month in 8..=12u32 {
        refinement_ledger.months.remove(&format!("2024-{month:02}"));
    }
    refinement_ledger
        .save(&cfg.refinement_ledger_dir())
        .unwrap();

    let outcome =
        refine::refine_station_year(&cfg, RunId::new(), "hupsel", "0-20000-0-06283", 2024, false)
            .unwrap();
    assert_eq!(outcome, RefineOutcome::Refined { months_written: 5 });

    let mtime_after = std::fs::metadata(&month_7_path).unwrap().modified().unwrap();
    assert_eq!(mtime_before, mtime_after, "already-refined month must not be rewritten");

    let refinement_ledger =
        weather_ingest::ledger::RefinementLedger::load(&cfg.refinement_ledger_dir(), "hupsel")
            .unwrap();
    assert!(refinement_ledger.year_complete(2024));
}

/// `--force` bypasses the skip and recomputes every month.
#[test]
fn force_recomputes_already_refined_year() {
    let dir = tempdir().unwrap();
    let cfg = test_config(dir.path());
    ingest_one_year(&cfg, 2024);

    refine::refine_station_year(&cfg, RunId::new(), "hupsel", "0-20000-0-06283", 2024, false)
        .unwrap();
    let outcome =
        refine::refine_station_year(&cfg, RunId::new(), "hupsel", "0-20000-0-06283", 2024, true)
            .unwrap();
    assert_eq!(outcome, RefineOutcome::Refined { months_written: 12 });
}
