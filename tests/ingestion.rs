//! Integration tests for the ingestion pipeline's cross-module invariants:
//! idempotent resume, bounded concurrency, and per-station failure
//! isolation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use weather_ingest::config::Config;
use weather_ingest::events::RunId;
use weather_ingest::ledger::IngestionLedger;
use weather_ingest::orchestrator;
use weather_ingest::registry::{Station, StationRegistry};
use weather_ingest::station;

fn registry_with(keys: &[&str]) -> StationRegistry {
    let mut stations = BTreeMap::new();
    for key in keys {
        stations.insert(
            key.to_string(),
            Station {
                id: format!("0-20000-0-{key}"),
                name: key.to_string(),
                lat: 52.0,
                lon: 6.0,
            },
        );
    }
    StationRegistry {
        stations,
        groups: BTreeMap::new(),
    }
}

fn config_for(dir: &Path, base_url: String, registry: StationRegistry, parallelism: usize) -> Config {
    config_with_retry_cap(dir, base_url, registry, parallelism, 5)
}

fn config_with_retry_cap(
    dir: &Path,
    base_url: String,
    registry: StationRegistry,
    parallelism: usize,
    retry_cap: u32,
) -> Config {
    Config {
        base_url,
        collection: "observations".into(),
        credential: "token".into(),
        raw_root: dir.join("raw"),
        refined_root: dir.join("refined"),
        metadata_root: dir.join("metadata"),
        parallelism,
        retry_cap,
        attempt_timeout: Duration::from_secs(60),
        registry,
    }
}

/// A clean run materializes the artifact and records the ledger entry;
/// re-running the identical command performs zero HTTP calls for the
/// already-loaded chunk, and the artifact/ledger are left untouched.
#[tokio::test]
async fn idempotent_rerun_skips_already_loaded_chunk() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"domain\":{}}"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let registry = registry_with(&["hupsel"]);
    let cfg = config_for(dir.path(), server.uri(), registry, 1);
    let retriever = weather_ingest::http_client::HttpRetriever::new(&cfg);
    let run_id = RunId::new();

    let first = station::run(&cfg, run_id, &retriever, "hupsel", 2024, 2024, false).await;
    assert_eq!(first.completed, 1);
    assert_eq!(first.skipped, 0);
    assert!(first.failed.is_empty());

    let ledger_before = IngestionLedger::load(&cfg.ingestion_ledger_dir(), "hupsel").unwrap();
    let artifact_path = cfg.raw_artifact_path("0-20000-0-hupsel", 2024);
    let mtime_before = std::fs::metadata(&artifact_path).unwrap().modified().unwrap();

    // Second run: the mock only expects exactly one request total, so a
    // second HTTP call here would fail the mock's expectation on drop.
    let second = station::run(&cfg, run_id, &retriever, "hupsel", 2024, 2024, false).await;
    assert_eq!(second.completed, 0);
    assert_eq!(second.skipped, 1);
    assert!(second.failed.is_empty());

    let ledger_after = IngestionLedger::load(&cfg.ingestion_ledger_dir(), "hupsel").unwrap();
    assert_eq!(ledger_before, ledger_after);

    let mtime_after = std::fs::metadata(&artifact_path).unwrap().modified().unwrap();
    assert_eq!(mtime_before, mtime_after, "unchanged chunk must not be rewritten");
}

/// With parallelism N, at most N HTTP calls are in flight at any instant
/// across concurrent station pipelines.
#[tokio::test]
async fn orchestrator_bounds_concurrency_across_stations() {
    struct CountingResponder {
        in_flight: Arc<AtomicUsize>,
        max_seen: Arc<AtomicUsize>,
    }

    impl Respond for CountingResponder {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(current, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            ResponseTemplate::new(200).set_body_string("{\"domain\":{}}")
        }
    }

    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(CountingResponder {
            in_flight: in_flight.clone(),
            max_seen: max_seen.clone(),
        })
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let registry = registry_with(&["a", "b", "c"]);
    let cfg = config_for(dir.path(), server.uri(), registry, 2);
    let station_keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];

    let run = orchestrator::ingest(&cfg, RunId::new(), station_keys, 2020, 2020, false)
        .await
        .unwrap();

    assert!(!run.any_failed());
    assert!(
        max_seen.load(Ordering::SeqCst) <= 2,
        "observed {} concurrent in-flight requests, parallelism cap was 2",
        max_seen.load(Ordering::SeqCst)
    );
}

/// A station that exhausts retries on one year does not affect other
/// stations' outcomes, and its ledger gets no entry for the
/// failed year.
#[tokio::test]
async fn failing_station_does_not_affect_others() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(move |req: &Request| {
            if req.url.path().contains("0-20000-0-c") {
                ResponseTemplate::new(500)
            } else {
                ResponseTemplate::new(200).set_body_string("{\"domain\":{}}")
            }
        })
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let registry = registry_with(&["a", "b", "c"]);
    // retry_cap 1 keeps this test fast: station c's failure still exhausts
    // its (single-attempt) retry budget, exercising the same isolation
    // behavior without waiting out the exponential backoff schedule.
    let cfg = config_with_retry_cap(dir.path(), server.uri(), registry, 3, 1);
    let station_keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];

    let run = orchestrator::ingest(&cfg, RunId::new(), station_keys, 2020, 2020, false)
        .await
        .unwrap();

    assert!(run.any_failed());

    let a_outcome = run.stations.iter().find(|s| s.station_key == "a").unwrap();
    let b_outcome = run.stations.iter().find(|s| s.station_key == "b").unwrap();
    let c_outcome = run.stations.iter().find(|s| s.station_key == "c").unwrap();

    assert_eq!(a_outcome.completed, 1);
    assert!(a_outcome.failed.is_empty());
    assert_eq!(b_outcome.completed, 1);
    assert!(b_outcome.failed.is_empty());
    assert!(!c_outcome.failed.is_empty());

    let ledger_c = IngestionLedger::load(&cfg.ingestion_ledger_dir(), "c").unwrap();
    assert!(!ledger_c.is_loaded(2020));
}
