//! CoverageJSON payload parsing for the Refiner (C6).
//!
//! Parses a CoverageJSON document: a time axis (`domain.axes.t.values`)
//! aligned positionally with one numeric-valued array per named parameter
//! under `ranges`. Sibling keys (`domain.referencing`, etc.) are ignored —
//! this module only declares the fields it needs, and serde drops anything
//! undeclared by default.

use crate::error::RefineError;
use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct CoverageDocument {
    domain: Domain,
    ranges: BTreeMap<String, Range>,
}

#[derive(Debug, Deserialize)]
struct Domain {
    axes: Axes,
}

#[derive(Debug, Deserialize)]
struct Axes {
    t: TimeAxis,
}

#[derive(Debug, Deserialize)]
struct TimeAxis {
    values: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Range {
    values: Vec<Option<f64>>,
}

/// One flattened observation row: a timestamp, the station identifier, and
/// one column per upstream parameter name, plus the partitioning-only
/// derived `year`/`month` columns.
#[derive(Debug, Clone)]
pub struct Row {
    pub timestamp: DateTime<Utc>,
    pub station_id: String,
    pub params: BTreeMap<String, Option<f64>>,
    pub year: i32,
    pub month: u32,
}

/// Parses the raw payload and flattens it to one row per timestamp on the
/// time axis. The parameter name set is whatever the document declares
/// under `ranges` — schema-on-read, no closed column set.
///
/// Returns the rows plus the ordered parameter name set discovered in this
/// document, since the refined output's column set is derived from it.
pub fn flatten(
    station_key: &str,
    station_id: &str,
    year: i32,
    payload: &[u8],
) -> Result<(Vec<Row>, Vec<String>), RefineError> {
    let doc: CoverageDocument =
        serde_json::from_slice(payload).map_err(|e| RefineError::MalformedPayload {
            station_key: station_key.to_string(),
            year,
            reason: format!("not a CoverageJSON document: {e}"),
        })?;

    let axis_len = doc.domain.axes.t.values.len();
    for (name, range) in &doc.ranges {
        if range.values.len() != axis_len {
            return Err(RefineError::MalformedPayload {
                station_key: station_key.to_string(),
                year,
                reason: format!(
                    "parameter '{name}' has {} values, time axis has {axis_len}",
                    range.values.len()
                ),
            });
        }
    }

    let param_names: Vec<String> = doc.ranges.keys().cloned().collect();
    let mut rows = Vec::with_capacity(axis_len);

    for (i, raw_ts) in doc.domain.axes.t.values.iter().enumerate() {
        let timestamp = DateTime::parse_from_rfc3339(raw_ts)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RefineError::MalformedPayload {
                station_key: station_key.to_string(),
                year,
                reason: format!("unparseable timestamp '{raw_ts}': {e}"),
            })?;

        let mut params = BTreeMap::new();
        for name in &param_names {
            params.insert(name.clone(), doc.ranges[name].values[i]);
        }

        rows.push(Row {
            timestamp,
            station_id: station_id.to_string(),
            year: timestamp.year(),
            month: timestamp.month(),
            params,
        });
    }

    Ok((rows, param_names))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(times: &[&str], temps: &[Option<f64>]) -> String {
        let times_json: Vec<String> = times.iter().map(|t| format!("\"{t}\"")).collect();
        let temps_json: Vec<String> = temps
            .iter()
            .map(|v| v.map(|v| v.to_string()).unwrap_or_else(|| "null".to_string()))
            .collect();
        format!(
            r#"{{"domain":{{"axes":{{"t":{{"values":[{}]}}}},"referencing":[]}},"ranges":{{"TEMP":{{"values":[{}]}}}}}}"#,
            times_json.join(","),
            temps_json.join(",")
        )
    }

    #[test]
    fn flattens_one_row_per_timestamp() {
        let payload = sample(
            &["2024-01-01T00:00:00Z", "2024-01-01T01:00:00Z"],
            &[Some(1.5), Some(2.5)],
        );
        let (rows, params) = flatten("hupsel", "0-20000-0-06283", 2024, payload.as_bytes()).unwrap();
        assert_eq!(params, vec!["TEMP".to_string()]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].month, 1);
        assert_eq!(rows[0].year, 2024);
        assert_eq!(rows[0].params["TEMP"], Some(1.5));
        assert_eq!(rows[0].station_id, "0-20000-0-06283");
    }

    #[test]
    fn preserves_sentinel_values_without_coercion() {
        // A sentinel like -9999 for "trace precipitation" is passed through
        // untouched; sentinel handling belongs to the downstream validated
        // layer.
        let payload = sample(&["2024-06-01T00:00:00Z"], &[Some(-9999.0)]);
        let (rows, _) = flatten("hupsel", "id", 2024, payload.as_bytes()).unwrap();
        assert_eq!(rows[0].params["TEMP"], Some(-9999.0));
    }

    #[test]
    fn null_values_are_preserved_as_none() {
        let payload = sample(&["2024-06-01T00:00:00Z"], &[None]);
        let (rows, _) = flatten("hupsel", "id", 2024, payload.as_bytes()).unwrap();
        assert_eq!(rows[0].params["TEMP"], None);
    }

    #[test]
    fn rejects_missing_time_axis() {
        let payload = br#"{"domain":{"axes":{}},"ranges":{}}"#;
        let err = flatten("hupsel", "id", 2024, payload).unwrap_err();
        assert!(matches!(err, RefineError::MalformedPayload { .. }));
    }

    #[test]
    fn rejects_parameter_length_mismatch_with_time_axis() {
        let payload = r#"{"domain":{"axes":{"t":{"values":["2024-01-01T00:00:00Z","2024-01-01T01:00:00Z"]}}},"ranges":{"TEMP":{"values":[1.0]}}}"#;
        let err = flatten("hupsel", "id", 2024, payload.as_bytes()).unwrap_err();
        assert!(matches!(err, RefineError::MalformedPayload { .. }));
    }
}
