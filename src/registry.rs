//! Station registry: read-only input mapping mnemonic keys to station
//! identity, plus named groups.

use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// The `stations.json` document: mnemonic key -> station identity, plus
/// named groups resolving to ordered lists of keys (e.g. "core").
#[derive(Debug, Clone, Deserialize)]
pub struct StationRegistry {
    pub stations: BTreeMap<String, Station>,
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
}

impl StationRegistry {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadRegistry {
            path: path.display().to_string(),
            source,
        })?;
        let registry: StationRegistry =
            serde_json::from_str(&raw).map_err(|source| ConfigError::ParseRegistry {
                path: path.display().to_string(),
                source,
            })?;
        Ok(registry)
    }

    pub fn get(&self, key: &str) -> Option<&Station> {
        self.stations.get(key)
    }

    /// Resolve a CLI selector into an ordered, duplicate-free list of station
    /// keys. A selector is one key, a comma-separated list of keys, or a
    /// group name.
    pub fn resolve_selector(&self, selector: &str) -> Result<Vec<String>, ConfigError> {
        if let Some(group) = self.groups.get(selector) {
            let mut seen = std::collections::HashSet::new();
            let mut out = Vec::new();
            for key in group {
                if !self.stations.contains_key(key) {
                    return Err(ConfigError::UnknownStation(key.clone()));
                }
                if seen.insert(key.clone()) {
                    out.push(key.clone());
                }
            }
            return Ok(out);
        }

        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for key in selector.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if !self.stations.contains_key(key) {
                return Err(ConfigError::UnknownStation(key.to_string()));
            }
            if seen.insert(key.to_string()) {
                out.push(key.to_string());
            }
        }

        if out.is_empty() {
            return Err(ConfigError::UnknownStation(selector.to_string()));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StationRegistry {
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
        stations.insert(
            "debilt".to_string(),
            Station {
                id: "0-20000-0-06260".to_string(),
                name: "De Bilt".to_string(),
                lat: 52.1,
                lon: 5.18,
            },
        );
        let mut groups = BTreeMap::new();
        groups.insert(
            "core".to_string(),
            vec!["hupsel".to_string(), "debilt".to_string()],
        );
        StationRegistry { stations, groups }
    }

    #[test]
    fn resolves_single_key() {
        let reg = registry();
        assert_eq!(reg.resolve_selector("hupsel").unwrap(), vec!["hupsel"]);
    }

    #[test]
    fn resolves_comma_list_preserving_order_and_dedup() {
        let reg = registry();
        let resolved = reg.resolve_selector("hupsel,debilt,hupsel").unwrap();
        assert_eq!(resolved, vec!["hupsel", "debilt"]);
    }

    #[test]
    fn resolves_group_name() {
        let reg = registry();
        let resolved = reg.resolve_selector("core").unwrap();
        assert_eq!(resolved, vec!["hupsel", "debilt"]);
    }

    #[test]
    fn rejects_unknown_key() {
        let reg = registry();
        assert!(reg.resolve_selector("nope").is_err());
    }
}
