//! Structured benchmark results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key of one benchmark entry.
///
/// `Group` keys are hierarchical paths ending in a leaf name; `Name` keys
/// are plain identifiers. The derived total order is the report order:
/// every `Group` key precedes every `Name` key, `Group` keys compare
/// element-wise (a prefix sorts before its extensions), `Name` keys compare
/// by natural string order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BenchKey {
    Group(Vec<String>),
    Name(String),
}

impl BenchKey {
    pub fn group<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Group(parts.into_iter().map(Into::into).collect())
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }
}

impl std::fmt::Display for BenchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BenchKey::Group(parts) => {
                write!(f, "[")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{part:?}")?;
                }
                write!(f, "]")
            }
            BenchKey::Name(name) => f.write_str(name),
        }
    }
}

/// One measurement record.
///
/// `time` and `memory` follow the BenchmarkTools convention: the reported
/// value is the minimum over repeated trials, not a mean, to minimize
/// scheduling-jitter noise. Tolerances are relative fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Minimum observed wall time, nanoseconds.
    pub time: f64,
    /// Relative time tolerance before a change is significant.
    pub time_tolerance: f64,
    /// Minimum observed allocated memory, bytes.
    pub memory: f64,
    /// Relative memory tolerance before a change is significant.
    pub memory_tolerance: f64,
    /// GC time within the trial, nanoseconds.
    pub gctime: f64,
    /// Allocation count.
    pub allocs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResultEntry {
    key: BenchKey,
    #[serde(flatten)]
    measurement: Measurement,
}

/// The structured result of one pipeline run: an ordered mapping from
/// benchmark key to measurement. Produced once per run, immutable
/// thereafter.
///
/// Persisted as a JSON array of entries rather than an object, since the
/// keys are structured values, not strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredResult {
    entries: BTreeMap<BenchKey, Measurement>,
}

impl StructuredResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: BenchKey, measurement: Measurement) {
        self.entries.insert(key, measurement);
    }

    pub fn get(&self, key: &BenchKey) -> Option<&Measurement> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in report order.
    pub fn iter(&self) -> impl Iterator<Item = (&BenchKey, &Measurement)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &BenchKey> {
        self.entries.keys()
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        let entries: Vec<ResultEntry> = serde_json::from_slice(bytes)?;
        Ok(Self {
            entries: entries
                .into_iter()
                .map(|e| (e.key, e.measurement))
                .collect(),
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let entries: Vec<ResultEntry> = self
            .entries
            .iter()
            .map(|(key, measurement)| ResultEntry {
                key: key.clone(),
                measurement: *measurement,
            })
            .collect();
        serde_json::to_string_pretty(&entries)
    }
}

impl FromIterator<(BenchKey, Measurement)> for StructuredResult {
    fn from_iter<T: IntoIterator<Item = (BenchKey, Measurement)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(time: f64) -> Measurement {
        Measurement {
            time,
            time_tolerance: 0.05,
            memory: 1024.0,
            memory_tolerance: 0.01,
            gctime: 0.0,
            allocs: 3,
        }
    }

    #[test]
    fn test_key_order_groups_before_names() {
        let mut keys = vec![
            BenchKey::name("z"),
            BenchKey::group(["a", "b"]),
            BenchKey::group(["a"]),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                BenchKey::group(["a"]),
                BenchKey::group(["a", "b"]),
                BenchKey::name("z"),
            ]
        );
    }

    #[test]
    fn test_json_round_trip() {
        let result: StructuredResult = [
            (BenchKey::group(["linalg", "mul"]), m(120.0)),
            (BenchKey::name("startup"), m(9000.0)),
        ]
        .into_iter()
        .collect();

        let json = result.to_json().unwrap();
        let parsed = StructuredResult::from_json(json.as_bytes()).unwrap();
        assert_eq!(parsed, result);
    }

    #[test]
    fn test_from_json_structured_keys() {
        let json = r#"[
            {"key": ["io", "read"], "time": 10.0, "time_tolerance": 0.05,
             "memory": 64.0, "memory_tolerance": 0.01, "gctime": 0.0, "allocs": 1},
            {"key": "boot", "time": 55.0, "time_tolerance": 0.05,
             "memory": 0.0, "memory_tolerance": 0.01, "gctime": 0.0, "allocs": 0}
        ]"#;
        let result = StructuredResult::from_json(json.as_bytes()).unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.get(&BenchKey::group(["io", "read"])).is_some());
        assert!(result.get(&BenchKey::name("boot")).is_some());
    }
}
