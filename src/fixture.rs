//! Counter sources shipped with the crate.
//!
//! [`FixtureSource`] replays counters and query results from a JSON
//! document, [`Unavailable`] stands in when no source is configured.
//!
//! ```json
//! {
//!   "objects": {
//!     "DFS Replication Service Volumes": [
//!       { "instance": "C:", "counters": { "USN Records Accepted": 12 } }
//!     ]
//!   },
//!   "failing": { "DFS Replicated Folders": "access denied" },
//!   "queries": {
//!     "Win32_PerfRawData_Tcpip_NetworkInterface": [
//!       { "Name": "Ethernet0", "BytesReceivedPersec": 42 }
//!     ]
//!   }
//! }
//! ```

use crate::counters::{CounterInstance, CounterTable, FetchError, Snapshot, SnapshotProvider};
use crate::query::{Query, QueryAdapter, QueryError, Row, Value};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::debug;

/// Failure to load a fixture document.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    /// The file could not be read.
    #[error("failed to read fixture {path:?}")]
    Io {
        /// Fixture path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not a valid fixture document.
    #[error("failed to parse fixture {path:?}")]
    Parse {
        /// Fixture path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
struct Document {
    #[serde(default)]
    objects: HashMap<String, Vec<InstanceDocument>>,
    #[serde(default)]
    failing: HashMap<String, String>,
    #[serde(default)]
    queries: HashMap<String, Vec<serde_json::Map<String, serde_json::Value>>>,
}

#[derive(Debug, Deserialize)]
struct InstanceDocument {
    #[serde(default)]
    instance: Option<String>,
    #[serde(default)]
    counters: BTreeMap<String, f64>,
}

/// Counter and query source backed by a JSON file.
///
/// The file is re-read whenever its modification time changes, so a running
/// exporter picks up edits on the next scrape.
#[derive(Debug)]
pub struct FixtureSource {
    path: PathBuf,
    cache: Mutex<Option<(SystemTime, Arc<Document>)>>,
}

impl FixtureSource {
    /// Open a fixture, failing if it cannot be loaded right away.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FixtureError> {
        let source = Self {
            path: path.as_ref().to_path_buf(),
            cache: Mutex::new(None),
        };
        source.load()?;
        Ok(source)
    }

    fn load(&self) -> Result<Arc<Document>, FixtureError> {
        let io = |source| FixtureError::Io {
            path: self.path.clone(),
            source,
        };
        let modified = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(io)?;

        let mut cache = self.cache.lock();
        if let Some((at, document)) = cache.as_ref() {
            if *at == modified {
                return Ok(document.clone());
            }
        }

        let content = std::fs::read_to_string(&self.path).map_err(io)?;
        let document: Document =
            serde_json::from_str(&content).map_err(|source| FixtureError::Parse {
                path: self.path.clone(),
                source,
            })?;
        debug!("loaded fixture {}", self.path.display());

        let document = Arc::new(document);
        *cache = Some((modified, document.clone()));
        Ok(document)
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

impl SnapshotProvider for FixtureSource {
    fn fetch(
        &self,
        objects: &BTreeSet<String>,
        deadline: Option<Instant>,
    ) -> Result<Snapshot, FetchError> {
        if expired(deadline) {
            return Err(FetchError::TimedOut);
        }
        let document = self
            .load()
            .map_err(|e| FetchError::Unavailable(error_chain(&e)))?;

        let mut snapshot = Snapshot::default();
        for object in objects {
            if let Some(reason) = document.failing.get(object) {
                snapshot.insert_error(
                    object.clone(),
                    FetchError::Read {
                        object: object.clone(),
                        reason: reason.clone(),
                    },
                );
            } else if let Some(instances) = document.objects.get(object) {
                let mut table = CounterTable::new(object.clone());
                for doc in instances {
                    let mut instance = match &doc.instance {
                        Some(name) => CounterInstance::named(name.clone()),
                        None => CounterInstance::singleton(),
                    };
                    for (counter, value) in &doc.counters {
                        instance.insert(counter.clone(), *value);
                    }
                    table.push(instance);
                }
                snapshot.insert(table);
            } else {
                snapshot.insert_error(object.clone(), FetchError::NotFound(object.clone()));
            }
        }
        Ok(snapshot)
    }
}

impl QueryAdapter for FixtureSource {
    fn run_query(
        &self,
        query: &Query,
        deadline: Option<Instant>,
    ) -> Result<Vec<Row>, QueryError> {
        if expired(deadline) {
            return Err(QueryError::TimedOut(query.text()));
        }
        let document = self.load().map_err(|e| QueryError::Failed {
            query: query.text(),
            reason: error_chain(&e),
        })?;

        let rows = document
            .queries
            .get(query.class())
            .ok_or_else(|| QueryError::Failed {
                query: query.text(),
                reason: "invalid class".to_string(),
            })?;

        Ok(rows
            .iter()
            .map(|row| {
                let mut out = Row::new();
                for (column, value) in row {
                    if selected(query, column) {
                        out.insert(column.clone(), convert(value));
                    }
                }
                out
            })
            .collect())
    }
}

fn selected(query: &Query, column: &str) -> bool {
    query.columns().is_empty() || query.columns().iter().any(|c| c == column)
}

fn convert(value: &serde_json::Value) -> Value {
    use serde_json::Value as Json;

    match value {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_u64() {
            Some(u) => Value::Unsigned(u),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::Text(s.clone()),
        Json::Array(items) => {
            let bytes: Option<Vec<u8>> = items
                .iter()
                .map(|i| i.as_u64().and_then(|u| u8::try_from(u).ok()))
                .collect();
            match bytes {
                Some(bytes) => Value::Bytes(bytes),
                None => Value::Text(value.to_string()),
            }
        }
        Json::Object(_) => Value::Text(value.to_string()),
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(e) = source {
        message.push_str(": ");
        message.push_str(&e.to_string());
        source = e.source();
    }
    message
}

/// Source used when none is configured. Every fetch and query fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

const UNAVAILABLE: &str = "no counter source configured";

impl SnapshotProvider for Unavailable {
    fn fetch(
        &self,
        _objects: &BTreeSet<String>,
        _deadline: Option<Instant>,
    ) -> Result<Snapshot, FetchError> {
        Err(FetchError::Unavailable(UNAVAILABLE.to_string()))
    }
}

impl QueryAdapter for Unavailable {
    fn run_query(
        &self,
        _query: &Query,
        _deadline: Option<Instant>,
    ) -> Result<Vec<Row>, QueryError> {
        Err(QueryError::Unavailable(UNAVAILABLE.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DOCUMENT: &str = r#"{
        "objects": {
            "Volumes": [
                { "instance": "C:", "counters": { "Accepted": 12 } },
                { "counters": { "Accepted": 1.5 } }
            ]
        },
        "failing": { "Folders": "access denied" },
        "queries": {
            "Disks": [
                { "Name": "disk0", "Active": true, "Data": [1, 2, 255], "Load": 0.5 }
            ]
        }
    }"#;

    fn fixture(content: &str) -> (tempfile::NamedTempFile, FixtureSource) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let source = FixtureSource::open(file.path()).unwrap();
        (file, source)
    }

    #[test]
    fn fetch_objects() {
        let (_file, source) = fixture(DOCUMENT);
        let objects = ["Volumes", "Folders", "Missing"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let snapshot = source.fetch(&objects, None).unwrap();

        let volumes = snapshot.get("Volumes").unwrap().unwrap();
        assert_eq!(2, volumes.instances().len());
        assert_eq!(Some("C:"), volumes.instances()[0].name());
        assert_eq!(None, volumes.instances()[1].name());
        assert_eq!(Some(1.5), volumes.instances()[1].counter("Accepted"));
        assert!(matches!(
            snapshot.get("Folders"),
            Some(Err(FetchError::Read { .. }))
        ));
        assert!(matches!(
            snapshot.get("Missing"),
            Some(Err(FetchError::NotFound(_)))
        ));
    }

    #[test]
    fn run_query() {
        let (_file, source) = fixture(DOCUMENT);

        let rows = source.run_query(&Query::select("Disks", &[]), None).unwrap();
        assert_eq!(1, rows.len());
        assert_eq!("disk0", rows[0].text("Name").unwrap());
        assert!(rows[0].bool("Active").unwrap());
        assert_eq!(&[1, 2, 255], rows[0].bytes("Data").unwrap());
        assert_eq!(0.5, rows[0].f64("Load").unwrap());

        let rows = source
            .run_query(&Query::select("Disks", &["Name"]), None)
            .unwrap();
        assert_eq!("disk0", rows[0].text("Name").unwrap());
        assert_eq!(
            Err(QueryError::MissingColumn("Active".into())),
            rows[0].bool("Active")
        );

        assert!(matches!(
            source.run_query(&Query::select("Nope", &[]), None),
            Err(QueryError::Failed { .. })
        ));
    }

    #[test]
    fn invalid_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ nope").unwrap();

        assert!(matches!(
            FixtureSource::open(file.path()),
            Err(FixtureError::Parse { .. })
        ));
    }

    #[test]
    fn unavailable() {
        assert!(matches!(
            Unavailable.fetch(&BTreeSet::new(), None),
            Err(FetchError::Unavailable(_))
        ));
        assert!(matches!(
            Unavailable.run_query(&Query::select("X", &[]), None),
            Err(QueryError::Unavailable(_))
        ));
    }

    #[test]
    fn past_deadline_gives_up() {
        let (_file, source) = fixture(DOCUMENT);
        let past = Some(Instant::now() - std::time::Duration::from_millis(1));

        assert_eq!(
            Err(FetchError::TimedOut),
            source
                .fetch(&["Volumes".to_string()].into_iter().collect(), past)
                .map(|_| ())
        );
        assert!(matches!(
            source.run_query(&Query::select("Disks", &["Name"]), past),
            Err(QueryError::TimedOut(_))
        ));
    }
}
