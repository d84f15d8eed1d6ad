//! Counter snapshot model and the [`SnapshotProvider`] contract.
//!
//! A scrape fetches every counter object its collectors declared, in one
//! batch, before any collector runs. The result is a [`Snapshot`]: object
//! name to [`CounterTable`], or to the error that prevented reading it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

/// One row of a counter object, e.g. one network interface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CounterInstance {
    name: Option<String>,
    counters: BTreeMap<String, f64>,
}

impl CounterInstance {
    /// Create a named instance.
    pub fn named<N: Into<String>>(name: N) -> Self {
        Self {
            name: Some(name.into()),
            counters: BTreeMap::new(),
        }
    }

    /// Create the instance of a singleton object.
    pub fn singleton() -> Self {
        Self::default()
    }

    /// Builder style [`CounterInstance::insert`].
    pub fn with_counter<N: Into<String>>(mut self, counter: N, value: f64) -> Self {
        self.insert(counter, value);
        self
    }

    /// Set the value of a counter.
    pub fn insert<N: Into<String>>(&mut self, counter: N, value: f64) {
        self.counters.insert(counter.into(), value);
    }

    /// Returns the instance name, `None` for singleton objects.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the value of the given counter.
    pub fn counter(&self, counter: &str) -> Option<f64> {
        self.counters.get(counter).copied()
    }
}

/// All instances of one counter object.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterTable {
    object: String,
    instances: Vec<CounterInstance>,
}

impl CounterTable {
    /// Create an empty table for the given object.
    pub fn new<N: Into<String>>(object: N) -> Self {
        Self {
            object: object.into(),
            instances: Vec::new(),
        }
    }

    /// Builder style [`CounterTable::push`].
    pub fn with_instance(mut self, instance: CounterInstance) -> Self {
        self.push(instance);
        self
    }

    /// Append an instance.
    pub fn push(&mut self, instance: CounterInstance) {
        self.instances.push(instance);
    }

    /// Returns the counter object name.
    pub fn object(&self) -> &str {
        &self.object
    }

    /// Returns the instances in source order.
    pub fn instances(&self) -> &[CounterInstance] {
        &self.instances
    }
}

/// Failure to read counter objects.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// The source does not know the object.
    #[error("counter object {0:?} is not available")]
    NotFound(String),
    /// The object exists but could not be read.
    #[error("failed to read counter object {object:?}: {reason}")]
    Read {
        /// Object name.
        object: String,
        /// Source specific reason.
        reason: String,
    },
    /// The source as a whole could not be reached.
    #[error("counter source unavailable: {0}")]
    Unavailable(String),
    /// The batch fetch did not finish before the scrape deadline.
    #[error("counter fetch timed out")]
    TimedOut,
}

/// Point-in-time counter tables of one scrape.
#[derive(Debug, Default)]
pub struct Snapshot {
    objects: HashMap<String, Result<CounterTable, FetchError>>,
}

impl Snapshot {
    /// A snapshot in which every given object failed with the same error.
    pub fn failed(objects: &BTreeSet<String>, error: FetchError) -> Self {
        Self {
            objects: objects
                .iter()
                .map(|o| (o.clone(), Err(error.clone())))
                .collect(),
        }
    }

    /// Add a table, keyed by its object name.
    pub fn insert(&mut self, table: CounterTable) {
        self.objects.insert(table.object().to_string(), Ok(table));
    }

    /// Record that an object could not be read.
    pub fn insert_error<N: Into<String>>(&mut self, object: N, error: FetchError) {
        self.objects.insert(object.into(), Err(error));
    }

    /// Returns the table or error for the given object, `None` if the object
    /// was not part of the fetch.
    pub fn get(&self, object: &str) -> Option<Result<&CounterTable, &FetchError>> {
        self.objects.get(object).map(Result::as_ref)
    }
}

/// Source of counter snapshots, e.g. the operating system's performance
/// counter library.
///
/// Called once per scrape with the union of the dependencies of all enabled
/// collectors. Objects that cannot be read are reported per object inside the
/// [`Snapshot`]; an `Err` marks every requested object as failed.
///
/// The scrape stops waiting at `deadline`. Implementations should give up by
/// then too, returning [`FetchError::TimedOut`], instead of holding a thread
/// for a result nobody reads.
pub trait SnapshotProvider: std::fmt::Debug + Send + Sync + 'static {
    /// Fetch the given counter objects.
    fn fetch(
        &self,
        objects: &BTreeSet<String>,
        deadline: Option<Instant>,
    ) -> Result<Snapshot, FetchError>;
}
