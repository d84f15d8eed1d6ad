//! Error types of the configuration and collection failure domains.

use crate::counters::FetchError;
use crate::query::QueryError;
use std::time::Duration;

/// Invalid configuration. Always fatal before the server starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A collector name was registered twice.
    #[error("collector {0:?} is already registered")]
    DuplicateCollector(String),
    /// The enabled list names collectors that are not registered.
    #[error("unknown collectors: {}", .0.join(", "))]
    UnknownCollectors(Vec<String>),
    /// A meta entry refers to a collector that is not registered.
    #[error("meta entry {name:?} refers to unknown collector {member:?}")]
    InvalidMeta {
        /// Meta entry name.
        name: String,
        /// Unknown member.
        member: String,
    },
    /// A filter pattern does not compile.
    #[error("invalid pattern {pattern:?} for {flag}")]
    InvalidPattern {
        /// Flag the pattern was given for.
        flag: &'static str,
        /// The pattern as given.
        pattern: String,
        /// Compilation error.
        #[source]
        source: regex::Error,
    },
    /// Unknown child source of the DFSR collector.
    #[error("unknown dfsr source {0:?}, expected one of connection, folder, volume")]
    UnknownDfsrSource(String),
    /// The metrics path cannot be routed.
    #[error("invalid telemetry path {path:?}: {reason}")]
    InvalidTelemetryPath {
        /// The path as given.
        path: String,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Failure of a single collector run.
///
/// Recorded as `success=0` for the affected collector, never fatal for the
/// scrape.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollectError {
    /// A declared counter object is not part of the snapshot.
    #[error("counter object {0:?} missing from snapshot")]
    MissingObject(String),
    /// A declared counter object could not be read.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// A query failed.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// The collector did not finish before the scrape deadline.
    #[error("collector timed out after {0:?}")]
    Timeout(Duration),
    /// The collector panicked.
    #[error("collector panicked")]
    Panicked,
    /// Runs of this collector from earlier scrapes timed out and have not
    /// returned yet.
    #[error("{0} earlier run(s) still in progress after timing out")]
    Stalled(usize),
    /// Some children of a composite collector failed.
    #[error("{failed} of {total} child collectors failed")]
    ChildrenFailed {
        /// Number of failed children.
        failed: usize,
        /// Number of children run.
        total: usize,
    },
}
