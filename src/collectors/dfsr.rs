//! DFS Replication counters.
//!
//! One child collector per enabled perflib source, wrapped in a
//! [`Composite`] so an unreadable source only fails its own child.

use crate::collector::composite::{ChildCollector, Composite};
use crate::collector::table::{CounterField, MetricTable};
use crate::collector::{Collector, ScrapeContext};
use crate::config::DfsrConfig;
use crate::error::{CollectError, ConfigError};
use crate::metrics::{MetricSample, MetricSpec};
use crate::registry::{parse_list, BuildContext};

/// Registry name.
pub const NAME: &str = "dfsr";

const LABELS: &[&str] = &["name"];

const fn counter(name: &'static str, help: &'static str) -> MetricSpec {
    MetricSpec::counter(name, help, LABELS)
}

const fn gauge(name: &'static str, help: &'static str) -> MetricSpec {
    MetricSpec::gauge(name, help, LABELS)
}

const CONNECTION_FIELDS: &[CounterField] = &[
    CounterField::new(
        "Bandwidth Savings Using DFS Replication",
        counter(
            "bandwidth_savings_using_dfs_replication_total",
            "Total amount of bandwidth savings using DFS Replication for this connection, in bytes",
        ),
    ),
    CounterField::new(
        "Total Bytes Received",
        counter("bytes_received_total", "Total bytes received for connection"),
    ),
    CounterField::new(
        "Compressed Size of Files Received",
        counter(
            "compressed_size_of_files_received_total",
            "Total compressed size of files received on the connection, in bytes",
        ),
    ),
    CounterField::new(
        "Total Files Received",
        counter("files_received_total", "Total number of files received for connection"),
    ),
    CounterField::new(
        "RDC Bytes Received",
        counter(
            "rdc_bytes_received_total",
            "Total bytes received on the connection while replicating files using Remote Differential Compression",
        ),
    ),
    CounterField::new(
        "RDC Compressed Size of Files Received",
        counter(
            "rdc_compressed_size_of_files_received_total",
            "Total compressed size of files received with Remote Differential Compression, in bytes",
        ),
    ),
    CounterField::new(
        "RDC Number of Files Received",
        counter(
            "rdc_number_of_files_received_total",
            "Total number of files received with Remote Differential Compression",
        ),
    ),
    CounterField::new(
        "RDC Size of Files Received",
        counter(
            "rdc_size_of_files_received_total",
            "Total uncompressed size of files received with Remote Differential Compression, in bytes",
        ),
    ),
    CounterField::new(
        "Size of Files Received",
        counter(
            "size_of_files_received_total",
            "Total uncompressed size of files received on the connection, in bytes",
        ),
    ),
];

const FOLDER_FIELDS: &[CounterField] = &[
    CounterField::new(
        "Bandwidth Savings Using DFS Replication",
        counter(
            "bandwidth_savings_using_dfs_replication_total",
            "Total amount of bandwidth savings using DFS Replication for this folder, in bytes",
        ),
    ),
    CounterField::new(
        "Compressed Size of Files Received",
        counter(
            "compressed_size_of_files_received_total",
            "Total compressed size of files received on the folder, in bytes",
        ),
    ),
    CounterField::new(
        "Conflict Bytes Cleaned Up",
        counter(
            "conflict_bytes_cleaned_up_total",
            "Total size of conflict loser files and folders deleted from the Conflict and Deleted folder, in bytes",
        ),
    ),
    CounterField::new(
        "Conflict Bytes Generated",
        counter(
            "conflict_bytes_generated_total",
            "Total size of conflict loser files and folders moved to the Conflict and Deleted folder, in bytes",
        ),
    ),
    CounterField::new(
        "Conflict Files Cleaned Up",
        counter(
            "conflict_files_cleaned_up_total",
            "Number of conflict loser files deleted from the Conflict and Deleted folder",
        ),
    ),
    CounterField::new(
        "Conflict Files Generated",
        counter(
            "conflict_files_generated_total",
            "Number of files and folders moved to the Conflict and Deleted folder",
        ),
    ),
    CounterField::new(
        "Conflict Folder Cleanups Completed",
        counter(
            "conflict_folder_cleanups_total",
            "Number of deletions of conflict loser files and folders in the Conflict and Deleted folder",
        ),
    ),
    CounterField::new(
        "Conflict Space In Use",
        gauge(
            "conflict_space_in_use",
            "Total size of the conflict loser files and folders currently in the Conflict and Deleted folder",
        ),
    ),
    CounterField::new(
        "Deleted Space In Use",
        gauge(
            "deleted_space_in_use",
            "Total size (in bytes) of the deleted files and folders currently in the Conflict and Deleted folder",
        ),
    ),
    CounterField::new(
        "Deleted Bytes Cleaned Up",
        counter(
            "deleted_bytes_cleaned_up_total",
            "Total size (in bytes) of replicating deleted files and folders that were cleaned up from the Conflict and Deleted folder",
        ),
    ),
    CounterField::new(
        "Deleted Bytes Generated",
        counter(
            "deleted_bytes_generated_total",
            "Total size (in bytes) of replicated deleted files and folders that were moved to the Conflict and Deleted folder after they were deleted from a replicated folder on a sending member",
        ),
    ),
    CounterField::new(
        "Deleted Files Cleaned Up",
        counter(
            "deleted_files_cleaned_up_total",
            "Number of files and folders that were cleaned up from the Conflict and Deleted folder",
        ),
    ),
    CounterField::new(
        "Deleted Files Generated",
        counter(
            "deleted_files_generated_total",
            "Number of deleted files and folders that were moved to the Conflict and Deleted folder",
        ),
    ),
    CounterField::new(
        "File Installs Retried",
        counter(
            "file_installs_retried_total",
            "Total number of file installs that are being retried due to sharing violations or other errors encountered when installing the files",
        ),
    ),
    CounterField::new(
        "File Installs Succeeded",
        counter(
            "file_installs_succeeded_total",
            "Total number of files that were successfully received from sending members and installed locally on this server",
        ),
    ),
    CounterField::new(
        "Total Files Received",
        counter("files_received_total", "Total number of files received"),
    ),
    CounterField::new(
        "RDC Bytes Received",
        counter(
            "rdc_bytes_received_total",
            "Total number of bytes received in replicating files using Remote Differential Compression",
        ),
    ),
    CounterField::new(
        "RDC Compressed Size of Files Received",
        counter(
            "rdc_compressed_size_of_files_received_total",
            "Total compressed size (in bytes) of the files received with Remote Differential Compression",
        ),
    ),
    CounterField::new(
        "RDC Number of Files Received",
        counter(
            "rdc_number_of_files_received_total",
            "Total number of files received with Remote Differential Compression",
        ),
    ),
    CounterField::new(
        "RDC Size of Files Received",
        counter(
            "rdc_size_of_files_received_total",
            "Total uncompressed size (in bytes) of the files received with Remote Differential Compression",
        ),
    ),
    CounterField::new(
        "Size of Files Received",
        counter(
            "size_of_files_received_total",
            "Total uncompressed size (in bytes) of the files received",
        ),
    ),
    CounterField::new(
        "Staging Space In Use",
        gauge(
            "staging_space_in_use",
            "Total size of files and folders currently in the staging folder.",
        ),
    ),
    CounterField::new(
        "Staging Bytes Cleaned Up",
        counter(
            "staging_bytes_cleaned_up_total",
            "Total size (in bytes) of the files and folders that have been cleaned up from the staging folder",
        ),
    ),
    CounterField::new(
        "Staging Bytes Generated",
        counter(
            "staging_bytes_generated_total",
            "Total size (in bytes) of replicated files and folders in the staging folder created by the DFS Replication service since last restart",
        ),
    ),
    CounterField::new(
        "Staging Files Cleaned Up",
        counter(
            "staging_files_cleaned_up_total",
            "Total number of files and folders that have been cleaned up from the staging folder",
        ),
    ),
    CounterField::new(
        "Staging Files Generated",
        counter(
            "staging_files_generated_total",
            "Total number of times replicated files and folders have been staged by the DFS Replication service",
        ),
    ),
    CounterField::new(
        "Updates Dropped",
        counter(
            "updates_dropped_total",
            "Total number of redundant file replication update records that have been ignored by the DFS Replication service because they did not change the replicated file or folder",
        ),
    ),
];

const VOLUME_FIELDS: &[CounterField] = &[
    CounterField::new(
        "Database Lookups",
        counter(
            "database_lookups_total",
            "Total number of database lookups performed by the DFS Replication service",
        ),
    ),
    CounterField::new(
        "Database Commits",
        counter(
            "database_commits_total",
            "Total number of database commits performed by the DFS Replication service",
        ),
    ),
    CounterField::new(
        "USN Journal Records Unread Percentage",
        gauge(
            "usn_journal_unread_percentage",
            "Percentage of USN journal records that are unread",
        ),
    ),
    CounterField::new(
        "USN Journal Records Accepted",
        counter(
            "usn_journal_records_accepted_total",
            "Total number of USN journal records accepted",
        ),
    ),
    CounterField::new(
        "USN Journal Records Read",
        counter(
            "usn_journal_records_read_total",
            "Total number of USN journal records read",
        ),
    ),
];

/// A DFSR perflib source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Source {
    Connection,
    Folder,
    Volume,
}

impl Source {
    /// Returns the source name as used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Connection => "connection",
            Source::Folder => "folder",
            Source::Volume => "volume",
        }
    }

    /// Returns the perflib object the source reads.
    pub fn object(&self) -> &'static str {
        match self {
            Source::Connection => "DFS Replication Connections",
            Source::Folder => "DFS Replicated Folders",
            Source::Volume => "DFS Replication Service Volumes",
        }
    }

    fn fields(&self) -> &'static [CounterField] {
        match self {
            Source::Connection => CONNECTION_FIELDS,
            Source::Folder => FOLDER_FIELDS,
            Source::Volume => VOLUME_FIELDS,
        }
    }
}

impl std::str::FromStr for Source {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connection" => Ok(Source::Connection),
            "folder" => Ok(Source::Folder),
            "volume" => Ok(Source::Volume),
            _ => Err(ConfigError::UnknownDfsrSource(s.to_string())),
        }
    }
}

/// Parse the enabled source list, dropping duplicates.
pub fn expand_sources(list: &str) -> Result<Vec<Source>, ConfigError> {
    let mut sources = Vec::new();
    for name in parse_list(list) {
        let source: Source = name.parse()?;
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    Ok(sources)
}

/// Returns the perflib objects the enabled sources read.
pub fn dependencies(config: &DfsrConfig) -> Result<Vec<String>, ConfigError> {
    Ok(expand_sources(&config.sources_enabled)?
        .iter()
        .map(|s| s.object().to_string())
        .collect())
}

/// Publishes the counters of one source, labelled with the instance name.
#[derive(Debug)]
pub struct SourceChild {
    source: Source,
    table: MetricTable,
}

impl SourceChild {
    /// Create new [`SourceChild`].
    pub fn new(namespace: &str, source: Source) -> Self {
        let subsystem = format!("{}_{}", NAME, source.as_str());
        Self {
            source,
            table: MetricTable::new(namespace, &subsystem, source.fields()),
        }
    }
}

impl ChildCollector for SourceChild {
    fn name(&self) -> &str {
        self.source.as_str()
    }

    fn collect(
        &self,
        ctx: &ScrapeContext,
        samples: &mut Vec<MetricSample>,
    ) -> Result<(), CollectError> {
        let table = ctx.table(self.source.object())?;
        self.table.collect_table(table, samples);
        Ok(())
    }
}

/// Registry constructor.
pub fn build(ctx: &BuildContext<'_>) -> Result<Box<dyn Collector>, ConfigError> {
    let namespace = &ctx.config.namespace;
    let children = expand_sources(&ctx.config.dfsr.sources_enabled)?
        .into_iter()
        .map(|source| Box::new(SourceChild::new(namespace, source)) as Box<dyn ChildCollector>)
        .collect();

    Ok(Box::new(Composite::new(namespace, NAME, children)))
}
