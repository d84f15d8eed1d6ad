#![deny(dead_code)]
#![deny(missing_docs)]
#![deny(unused)]
#![forbid(unsafe_code)]
#![warn(missing_debug_implementations)]

//! Scrape orchestration engine republishing operating system performance
//! counters in the [Prometheus](https://prometheus.io/) text exposition
//! format.
//!
//! Collectors are registered once at startup with the counter objects they
//! read. Every scrape then fetches the union of those objects in a single
//! batch, runs all enabled collectors concurrently against that snapshot and
//! reports per collector whether it succeeded and how long it took. Failing
//! collectors never affect the output of the others.
//!
//! # Examples
//!
//! ```
//! use counter_exporter::collector::table::{CounterField, MetricTable};
//! use counter_exporter::collector::{Collector, ScrapeContext};
//! use counter_exporter::counters::{
//!     CounterInstance, CounterTable, FetchError, Snapshot, SnapshotProvider,
//! };
//! use counter_exporter::encoding::text::encode;
//! use counter_exporter::error::CollectError;
//! use counter_exporter::metrics::{MetricSample, MetricSpec};
//! use counter_exporter::scrape::Scraper;
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//! use std::time::Instant;
//!
//! // A collector publishing one counter of the "Memory" object.
//! #[derive(Debug)]
//! struct Memory(MetricTable);
//!
//! impl Collector for Memory {
//!     fn collect(
//!         &self,
//!         ctx: &ScrapeContext,
//!         samples: &mut Vec<MetricSample>,
//!     ) -> Result<(), CollectError> {
//!         let table = ctx.table("Memory")?;
//!         self.0.collect_table(table, samples);
//!         Ok(())
//!     }
//! }
//!
//! // A counter source, usually backed by the operating system.
//! #[derive(Debug)]
//! struct Source;
//!
//! impl SnapshotProvider for Source {
//!     fn fetch(
//!         &self,
//!         objects: &BTreeSet<String>,
//!         _deadline: Option<Instant>,
//!     ) -> Result<Snapshot, FetchError> {
//!         let mut snapshot = Snapshot::default();
//!         if objects.contains("Memory") {
//!             snapshot.insert(CounterTable::new("Memory").with_instance(
//!                 CounterInstance::named("").with_counter("Page Faults/sec", 42.0),
//!             ));
//!         }
//!         Ok(snapshot)
//!     }
//! }
//!
//! const FIELDS: &[CounterField] = &[CounterField::new(
//!     "Page Faults/sec",
//!     MetricSpec::counter("page_faults_total", "Page faults.", &["name"]),
//! )];
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let scraper = Scraper::new(
//!     "windows",
//!     vec![(
//!         "memory".to_string(),
//!         Arc::new(Memory(MetricTable::new("windows", "memory", FIELDS))) as Arc<dyn Collector>,
//!     )],
//!     ["Memory".to_string()].into_iter().collect(),
//!     Arc::new(Source),
//! );
//!
//! let report = scraper.scrape(None).await.unwrap();
//! let mut buffer = String::new();
//! encode(&mut buffer, &report.samples).unwrap();
//!
//! assert!(buffer.contains("windows_memory_page_faults_total{name=\"\"} 42\n"));
//! assert!(buffer.contains("windows_exporter_collector_success{collector=\"memory\"} 1\n"));
//! # });
//! ```
//!
//! See [`registry::Registry`] for how collectors are registered and enabled
//! and [`collector::composite`] for collectors made of several sources.

pub mod attributes;
pub mod collector;
pub mod collectors;
pub mod config;
pub mod counters;
pub mod encoding;
pub mod error;
pub mod fixture;
pub mod metrics;
pub mod query;
pub mod registry;
pub mod scrape;
pub mod server;
