//! Collector registry.
//!
//! See [`Registry`] for details.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::collector::Collector;
use crate::config::Config;
use crate::error::ConfigError;
use crate::query::QueryAdapter;

/// Everything a collector constructor may depend on.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    /// Parsed process configuration.
    pub config: &'a Config,
    /// Query source collectors may issue their own queries against.
    pub query: &'a Arc<dyn QueryAdapter>,
}

/// Builds a collector from the process configuration.
pub type Constructor = fn(&BuildContext<'_>) -> Result<Box<dyn Collector>, ConfigError>;

struct CollectorDescriptor {
    constructor: Constructor,
    dependencies: BTreeSet<String>,
}

impl std::fmt::Debug for CollectorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorDescriptor")
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Ordered, duplicate free set of enabled collector names with meta entries
/// expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnabledSet {
    names: Vec<String>,
}

impl EnabledSet {
    fn push(&mut self, name: &str) {
        if !self.contains(name) {
            self.names.push(name.to_string());
        }
    }

    /// Returns `true` if the collector is enabled.
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Returns the enabled names in the order they were requested.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A collector registry.
///
/// Built once at startup. Collectors are registered with their constructor
/// and the counter objects they read, meta entries name groups of
/// collectors. The enabled collector list is then validated with
/// [`Registry::resolve_enabled`] and turned into collector instances with
/// [`Registry::build`].
///
/// ```
/// # use counter_exporter::collector::{Collector, ScrapeContext};
/// # use counter_exporter::error::{CollectError, ConfigError};
/// # use counter_exporter::metrics::MetricSample;
/// # use counter_exporter::registry::{BuildContext, Registry};
/// #
/// # #[derive(Debug)]
/// # struct Noop;
/// # impl Collector for Noop {
/// #     fn collect(&self, _: &ScrapeContext, _: &mut Vec<MetricSample>) -> Result<(), CollectError> {
/// #         Ok(())
/// #     }
/// # }
/// fn noop(_: &BuildContext<'_>) -> Result<Box<dyn Collector>, ConfigError> {
///     Ok(Box::new(Noop))
/// }
///
/// let mut registry = Registry::default();
/// registry.register("cpu", noop, ["Processor Information"]).unwrap();
/// registry.register("memory", noop, ["Memory"]).unwrap();
/// registry.register_meta("[defaults]", &["cpu", "memory"]).unwrap();
///
/// let enabled = registry.resolve_enabled(&["[defaults]", "cpu"]).unwrap();
/// assert_eq!(vec!["cpu", "memory"], enabled.names());
/// assert_eq!(2, registry.dependencies(&enabled).len());
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    collectors: BTreeMap<String, CollectorDescriptor>,
    meta: BTreeMap<String, Vec<String>>,
}

impl Registry {
    /// Register a collector.
    ///
    /// Fails if a collector or meta entry of the same name exists.
    pub fn register<I, S>(
        &mut self,
        name: &str,
        constructor: Constructor,
        dependencies: I,
    ) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.collectors.contains_key(name) || self.meta.contains_key(name) {
            return Err(ConfigError::DuplicateCollector(name.to_string()));
        }

        self.collectors.insert(
            name.to_string(),
            CollectorDescriptor {
                constructor,
                dependencies: dependencies.into_iter().map(Into::into).collect(),
            },
        );
        Ok(())
    }

    /// Register a meta entry expanding to the given, already registered,
    /// collectors.
    pub fn register_meta(&mut self, name: &str, members: &[&str]) -> Result<(), ConfigError> {
        if self.collectors.contains_key(name) || self.meta.contains_key(name) {
            return Err(ConfigError::DuplicateCollector(name.to_string()));
        }
        if let Some(member) = members.iter().find(|m| !self.collectors.contains_key(**m)) {
            return Err(ConfigError::InvalidMeta {
                name: name.to_string(),
                member: member.to_string(),
            });
        }

        self.meta.insert(
            name.to_string(),
            members.iter().map(|m| m.to_string()).collect(),
        );
        Ok(())
    }

    /// Validate the requested collector names and expand meta entries.
    ///
    /// Fails listing every unknown name. Requesting a name twice, or a meta
    /// entry together with one of its members, enables it once.
    pub fn resolve_enabled<S: AsRef<str>>(&self, names: &[S]) -> Result<EnabledSet, ConfigError> {
        let mut enabled = EnabledSet::default();
        let mut unknown: Vec<String> = Vec::new();

        for name in names.iter().map(AsRef::as_ref) {
            if let Some(members) = self.meta.get(name) {
                for member in members {
                    enabled.push(member);
                }
            } else if self.collectors.contains_key(name) {
                enabled.push(name);
            } else if !unknown.iter().any(|u| u == name) {
                unknown.push(name.to_string());
            }
        }

        if !unknown.is_empty() {
            return Err(ConfigError::UnknownCollectors(unknown));
        }
        Ok(enabled)
    }

    /// Returns the union of the dependencies of the enabled collectors.
    pub fn dependencies(&self, enabled: &EnabledSet) -> BTreeSet<String> {
        enabled
            .names()
            .iter()
            .filter_map(|n| self.collectors.get(n))
            .flat_map(|d| d.dependencies.iter().cloned())
            .collect()
    }

    /// Construct the enabled collectors, in enabled order.
    pub fn build(
        &self,
        enabled: &EnabledSet,
        ctx: &BuildContext<'_>,
    ) -> Result<Vec<(String, Arc<dyn Collector>)>, ConfigError> {
        enabled
            .names()
            .iter()
            .map(|name| {
                let descriptor = self
                    .collectors
                    .get(name)
                    .ok_or_else(|| ConfigError::UnknownCollectors(vec![name.clone()]))?;
                let collector = (descriptor.constructor)(ctx)?;
                Ok((name.clone(), Arc::from(collector)))
            })
            .collect()
    }
}

/// Split a comma separated list, dropping empty entries.
///
/// ```
/// # use counter_exporter::registry::parse_list;
/// assert_eq!(vec!["net", "dfsr"], parse_list(" net,,dfsr ,"));
/// ```
pub fn parse_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
