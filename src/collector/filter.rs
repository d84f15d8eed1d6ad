//! Whitelist/blacklist instance filtering.

use crate::error::ConfigError;
use regex::Regex;

/// Selects instances by name.
///
/// An instance is included iff its whole name matches the whitelist and its
/// whole name does not match the blacklist.
///
/// ```
/// # use counter_exporter::collector::filter::InstanceFilter;
/// let filter = InstanceFilter::new(".+", "^Loopback$").unwrap();
/// assert!(filter.matches("Ethernet0"));
/// assert!(!filter.matches("Loopback"));
/// ```
#[derive(Debug, Clone)]
pub struct InstanceFilter {
    whitelist: Regex,
    blacklist: Regex,
}

impl InstanceFilter {
    /// Compile a filter. Both patterns are anchored at both ends.
    pub fn new(whitelist: &str, blacklist: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            whitelist: anchored("whitelist", whitelist)?,
            blacklist: anchored("blacklist", blacklist)?,
        })
    }

    /// Returns `true` if the instance passes the filter.
    pub fn matches(&self, name: &str) -> bool {
        self.whitelist.is_match(name) && !self.blacklist.is_match(name)
    }
}

fn anchored(flag: &'static str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|source| ConfigError::InvalidPattern {
        flag,
        pattern: pattern.to_string(),
        source,
    })
}
