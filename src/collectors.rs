//! Built-in collectors.

use crate::config::Config;
use crate::error::ConfigError;
use crate::registry::Registry;

pub mod container;
pub mod dfsr;
pub mod net;
pub mod smart;

/// Meta entry enabling every built-in collector.
pub const DEFAULTS: &str = "[defaults]";

/// Returns a registry holding the built-in collectors and the
/// [`DEFAULTS`] meta entry.
///
/// The DFSR collector's dependencies follow its enabled sources, so an
/// unknown source already fails here.
pub fn builtin(config: &Config) -> Result<Registry, ConfigError> {
    let mut registry = Registry::default();

    registry.register(net::NAME, net::build, Vec::<String>::new())?;
    registry.register(dfsr::NAME, dfsr::build, dfsr::dependencies(&config.dfsr)?)?;
    registry.register(smart::NAME, smart::build, Vec::<String>::new())?;
    registry.register(container::NAME, container::build, Vec::<String>::new())?;
    registry.register_meta(
        DEFAULTS,
        &[net::NAME, dfsr::NAME, smart::NAME, container::NAME],
    )?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_enable_everything() {
        let config = Config::default();
        let registry = builtin(&config).unwrap();

        let enabled = registry.resolve_enabled(&config.enabled_collectors()).unwrap();
        assert_eq!(vec!["net", "dfsr", "smart", "container"], enabled.names());

        let dependencies: Vec<_> = registry.dependencies(&enabled).into_iter().collect();
        assert_eq!(
            vec![
                "DFS Replicated Folders",
                "DFS Replication Connections",
                "DFS Replication Service Volumes",
            ],
            dependencies
        );
    }

    #[test]
    fn dfsr_dependencies_follow_sources() {
        let config = Config::parse_from([
            "counter-exporter",
            "--collectors.dfsr.sources-enabled",
            "volume,volume",
        ]);
        let registry = builtin(&config).unwrap();

        let enabled = registry.resolve_enabled(&["dfsr"]).unwrap();
        let dependencies: Vec<_> = registry.dependencies(&enabled).into_iter().collect();
        assert_eq!(vec!["DFS Replication Service Volumes"], dependencies);
    }

    #[test]
    fn unknown_dfsr_source_is_fatal() {
        let config = Config::parse_from([
            "counter-exporter",
            "--collectors.dfsr.sources-enabled",
            "volume,replica",
        ]);

        assert!(matches!(
            builtin(&config),
            Err(ConfigError::UnknownDfsrSource(s)) if s == "replica"
        ));
    }
}
