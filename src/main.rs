use clap::Parser;
use counter_exporter::collectors;
use counter_exporter::config::Config;
use counter_exporter::counters::SnapshotProvider;
use counter_exporter::fixture::{FixtureSource, Unavailable};
use counter_exporter::query::QueryAdapter;
use counter_exporter::registry::BuildContext;
use counter_exporter::scrape::Scraper;
use counter_exporter::server;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();
    init_logging(&config.log_level);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let mut message = e.to_string();
            let mut source = e.source();
            while let Some(cause) = source {
                message.push_str(": ");
                message.push_str(&cause.to_string());
                source = cause.source();
            }
            error!("{}", message);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    config.web.validate()?;

    let (provider, query): (Arc<dyn SnapshotProvider>, Arc<dyn QueryAdapter>) =
        match &config.fixture {
            Some(path) => {
                let source = Arc::new(FixtureSource::open(path)?);
                info!("reading counters from {}", path.display());
                (source.clone(), source)
            }
            None => {
                warn!("no counter source configured, every collector will fail");
                (Arc::new(Unavailable), Arc::new(Unavailable))
            }
        };

    let registry = collectors::builtin(&config)?;
    let enabled = registry.resolve_enabled(&config.enabled_collectors())?;
    let ctx = BuildContext {
        config: &config,
        query: &query,
    };
    let scraper = Scraper::from_registry(&registry, &enabled, &ctx, provider)?;
    info!(
        "enabled collectors: {}",
        scraper.collectors().collect::<Vec<_>>().join(", ")
    );

    server::serve(&config.web, Arc::new(scraper)).await?;
    Ok(())
}
