mod config;

use clap::Parser;
use config::{CommonConfig, Config, ConfigError, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use orchestrator::errors::FactoryError;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
enum CliCommand {
    /// Serve the data API and run the background worker
    Run {
        #[arg(long, default_value = "config.yaml")]
        config_path: PathBuf,
    },
    /// Load and validate a config file, then exit
    CheckConfig {
        #[arg(long, default_value = "config.yaml")]
        config_path: PathBuf,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Factory(#[from] FactoryError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("could not install metrics exporter: {0}")]
    Metrics(String),
}

fn main() -> Result<(), CliError> {
    let cli = CliCommand::parse();

    match cli {
        CliCommand::Run { config_path } => {
            let config = Config::from_file(&config_path)?;
            let _sentry = init_logging(&config.common);
            if let Some(metrics) = &config.common.metrics {
                init_metrics(metrics)?;
            }

            tracing::info!(config_path = %config_path.display(), "starting project factory");
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(orchestrator::run(config.factory))?;
        }
        CliCommand::CheckConfig { config_path } => {
            let config = Config::from_file(&config_path)?;
            config.factory.validate().map_err(FactoryError::from)?;
            println!("{} is valid", config_path.display());
        }
    }
    Ok(())
}

/// Events at error level also reach Sentry when a DSN is configured.
fn init_logging(common: &CommonConfig) -> Option<sentry::ClientInitGuard> {
    let guard = common.logging.as_ref().map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(guard.is_some().then(sentry::integrations::tracing::layer))
        .init();
    guard
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some(config.prefix.as_str()))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;
    Ok(())
}
