use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use describe_engine::config::Config;
use describe_engine::pool::WorkerPool;
use describe_engine::provider::{Credentials, ProviderConfig};
use describe_engine::quota::graph::register_resource_graph_types;
use describe_engine::scope::subscriptions::SubscriptionLister;
use describe_engine::scope::{RegionCatalog, ScopeLister, ScopeResolver};
use describe_engine::{DescribeRequest, Engine, ErrorClassifier, Registry, TriggerType};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use url::Url;

/// Fan-out describe engine for cloud resource inventory
#[derive(Parser, Debug)]
#[command(name = "describe-engine", version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List supported resource types
    Types,

    /// List the scopes a describe would fan out over
    Scopes {
        /// Partition to list regions for
        #[arg(long)]
        partition: Option<String>,

        /// Include opt-in regions or disabled subscriptions
        #[arg(long)]
        include_disabled: bool,

        /// List Azure subscriptions instead of regions
        #[arg(long, conflicts_with = "partition")]
        subscriptions: bool,

        /// Bearer token used to list subscriptions
        #[arg(long, env = "AZURE_ACCESS_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Describe one or more resource types
    Describe {
        /// Resource type to describe (repeatable)
        #[arg(short = 't', long = "resource-type", required = true)]
        resource_types: Vec<String>,

        /// Account or tenant the resources belong to
        #[arg(short, long, default_value = "")]
        account: String,

        /// Scope to describe (repeatable); lists scopes when omitted
        #[arg(short, long = "scope")]
        scopes: Vec<String>,

        /// Include opt-in regions when listing scopes
        #[arg(long)]
        include_disabled: bool,

        /// Partition to list regions for
        #[arg(long)]
        partition: Option<String>,

        /// Bearer token passed to Describers
        #[arg(long, env = "AZURE_ACCESS_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("describe-engine started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("describe-engine").join("describe-engine.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".describe-engine").join("describe-engine.log");
    }
    PathBuf::from("describe-engine.log")
}

/// Provider config for Azure calls: management endpoint plus optional bearer token
fn provider_config(config: &Config, token: Option<String>) -> Result<ProviderConfig> {
    let endpoint = Url::parse(&config.effective_graph_endpoint())
        .context("Invalid Resource Graph endpoint")?;
    let credentials = token
        .map(|t| Credentials::bearer(&t))
        .unwrap_or_default();
    Ok(ProviderConfig::new(credentials).with_endpoint(endpoint))
}

fn build_registry(config: &Config) -> Registry {
    let mut registry = Registry::new();
    register_resource_graph_types(&mut registry, config.effective_batch_size());
    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;
    let config = Config::load();

    match args.command {
        Command::Types => {
            for resource_type in build_registry(&config).list_supported_resource_types() {
                println!("{}", resource_type);
            }
            Ok(())
        }
        Command::Scopes {
            partition,
            include_disabled,
            subscriptions,
            token,
        } => {
            let scopes = if subscriptions {
                SubscriptionLister::new()
                    .list_scopes(&provider_config(&config, token)?, include_disabled)
                    .await?
            } else {
                RegionCatalog::new(&config.effective_partition(partition.as_deref()))
                    .list_scopes(&ProviderConfig::default(), include_disabled)
                    .await?
            };
            for scope in scopes {
                println!("{}", scope);
            }
            Ok(())
        }
        Command::Describe {
            resource_types,
            account,
            scopes,
            include_disabled,
            partition,
            token,
        } => {
            let catalog = RegionCatalog::new(&config.effective_partition(partition.as_deref()));
            let engine = Engine::new(
                Arc::new(build_registry(&config)),
                ScopeResolver::from_catalog(catalog),
                Arc::new(ErrorClassifier::builtin()),
            );

            let provider = provider_config(&config, token)?;

            let cancel = CancellationToken::new();
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("interrupted, cancelling in-flight describes");
                        cancel.cancel();
                    }
                });
            }

            let mut pool = WorkerPool::new(config.effective_pool_concurrency());
            for resource_type in &resource_types {
                let engine = engine.clone();
                let cancel = cancel.clone();
                let request = DescribeRequest::new(resource_type, &account, provider.clone())
                    .with_scopes(&scopes)
                    .with_disabled_scopes(include_disabled)
                    .with_trigger(TriggerType::Manual);

                pool.add_job(move || async move {
                    engine
                        .describe(&cancel, &request)
                        .await
                        .map_err(anyhow::Error::from)
                });
            }

            let mut output = serde_json::Map::new();
            let mut failed = 0;
            for result in pool.run().await {
                let resource_type = &resource_types[result.index];
                match result.value {
                    Ok(aggregate) => {
                        output.insert(resource_type.clone(), serde_json::to_value(&aggregate)?);
                    }
                    Err(e) => {
                        eprintln!("Error: {}: {:#}", resource_type, e);
                        failed += 1;
                    }
                }
            }

            println!("{}", serde_json::to_string_pretty(&Value::Object(output))?);

            if failed > 0 {
                return Err(anyhow!("{} of {} resource types could not be described", failed, resource_types.len()));
            }
            Ok(())
        }
    }
}
