use anyhow::{Context, Result};
use azkit::azure::context::AzureContext;
use azkit::config::{AzureConfiguration, ConfigHandle};
use azkit::error::format_azure_error;
use azkit::resource::groups::resource_group_module;
use azkit::resource::providers::provider_service;
use azkit::resource::Status;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Azure resource modules from the command line
#[derive(Parser, Debug)]
#[command(name = "azkit", version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the selected subscriptions
    Subscriptions {
        /// Save these subscription ids as the selection before listing
        #[arg(long, num_args = 1..)]
        select: Vec<String>,
    },
    /// List resource groups
    Groups {
        /// Subscription to use (default: all selected)
        #[arg(short, long)]
        subscription: Option<String>,
    },
    /// Show a provider's registration state in every selected subscription
    Providers {
        /// Provider namespace, e.g. Microsoft.Web
        namespace: String,
    },
    /// List regions supporting a resource type
    Regions {
        /// Provider namespace, e.g. Microsoft.Web
        namespace: String,
        /// Resource type within the namespace, e.g. sites
        resource_type: String,
        /// Subscription to use (default: first selected)
        #[arg(short, long)]
        subscription: Option<String>,
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Cannot open log file {:?}: {}", log_path, e);
            return None;
        }
    };

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

    tracing::info!("azkit started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("azkit").join("azkit.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".azkit").join("azkit.log");
    }
    PathBuf::from("azkit.log")
}

/// Table with a header row; rendered as text columns or JSON objects
struct Table {
    headers: Vec<&'static str>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn new(headers: &[&'static str]) -> Self {
        Self {
            headers: headers.to_vec(),
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => {
                let objects: Vec<Value> = self
                    .rows
                    .iter()
                    .map(|row| {
                        let map: Map<String, Value> = self
                            .headers
                            .iter()
                            .zip(row)
                            .map(|(h, v)| (h.to_lowercase(), Value::String(v.clone())))
                            .collect();
                        Value::Object(map)
                    })
                    .collect();
                Ok(serde_json::to_string_pretty(&objects)?)
            }
            OutputFormat::Text => {
                let mut widths: Vec<usize> = self.headers.iter().map(|h| h.len()).collect();
                for row in &self.rows {
                    for (i, cell) in row.iter().enumerate() {
                        if let Some(w) = widths.get_mut(i) {
                            *w = (*w).max(cell.len());
                        }
                    }
                }
                let line = |cells: Vec<&str>| {
                    cells
                        .iter()
                        .zip(&widths)
                        .map(|(c, w)| format!("{:<width$}", c, width = *w))
                        .collect::<Vec<_>>()
                        .join("  ")
                        .trim_end()
                        .to_string()
                };
                let mut out = vec![line(self.headers.clone())];
                for row in &self.rows {
                    out.push(line(row.iter().map(String::as_str).collect()));
                }
                Ok(out.join("\n"))
            }
        }
    }
}

fn status_cell(status: &Status) -> String {
    match status.error() {
        Some(cause) => format!("Error: {}", format_azure_error(cause)),
        None => status.to_string(),
    }
}

async fn run(args: &Args, context: &AzureContext) -> Result<Table> {
    match &args.command {
        Command::Subscriptions { .. } => {
            let mut table = Table::new(&["ID", "NAME", "DEFAULT"]);
            for subscription in context.account.selected_subscriptions()? {
                table.push(vec![
                    subscription.id,
                    subscription.name,
                    subscription.is_default.to_string(),
                ]);
            }
            Ok(table)
        }
        Command::Groups { subscription } => {
            let subscriptions = match subscription {
                Some(id) => vec![id.clone()],
                None => context
                    .account
                    .selected_subscriptions()?
                    .into_iter()
                    .map(|s| s.id)
                    .collect(),
            };

            let mut table = Table::new(&["SUBSCRIPTION", "NAME", "LOCATION", "STATUS"]);
            for subscription_id in subscriptions {
                let module = resource_group_module(context, &subscription_id);
                let mut groups = module
                    .list()
                    .await
                    .with_context(|| format!("Failed to list resource groups in {}", subscription_id))?;
                groups.sort_by(|a, b| a.name().to_lowercase().cmp(&b.name().to_lowercase()));

                for group in groups {
                    let location = group
                        .cached_remote()
                        .map(|g| g.location.clone())
                        .unwrap_or_else(|| "-".to_string());
                    table.push(vec![
                        subscription_id.clone(),
                        group.name().to_string(),
                        location,
                        status_cell(&group.status()),
                    ]);
                }
            }
            Ok(table)
        }
        Command::Providers { namespace } => {
            let service = provider_service(namespace, context.clone());
            let mut listed = service.list().await?;
            listed.sort_by(|a, b| a.name().cmp(b.name()));

            let mut table = Table::new(&["SUBSCRIPTION", "PROVIDER", "STATE", "TYPES"]);
            for subscription in listed {
                let types = subscription
                    .cached_remote()
                    .map(|p| p.resource_types.len().to_string())
                    .unwrap_or_else(|| "-".to_string());
                table.push(vec![
                    subscription.name().to_string(),
                    namespace.clone(),
                    status_cell(&subscription.status()),
                    types,
                ]);
            }
            Ok(table)
        }
        Command::Regions {
            namespace,
            resource_type,
            subscription,
        } => {
            let subscription_id = match subscription {
                Some(id) => id.clone(),
                None => context
                    .account
                    .selected_subscriptions()?
                    .into_iter()
                    .next()
                    .map(|s| s.id)
                    .context("No subscription selected. Run 'az login' or pass --subscription")?,
            };

            let service = provider_service(namespace, context.clone());
            let regions = service
                .subscription(&subscription_id)
                .list_supported_regions(resource_type)
                .await?;

            let mut table = Table::new(&["NAME", "DISPLAY NAME"]);
            for region in regions {
                table.push(vec![region.name, region.display_name]);
            }
            Ok(table)
        }
    }
}

/// Sanitized message for the user; library errors get their friendly text
fn describe(err: &anyhow::Error) -> String {
    match err.downcast_ref::<azkit::Error>() {
        Some(azure_err) => format_azure_error(azure_err),
        None => format!("{:#}", err),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    if let Command::Subscriptions { select } = &args.command {
        if !select.is_empty() {
            // Stored without env overrides so they are not persisted
            AzureConfiguration::load()
                .set_selected_subscriptions(select.clone())
                .context("Failed to save the subscription selection")?;
        }
    }

    let config = ConfigHandle::new(AzureConfiguration::load().with_env_overrides());
    let context =
        AzureContext::from_cli_profile(config).context("Failed to load the Azure CLI profile")?;

    match run(&args, &context).await {
        Ok(table) => {
            println!("{}", table.render(args.output)?);
            Ok(())
        }
        Err(err) => {
            tracing::error!("Command failed: {:?}", err);
            eprintln!("Error: {}", describe(&err));
            std::process::exit(1);
        }
    }
}
