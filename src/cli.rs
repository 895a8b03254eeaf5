//! CLI for the marathon binary
//!
//! - `marathon ping` - check that the cluster answers
//! - `marathon info` - print the `/v2/info` document
//! - `marathon subscriptions` - list registered event callbacks
//! - `marathon watch` - subscribe and print events as they arrive

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{Config, EventsTransport};
use crate::events::{Event, EventFilter, EventKind};

#[derive(Parser, Debug)]
#[command(name = "marathon")]
#[command(about = "Talk to a Marathon cluster")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: ~/.marathon/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to a .env file to load before reading the environment
    #[arg(long, value_name = "FILE", global = true)]
    pub env_file: Option<PathBuf>,

    /// Marathon URL, comma separate hosts for a cluster
    #[arg(long, env = "MARATHON_URL", global = true)]
    pub url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Basic auth user
    #[arg(long, env = "MARATHON_USER", global = true)]
    pub user: Option<String>,

    /// Basic auth password
    #[arg(long, env = "MARATHON_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that Marathon answers
    Ping,

    /// Show cluster information
    Info,

    /// List event subscriptions
    Subscriptions,

    /// Print events as they arrive
    Watch(WatchArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    Callback,
    Stream,
}

impl From<TransportArg> for EventsTransport {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Callback => EventsTransport::Callback,
            TransportArg::Stream => EventsTransport::Stream,
        }
    }
}

/// Arguments for the watch command
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// How events are received
    #[arg(long, value_enum)]
    pub transport: Option<TransportArg>,

    /// Interface the callback listener binds to
    #[arg(long)]
    pub interface: Option<String>,

    /// Port of the callback listener
    #[arg(long)]
    pub port: Option<u16>,

    /// URL to register instead of the listener address
    #[arg(long)]
    pub callback_url: Option<String>,

    /// Events to watch: all, applications, subscriptions, deployments or
    /// event type names, comma separated
    #[arg(long, default_value = "all")]
    pub filter: String,
}

// ============================================================================
// SBIO: Pure helpers (no I/O)
// ============================================================================

/// Apply command line overrides on top of a loaded config
pub fn apply_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(url) = &cli.url {
        config.url = url.clone();
    }
    if let Some(timeout) = cli.timeout {
        config = config.with_request_timeout(timeout);
    }
    if let Some(user) = &cli.user {
        config = config.with_basic_auth(user.clone(), cli.password.clone().unwrap_or_default());
    }

    if let Commands::Watch(watch) = &cli.command {
        if let Some(transport) = watch.transport {
            config = config.with_events_transport(transport.into());
        }
        if let Some(interface) = &watch.interface {
            config.events_interface = interface.clone();
        }
        if let Some(port) = watch.port {
            config.events_port = port;
        }
        if let Some(url) = &watch.callback_url {
            config = config.with_callback_url(url.clone());
        }
    }

    config
}

/// Parse a `--filter` value
pub fn parse_filter(value: &str) -> Result<EventFilter, String> {
    let mut filter = EventFilter::NONE;

    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        filter |= match part {
            "all" => EventFilter::ALL,
            "applications" => EventFilter::APPLICATIONS,
            "subscriptions" => EventFilter::SUBSCRIPTIONS,
            "deployments" => EventFilter::DEPLOYMENTS,
            name => EventKind::from_name(name)
                .map(EventFilter::from)
                .ok_or_else(|| format!("unknown event filter: {}", name))?,
        };
    }

    if filter == EventFilter::NONE {
        return Err("the event filter is empty".to_string());
    }
    Ok(filter)
}

/// One line per event
pub fn format_event(event: &Event) -> String {
    format!("{:<28} {:?}", event.name(), event.payload)
}

/// Format a simple table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No resources found.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();
    let header: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h.to_uppercase(), width = widths[i]))
        .collect();
    output.push_str(header.join("   ").trim_end());
    output.push('\n');

    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| match widths.get(i) {
                Some(width) => format!("{:width$}", cell, width = width),
                None => cell.clone(),
            })
            .collect();
        output.push_str(cells.join("   ").trim_end());
        output.push('\n');
    }

    output
}
