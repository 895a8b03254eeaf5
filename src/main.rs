use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use marathon::cli::{apply_overrides, format_event, format_table, parse_filter, Cli, Commands, WatchArgs};
use marathon::config::{load_config, load_config_from};
use marathon::Client;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    // Load .env file if specified
    if let Some(ref env_file) = cli.env_file {
        dotenvy::from_path(env_file)
            .with_context(|| format!("failed to load env file {}", env_file.display()))?;
    }

    let config = match cli.config {
        Some(ref path) => load_config_from(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => load_config().context("failed to load config")?,
    };
    let config = apply_overrides(config, &cli);

    let client = Client::new(config).context("failed to create the Marathon client")?;

    match cli.command {
        Commands::Ping => {
            client.ping().await?;
            println!("pong from {}", client.url());
        }
        Commands::Info => {
            let info = client.info().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Subscriptions => {
            let subscriptions = client.subscriptions().await?;
            let rows = subscriptions
                .callback_urls
                .into_iter()
                .map(|url| vec![url])
                .collect();
            print!("{}", format_table(&["callback"], rows));
        }
        Commands::Watch(ref args) => watch(&client, args).await?,
    }

    Ok(())
}

async fn watch(client: &Client, args: &WatchArgs) -> Result<()> {
    let filter = parse_filter(&args.filter).map_err(anyhow::Error::msg)?;

    let (tx, mut rx) = mpsc::channel(64);
    client
        .add_events_listener(tx.clone(), filter)
        .await
        .context("failed to subscribe to Marathon events")?;
    info!("Watching Marathon events, press ctrl-c to stop");

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => println!("{}", format_event(&event)),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    client.remove_events_listener(&tx).await;
    if let Err(e) = client.unsubscribe().await {
        warn!("Failed to unsubscribe: {}", e);
    }
    Ok(())
}
