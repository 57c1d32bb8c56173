//! Feedlink command line client
//!
//! Publishes values, listens to feeds and groups, and fetches retained values.

use clap::{Parser, Subcommand};
use feedlink::client::{FeedClient, PublishOptions, Target};
use feedlink::config::ClientConfig;
use feedlink::observability::init_default_logging;
use feedlink::protocol::{SystemTopic, TimeUnit};
use feedlink::transport::mqtt::BrokerTransport;
use feedlink::ClientError;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::{
    signal,
    time::{sleep, Duration, Instant},
};
use tracing::{error, info, warn};

/// Poll interval of the listen loop
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Back-off after a throttle notice before polling again
const THROTTLE_BACKOFF: Duration = Duration::from_secs(60);

/// Pause between reconnection attempts
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Device-side client for feed telemetry
#[derive(Parser)]
#[command(name = "feedlink")]
#[command(about = "Publish and subscribe to telemetry feeds and groups")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe and print incoming values until interrupted
    Listen {
        /// Feed keys to subscribe to
        feeds: Vec<String>,
        /// Group keys to subscribe to
        #[arg(short, long)]
        group: Vec<String>,
        /// Server time unit to subscribe to (seconds, millis or iso)
        #[arg(long)]
        time: Option<String>,
    },
    /// Publish one value
    Publish {
        feed: String,
        value: String,
        /// Location metadata as lat,lon,ele
        #[arg(long)]
        metadata: Option<String>,
        /// Publish to another account's feed
        #[arg(long)]
        shared_owner: Option<String>,
        /// Treat the key as a group key
        #[arg(long)]
        group: bool,
    },
    /// Fetch and print a feed's retained value
    Get {
        feed: String,
        /// Seconds to wait for the value
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose > 0 && std::env::var("LOG_LEVEL").is_err() {
        let level = if cli.verbose > 1 { "TRACE" } else { "DEBUG" };
        std::env::set_var("LOG_LEVEL", level);
    }
    init_default_logging();

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Listen { feeds, group, time } => listen(config, feeds, group, time).await,
        Commands::Publish {
            feed,
            value,
            metadata,
            shared_owner,
            group,
        } => {
            let mut options = PublishOptions::new(feed, value);
            options.metadata = metadata;
            options.shared_owner = shared_owner;
            options.group = group;
            publish(config, options).await
        }
        Commands::Get { feed, timeout } => get(config, feed, Duration::from_secs(timeout)).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(ClientConfig::load_from_file(path)?)
        }
        None => {
            for path_str in ["feedlink.toml", "config/feedlink.toml"] {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(ClientConfig::load_from_file(&path)?);
                }
            }

            Err("No configuration file found. Provide one with -c/--config or create feedlink.toml".into())
        }
    }
}

async fn connect(config: &ClientConfig) -> Result<FeedClient<BrokerTransport>, Box<dyn std::error::Error>> {
    let transport = BrokerTransport::from_config(config)?;
    let mut client = FeedClient::new(transport, config.service.username.clone());
    client.connect().await?;
    Ok(client)
}

async fn listen(
    config: ClientConfig,
    feeds: Vec<String>,
    groups: Vec<String>,
    time: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let time_unit = match time.as_deref() {
        Some(name) => Some(
            TimeUnit::parse(name).ok_or_else(|| format!("Unknown time unit '{name}'"))?,
        ),
        None => None,
    };

    let transport = BrokerTransport::from_config(&config)?;
    let mut client = FeedClient::new(transport, config.service.username.clone());

    // Sessions start clean, so every subscription is queued again on each connect
    let targets: Vec<Target> = feeds
        .into_iter()
        .map(Target::feed)
        .chain(groups.into_iter().map(Target::group))
        .collect();
    client.on_connect(move |session| {
        info!("Connected, subscribing to {} targets", targets.len());
        session.subscribe_system(SystemTopic::Throttle);
        session.subscribe_system(SystemTopic::Errors);
        if let Some(unit) = time_unit {
            session.subscribe_time(unit);
        }
        for target in &targets {
            session.subscribe(target)?;
        }
        Ok(())
    });
    client.on_disconnect(|_session| {
        warn!("Disconnected from broker");
        Ok(())
    });
    client.on_message(|_session, channel, payload| {
        println!("{channel}: {payload}");
        Ok(())
    });

    client.connect().await?;

    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
        _ = run_loop(&mut client, &config) => {}
    }

    client.disconnect().await?;
    Ok(())
}

/// Poll forever, backing off on throttle notices and reconnecting on failures
async fn run_loop(client: &mut FeedClient<BrokerTransport>, config: &ClientConfig) {
    loop {
        match client.loop_once(POLL_TIMEOUT).await {
            Ok(_) => {}
            Err(e) if e.is_rate_limited() => {
                warn!("{}; pausing for {:?}", e, THROTTLE_BACKOFF);
                sleep(THROTTLE_BACKOFF).await;
            }
            Err(e @ ClientError::Mqtt(_)) => {
                error!("Connection failed: {}", e);
                reconnect(client, config).await;
            }
            Err(e) => {
                error!("Message handling failed: {}", e);
            }
        }
    }
}

async fn reconnect(client: &mut FeedClient<BrokerTransport>, config: &ClientConfig) {
    loop {
        sleep(RECONNECT_DELAY).await;
        info!("Reconnecting to {}", config.mqtt.broker_url);
        match client.reconnect().await {
            Ok(()) => return,
            Err(e) => warn!("Reconnection failed: {}", e),
        }
    }
}

async fn publish(config: ClientConfig, options: PublishOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = connect(&config).await?;
    client.publish_with(&options).await?;
    info!("Published {} to {}", options.value, options.feed_key);
    client.disconnect().await?;
    Ok(())
}

async fn get(
    config: ClientConfig,
    feed: String,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let received = Arc::new(AtomicBool::new(false));
    let mut client = connect(&config).await?;

    let flag = Arc::clone(&received);
    client.add_feed_callback(&feed, move |_session, channel, payload| {
        println!("{channel}: {payload}");
        flag.store(true, Ordering::SeqCst);
        Ok(())
    })?;
    client.subscribe(&Target::feed(feed.as_str())).await?;
    client.get_retained(&feed).await?;

    let deadline = Instant::now() + timeout;
    while !received.load(Ordering::SeqCst) && Instant::now() < deadline {
        client.loop_once(POLL_TIMEOUT).await?;
    }

    client.disconnect().await?;
    if received.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err(format!("No value received for '{feed}' within {timeout:?}").into())
    }
}

fn handle_config_command(config: &ClientConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    } else {
        println!("Configuration is valid");
    }
    Ok(())
}
