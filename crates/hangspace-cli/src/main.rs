//! Hangspace headless client entry point.

use std::time::Duration;

use clap::Parser;
use hangspace_cli::{AppConfig, CliDriver, Runtime, SystemEnv};
use hangspace_client::{
    ClientConfig, ClientIdentity,
    transport::{DEFAULT_REQUEST_TIMEOUT, HttpApi},
};
use hangspace_core::ChannelConfig;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Hangspace command-line client
#[derive(Parser, Debug)]
#[command(name = "hangspace")]
#[command(about = "Headless client for the Hangspace real-time chat API")]
#[command(version)]
struct Args {
    /// WebSocket URL of the event channel
    #[arg(short, long, default_value = "ws://localhost:5000/socket")]
    server: String,

    /// Base URL of the HTTP API
    #[arg(short, long, default_value = "http://localhost:5000")]
    api: String,

    /// Our user id
    #[arg(long)]
    user_id: String,

    /// Our username
    #[arg(long)]
    username: String,

    /// Bearer token for API requests
    #[arg(long, env = "HANGSPACE_TOKEN")]
    token: Option<String>,

    /// Reconnect attempts before giving up
    #[arg(long, default_value = "5")]
    max_reconnect_attempts: u32,

    /// Seconds before an API request is abandoned
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
    request_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!(server = %args.server, api = %args.api, user = %args.username, "starting");

    let mut api = HttpApi::new(args.api, Duration::from_secs(args.request_timeout_secs))?;
    if let Some(token) = args.token {
        api = api.with_token(token);
    }

    let client_config = ClientConfig {
        channel: ChannelConfig {
            max_reconnect_attempts: args.max_reconnect_attempts,
            ..ChannelConfig::default()
        },
        ..ClientConfig::default()
    };

    let runtime = Runtime::new(
        CliDriver::new(args.server, api),
        SystemEnv::new(),
        ClientIdentity::new(args.user_id, args.username),
        client_config,
        AppConfig::default(),
    );

    runtime.run().await?;
    tracing::info!("bye");
    Ok(())
}
