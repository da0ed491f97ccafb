//! Propane Bot - Cylinder Level Monitor Binary
//!
//! Runs the telemetry listener, chat bots, and web dashboard together.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use propane_bot::{
    cancel_on_shutdown_signal, parse_payload, AppConfig, CylinderProfile, DiscordBot,
    MqttListener, ReadingStore, SlackBot, Supervisor, WebServer,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "propane_bot")]
#[command(about = "🔥 Propane Bot - Cylinder Level Monitor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Reports propane cylinder levels from an MQTT scale over Slack, Discord, and HTTP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Application configuration file
    #[arg(short, long, default_value = "./config.json")]
    config: PathBuf,

    /// Cylinder calibration file
    #[arg(long, default_value = "./cylinder.json")]
    cylinder: PathBuf,

    /// Override the web server bind address
    #[arg(long)]
    host: Option<String>,

    /// Override the web server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every worker until interrupted (default)
    Serve,

    /// Print the remaining percentage for one weight and exit
    Remaining(RemainingArgs),

    /// Parse one telemetry payload and print the reading it produces
    Parse(ParseArgs),
}

#[derive(Args)]
struct RemainingArgs {
    /// Current gross weight in pounds
    #[arg(allow_negative_numbers = true)]
    weight: f64,
}

#[derive(Args)]
struct ParseArgs {
    /// Payload in the form "<unix-seconds>,<weight>"
    payload: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    match &cli.command {
        Some(Commands::Serve) | None => {
            print_banner();
            serve_command(&cli).await?;
        }
        Some(Commands::Remaining(args)) => remaining_command(&cli, args)?,
        Some(Commands::Parse(args)) => parse_command(&cli, args)?,
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };

    // RUST_LOG takes precedence over the command-line flags.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install logging subscriber")?;

    Ok(())
}

fn print_banner() {
    println!("🔥 Propane Bot - Cylinder Level Monitor");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}

fn load_profile(cli: &Cli) -> Result<CylinderProfile> {
    CylinderProfile::load(&cli.cylinder)
        .with_context(|| format!("Failed to load cylinder profile {}", cli.cylinder.display()))
}

async fn serve_command(cli: &Cli) -> Result<()> {
    info!("Starting propane bot...");

    let profile = load_profile(cli)?;
    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    if let Some(host) = &cli.host {
        config.web = config.web.with_host(host.clone());
    }
    if let Some(port) = cli.port {
        config.web = config.web.with_port(port);
    }
    config.validate().context("Invalid configuration")?;

    let timezone = config.display.timezone()?;
    let broker = config.mqtt.broker()?;

    info!("Cylinder profile:");
    info!("  - Tare weight: {} lbs", profile.tare_weight());
    info!("  - Full weight: {} lbs", profile.full_weight());
    info!("  - Extra weight: {} lbs", profile.extra_weight());
    info!("Display timezone: {}", timezone);

    let store = Arc::new(ReadingStore::new(profile, timezone));

    let shutdown = CancellationToken::new();
    cancel_on_shutdown_signal(shutdown.clone());
    let mut supervisor = Supervisor::new(shutdown);

    supervisor.spawn(MqttListener::new(
        Arc::clone(&store),
        broker,
        config.mqtt.topic.clone(),
        config.mqtt.client_id(),
    ));

    match &config.discord {
        Some(discord) => supervisor.spawn(DiscordBot::new(
            discord.app_id.clone(),
            Some(discord.guild_id.clone()),
            discord.bot_token.clone(),
            Arc::clone(&store),
        )?),
        None => info!("Discord not configured, skipping"),
    }

    match &config.slack {
        Some(slack) => supervisor.spawn(SlackBot::new(slack.api_token.clone(), Arc::clone(&store))?),
        None => info!("Slack not configured, skipping"),
    }

    info!("Web server configuration:");
    info!("  - Bind address: {}", config.web.bind_address());
    info!("  - CORS enabled: {}", config.web.enable_cors);
    supervisor.spawn(WebServer::new(config.web.clone(), store));

    info!("Started {} workers", supervisor.len());
    supervisor.wait().await?;

    info!("Propane bot stopped");
    Ok(())
}

fn remaining_command(cli: &Cli, args: &RemainingArgs) -> Result<()> {
    let profile = load_profile(cli)?;
    println!(
        "{} lbs is {:.0}% remaining",
        args.weight,
        profile.remaining_percent(args.weight)
    );
    Ok(())
}

fn parse_command(cli: &Cli, args: &ParseArgs) -> Result<()> {
    let event = parse_payload(args.payload.as_bytes()).context("Malformed payload")?;
    println!("Timestamp: {}", event.timestamp.to_rfc3339());
    println!("Weight:    {} lbs", event.weight);

    // The percentage needs calibration; show it only when the file is there.
    if cli.cylinder.exists() {
        let profile = load_profile(cli)?;
        println!(
            "Remaining: {:.0}%",
            profile.remaining_percent(event.weight)
        );
    }
    Ok(())
}
