// dglab-relay: relay hub and terminal CLI
//
// Runs the hub on its own, a hub with a colocated terminal, or a terminal
// dialing a remote hub.

mod config;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use dglab_relay_core::{
    Channel, ClientError, ClientTransport, FeedbackButton, RelayServer, StrengthData,
    StrengthOperationType, TerminalClient, TerminalEvent, WsTerminal,
};
use dglab_relay_core::protocol::MAX_STRENGTH_VALUE;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "dglab-relay")]
#[command(about = "DG-Lab relay hub pairing terminals with apps", long_about = None)]
#[command(version)]
struct Cli {
    /// Log filter (overrides RUST_LOG), e.g. "debug" or "dglab_relay_core=trace"
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay hub
    Serve {
        #[command(flatten)]
        server: ServerArgs,
    },
    /// Run the hub with a terminal in the same process
    Local {
        #[command(flatten)]
        server: ServerArgs,
        /// Address apps should dial, used in the QR payload
        #[arg(long)]
        public_uri: Option<String>,
    },
    /// Run a terminal against a remote hub
    Terminal {
        /// Hub address, e.g. ws://192.168.1.161:5678
        #[arg(short, long)]
        uri: String,
        /// Address apps should dial, if different from --uri
        #[arg(long)]
        public_uri: Option<String>,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
struct ServerArgs {
    /// Interface to listen on
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
    /// Seconds between heartbeats (0 disables them)
    #[arg(long)]
    heartbeat: Option<u64>,
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Get { key: String },
    Set { key: String, value: String },
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => tracing_subscriber::EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log level: {}", level))?,
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve { server } => cmd_serve(server).await,
        Commands::Local { server, public_uri } => cmd_local(server, public_uri).await,
        Commands::Terminal { uri, public_uri } => cmd_terminal(uri, public_uri).await,
        Commands::Config { action } => cmd_config(action),
    }
}

async fn start_server(args: ServerArgs) -> Result<(RelayServer, config::Config)> {
    let config = config::Config::load()?;

    let mut server_config = config.server_config();
    if let Some(host) = args.host {
        server_config.host = host;
    }
    if let Some(port) = args.port {
        server_config.port = port;
    }
    if let Some(secs) = args.heartbeat {
        server_config.heartbeat_interval = match secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
    }

    let server = RelayServer::bind(server_config)
        .await
        .context("Failed to start relay hub")?;

    println!("{}", "DG-Lab Relay Hub".bold());
    println!("  {} Listening on {}", "✓".green(), server.uri().bright_cyan());
    match server.heartbeat_interval() {
        Some(interval) => println!("  {} Heartbeat every {}s", "✓".green(), interval.as_secs()),
        None => println!("  {} Heartbeat disabled", "-".dimmed()),
    }
    println!();

    Ok((server, config))
}

async fn cmd_serve(args: ServerArgs) -> Result<()> {
    let (server, _) = start_server(args).await?;
    let hub = server.hub();

    hub.on_connect(|id| async move {
        println!("{} Connected    {}", "+".green(), id.to_string().dimmed());
        Ok(())
    });
    hub.on_disconnect(|id| async move {
        println!("{} Disconnected {}", "-".red(), id.to_string().dimmed());
        Ok(())
    });
    hub.on_bind(|envelope, success| async move {
        if let Some((client_id, target_id)) = envelope.pair() {
            if success {
                println!("{} Bound        {} ↔ {}", "✓".green(), client_id, target_id);
            } else {
                println!("{} Bind refused {} ↔ {}", "✗".red(), client_id, target_id);
            }
        }
        Ok(())
    });

    println!("Press {} to stop", "Ctrl+C".bold());
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    println!();
    let stats = hub.stats();
    println!(
        "Relayed {} message(s), rejected {}",
        stats.envelopes_relayed, stats.envelopes_rejected
    );
    server.shutdown().await;
    Ok(())
}

async fn cmd_local(args: ServerArgs, public_uri: Option<String>) -> Result<()> {
    let (server, config) = start_server(args).await?;
    let hub = server.hub().clone();

    let mut terminal = hub.new_local_client();
    let uri = public_uri
        .or(config.public_uri)
        .unwrap_or_else(|| server.uri());
    print_qrcode(&terminal, Some(uri.as_str()))?;

    tokio::select! {
        result = run_terminal(&mut terminal) => result?,
        _ = tokio::signal::ctrl_c() => println!(),
    }

    if let Some(id) = terminal.client_id() {
        hub.remove_local_client(&id).await;
    }
    server.shutdown().await;
    Ok(())
}

async fn cmd_terminal(uri: String, public_uri: Option<String>) -> Result<()> {
    let mut terminal = WsTerminal::connect(&uri)
        .await
        .with_context(|| format!("Failed to connect to hub at {}", uri))?;
    println!("  {} Connected to {}", "✓".green(), uri.bright_cyan());
    print_qrcode(&terminal, public_uri.as_deref())?;

    tokio::select! {
        result = run_terminal(&mut terminal) => result?,
        _ = tokio::signal::ctrl_c() => println!(),
    }

    if let Err(e) = terminal.transport_mut().close().await {
        warn!(error = %e, "failed to close connection to hub");
    }
    Ok(())
}

fn print_qrcode<T: ClientTransport>(terminal: &TerminalClient<T>, uri: Option<&str>) -> Result<()> {
    let id = terminal.client_id().context("Terminal is not registered")?;
    let qrcode = terminal
        .qrcode(uri)
        .context("No hub address to put in the QR payload")?;

    println!("{}", "Terminal".bold());
    println!("  ID: {}", id.to_string().bright_yellow());
    println!("  Scan with the DG-Lab app:");
    println!("  {}", qrcode.bright_cyan());
    println!();
    Ok(())
}

/// Wait for an app, then print what it sends until the connection closes.
///
/// Pressing A1 in the app raises channel A to its limit.
async fn run_terminal<T: ClientTransport>(terminal: &mut TerminalClient<T>) -> Result<()> {
    let mut latest: Option<StrengthData> = None;
    wait_for_app(terminal).await?;

    loop {
        let event = match terminal.recv_data().await {
            Ok(event) => event,
            Err(ClientError::ConnectionClosed) => {
                println!("{} Connection to hub closed", "✗".red());
                return Ok(());
            }
            Err(ClientError::Payload(e)) => {
                warn!(error = %e, "ignoring unreadable payload");
                continue;
            }
            Err(e) => return Err(e).context("Terminal failed"),
        };

        match event {
            TerminalEvent::Strength(data) => {
                println!(
                    "{} Strength  A {}/{}  B {}/{}",
                    "◆".bright_blue(),
                    data.a,
                    data.a_limit,
                    data.b,
                    data.b_limit
                );
                latest = Some(data);
            }
            TerminalEvent::Feedback(button) => {
                println!("{} Feedback  {:?}", "◆".bright_magenta(), button);
                if button == FeedbackButton::A1 {
                    if let Some(data) = latest {
                        let value = data.a_limit.min(MAX_STRENGTH_VALUE);
                        terminal
                            .set_strength(Channel::A, StrengthOperationType::SetTo, value)
                            .await
                            .context("Failed to set strength")?;
                        println!("  {} Channel A set to {}", "→".green(), value);
                    }
                }
            }
            TerminalEvent::Break(_) => {
                println!("{} App disconnected", "✗".red());
                latest = None;
                wait_for_app(terminal).await?;
            }
            TerminalEvent::Heartbeat(_) => debug!("heartbeat"),
        }
    }
}

async fn wait_for_app<T: ClientTransport>(terminal: &mut TerminalClient<T>) -> Result<()> {
    println!("Waiting for an app to bind...");
    terminal.ensure_bind().await.context("Failed to bind")?;
    if let Some(target) = terminal.target_id() {
        println!("{} Bound to app {}", "✓".green(), target.to_string().bright_yellow());
    }
    Ok(())
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    let mut config = config::Config::load()?;

    match action {
        ConfigAction::Show => {
            println!("{}", "Configuration".bold());
            println!();

            for (key, value) in config.list() {
                println!("  {:<24} {}", key.bright_cyan(), value);
            }
        }

        ConfigAction::Get { key } => {
            match config.get(&key) {
                Some(value) => println!("{} = {}", key.bright_cyan(), value),
                None if key == "public_uri" => println!("{} = {}", key.bright_cyan(), "(unset)".dimmed()),
                None => anyhow::bail!("Unknown config key: {}", key),
            }
        }

        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Path => {
            println!("{}", config::Config::config_file()?.display());
        }
    }

    Ok(())
}
