use anyhow::Context;
use clap::Parser;
use padbridge::client::{Bus, BusClient};
use padbridge::config::Config;
use padbridge::event_loop::{EventLoop, QuitSignal};
use padbridge::input::GilrsInput;
use padbridge::registry::Registry;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (TOML or JSON)
    #[arg(short, long, env = "PADBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Address of the VIIPER API, overrides the config file
    #[arg(short = 'a', long, env = "PADBRIDGE_VIIPER_ADDR")]
    viiper_addr: Option<String>,

    /// Input poll interval in milliseconds, overrides the config file
    #[arg(short, long, env = "PADBRIDGE_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,
}

/// Cancel `token` on Ctrl-C or SIGTERM
fn watch_signals(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl-C"),
            _ = terminate => tracing::info!("Received SIGTERM"),
        }
        token.cancel();
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Errors to stderr, everything else to stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr.with_max_level(Level::ERROR).or_else(std::io::stdout))
        .init();

    let args = Args::parse();

    let (mut config, source) = Config::discover(args.config.as_deref())?;
    if let Some(path) = &source {
        tracing::info!("Loaded config from {}", path.display());
    }
    if let Some(addr) = args.viiper_addr {
        config.viiper.address = addr;
    }
    if let Some(ms) = args.poll_interval_ms {
        config.input.poll_interval_ms = ms;
    }

    tracing::info!("Starting padbridge");
    tracing::info!("VIIPER address: {}", config.viiper.address);

    let shutdown = CancellationToken::new();
    watch_signals(shutdown.clone());

    let client = BusClient::with_timeout(config.viiper.address.clone(), config.connect_timeout());
    match client.ping().await {
        Ok(info) => tracing::info!("Connected to {} {}", info.server, info.version),
        Err(e) => tracing::warn!("Ping failed: {:#}", e),
    }

    // Nothing fallible may run between resolving the bus and handing it to the registry
    let input = GilrsInput::new().context("Failed to initialize controller input")?;
    let bus = Bus::resolve(&client)
        .await
        .with_context(|| format!("Failed to resolve a bus on {}", client.addr()))?;
    let registry = Registry::new(client, bus, shutdown.clone());

    // Held for a tray integration; the loop treats a closed channel as no tray.
    let (_quit_tx, quit_rx) = mpsc::channel::<QuitSignal>(4);

    let mut event_loop = EventLoop::new(input, registry, quit_rx, shutdown.clone())
        .with_poll_interval(config.poll_interval());
    let reason = event_loop.run().await;
    tracing::info!("Shutting down ({:?})", reason);

    let (mut input, registry) = event_loop.into_parts();
    registry.shutdown(&mut input).await;
    shutdown.cancel();

    Ok(())
}
