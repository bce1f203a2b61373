//! ble-sensor-exporter - poll BLE UART sensors and serve Prometheus metrics.
//!
//! Run with: `cargo run -- poll`

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ble_sensor_exporter::interactive::{self, SessionOptions};
use ble_sensor_exporter::{
    server, Acquirer, BtleplugTransport, Config, DiscoveryScanner, GaugeRegistry, Poller,
};

/// Poll BLE UART sensors and export their readings as Prometheus metrics.
#[derive(Parser, Debug)]
#[command(name = "ble-sensor-exporter")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file.
    #[arg(
        short,
        long,
        global = true,
        env = "BLE_SENSOR_CONFIG",
        default_value = "config.yaml"
    )]
    config: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List nearby devices whose advertised name has the scan prefix.
    Scan {
        /// Name prefix (overrides config).
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Poll every configured device and serve metrics.
    Poll {
        /// Metrics listen address (overrides config).
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },

    /// Send lines from stdin to one device and print its replies.
    Cli {
        /// Device address.
        address: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Scan { prefix } => {
            let config = load_config(&args.config, false)?;
            scan(config, prefix).await
        }
        Command::Poll { listen } => {
            let mut config = load_config(&args.config, true)?;
            if let Some(listen) = listen {
                config.listen = listen;
            }
            poll(config).await
        }
        Command::Cli { address } => {
            let config = load_config(&args.config, false)?;
            console(config, &address).await
        }
    }
}

/// Load the config file. Modes other than polling fall back to defaults
/// when the file does not exist.
fn load_config(path: &Path, required: bool) -> anyhow::Result<Config> {
    if !required && !path.exists() {
        info!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))
}

async fn scan(config: Config, prefix: Option<String>) -> anyhow::Result<()> {
    let transport = BtleplugTransport::enable()
        .await
        .context("Failed to enable Bluetooth")?;
    let scanner = DiscoveryScanner::new(prefix.unwrap_or(config.scan_prefix));

    tokio::select! {
        result = scanner.run(&transport, |device| println!("{}", device)) => {
            result.context("Scan failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Scan interrupted");
        }
    }
    Ok(())
}

async fn poll(config: Config) -> anyhow::Result<()> {
    config
        .validate_for_polling()
        .context("Config cannot be used for polling")?;

    let registry = Arc::new(GaugeRegistry::new());
    let transport = Arc::new(
        BtleplugTransport::enable()
            .await
            .context("Failed to enable Bluetooth")?,
    );

    let poller = Poller::new(Acquirer::new(transport, registry.clone(), config.timing));
    let shutdown = poller.shutdown_token();

    let listener = server::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind metrics listener on {}", config.listen))?;
    let mut server = tokio::spawn(server::serve(listener, registry, shutdown));

    let handles = poller.spawn(config.devices);

    let stopped = wait_for_exit(&mut server, tokio::signal::ctrl_c()).await;
    match &stopped {
        Ok(None) => info!("Received Ctrl-C, finishing in-flight polls"),
        _ => warn!("Metrics server stopped, finishing in-flight polls"),
    }
    poller.shutdown();

    for handle in handles {
        if let Err(e) = handle.await {
            warn!("Polling task panicked: {}", e);
        }
    }

    match stopped? {
        Some(result) => {
            result.context("Metrics server failed")?;
            anyhow::bail!("Metrics server stopped unexpectedly");
        }
        None => match server.await {
            Ok(result) => result.context("Metrics server failed")?,
            Err(e) => warn!("Metrics server task panicked: {}", e),
        },
    }
    Ok(())
}

/// Wait for `interrupt` or for the metrics server to stop on its own.
///
/// Returns the server's result if it stopped first.
async fn wait_for_exit<F>(
    server: &mut JoinHandle<ble_sensor_exporter::Result<()>>,
    interrupt: F,
) -> anyhow::Result<Option<ble_sensor_exporter::Result<()>>>
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        joined = server => Ok(Some(joined.context("Metrics server task panicked")?)),
        result = interrupt => {
            result.context("Failed to listen for Ctrl-C")?;
            Ok(None)
        }
    }
}

async fn console(config: Config, address: &str) -> anyhow::Result<()> {
    let transport = BtleplugTransport::enable()
        .await
        .context("Failed to enable Bluetooth")?;

    let options = SessionOptions {
        connect_timeout: config.timing.connect_timeout,
        linger: config.timing.collection_window,
    };
    let input = BufReader::new(tokio::io::stdin());
    let mut output = std::io::stdout();

    interactive::run(&transport, address, options, input, &mut output)
        .await
        .with_context(|| format!("Session with {} failed", address))
}
