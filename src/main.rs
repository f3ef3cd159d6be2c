//! # blethermal CLI
//!
//! Command-line front end for BLE receipt printers.
//!
//! ## Usage
//!
//! ```bash
//! # Render a receipt as text, no printer needed
//! blethermal preview receipt.json
//!
//! # Write the raw ESC/POS bytes to a file
//! blethermal encode receipt.json -o receipt.bin
//!
//! # Pick a printer and remember it
//! blethermal connect
//!
//! # Print on the remembered printer (asks for one if none is stored)
//! blethermal print receipt.json
//!
//! # Keep a link up and log state changes until Ctrl-C
//! blethermal watch --interval 15
//!
//! # Dry run against a simulated printer
//! blethermal --mock print receipt.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use blethermal::{
    PrinterError, PrinterSession,
    config::SessionConfig,
    error::Result,
    print::{LogoFailure, PrintOptions, encode_receipt},
    receipt::{ReceiptDraft, ReceiptModel, render_text},
    transport::{
        BleHost,
        mock::{MockDevice, MockHost},
    },
};

/// blethermal - Bluetooth LE receipt printer utility
#[derive(Parser, Debug)]
#[command(name = "blethermal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Session config file (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Where to remember the paired printer
    #[arg(long, global = true, value_name = "FILE")]
    registry: Option<PathBuf>,

    /// Use a simulated printer instead of a Bluetooth adapter
    #[arg(long, global = true)]
    mock: bool,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct LayoutArgs {
    /// Receipt JSON file
    receipt: PathBuf,

    /// Paper width in characters (overrides the receipt)
    #[arg(long)]
    width: Option<usize>,

    /// Logo darkness cutoff (0-255)
    #[arg(long, default_value_t = 160)]
    threshold: u8,

    /// Print without the logo if it cannot be decoded
    #[arg(long)]
    skip_bad_logo: bool,

    /// Do not cut the paper at the end
    #[arg(long)]
    no_cut: bool,
}

impl LayoutArgs {
    fn options(&self, chunk_size: usize) -> PrintOptions {
        PrintOptions {
            width: self.width,
            auto_cut: !self.no_cut,
            chunk_size,
            logo_failure: if self.skip_bad_logo {
                LogoFailure::SkipLogo
            } else {
                LogoFailure::Abort
            },
            threshold: self.threshold,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the receipt text exactly as it would be printed
    Preview {
        /// Receipt JSON file
        receipt: PathBuf,

        /// Paper width in characters (overrides the receipt)
        #[arg(long)]
        width: Option<usize>,
    },

    /// Encode a receipt to raw printer bytes
    Encode {
        #[command(flatten)]
        layout: LayoutArgs,

        /// Output file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Choose a printer, connect, and remember it
    Connect,

    /// Reattach to the remembered printer
    Reconnect,

    /// Show the remembered printer
    Status,

    /// Forget the remembered printer
    Forget,

    /// Print a receipt
    Print {
        #[command(flatten)]
        layout: LayoutArgs,

        /// Bytes per BLE write
        #[arg(long, default_value_t = 20)]
        chunk_size: usize,

        /// Always show the chooser, even if a printer is remembered
        #[arg(long)]
        choose: bool,
    },

    /// Keep the remembered printer connected and log state changes
    Watch {
        /// Seconds between reconnect attempts
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Preview { receipt, width } => {
            let model = load_receipt(receipt)?;
            let width = width.unwrap_or(model.width());
            print!("{}", render_text(&model, width).replace("\r\n", "\n"));
            Ok(())
        }
        Commands::Encode { layout, output } => {
            let model = load_receipt(&layout.receipt)?;
            let bytes = encode_receipt(&model, &layout.options(20))?.to_bytes();
            std::fs::write(output, &bytes)?;
            println!("Wrote {} bytes to {}", bytes.len(), output.display());
            Ok(())
        }
        command => {
            let session = open_session(&cli).await?;
            run_session(command, &session).await
        }
    }
}

async fn run_session(command: &Commands, session: &PrinterSession) -> Result<()> {
    match command {
        Commands::Connect => {
            let device = session.connect().await?;
            println!("Connected to {}", device);
            session.disconnect().await;
        }
        Commands::Reconnect => match session.connect_to_stored().await? {
            Some(device) => {
                println!("Reconnected to {}", device);
                session.disconnect().await;
            }
            None => println!("No printer remembered. Run `blethermal connect` first."),
        },
        Commands::Status => {
            match session.stored_device() {
                Some(stored) => println!(
                    "Remembered printer: {} ({}), last seen {}",
                    stored.name,
                    stored.id,
                    stored.last_seen.format("%Y-%m-%d %H:%M:%S UTC")
                ),
                None => println!("No printer remembered."),
            }
            if let Some(path) = session.registry_path() {
                println!("Registry: {}", path.display());
            }
        }
        Commands::Forget => {
            session.clear_stored_device()?;
            println!("Printer forgotten.");
        }
        Commands::Print {
            layout,
            chunk_size,
            choose,
        } => {
            let model = load_receipt(&layout.receipt)?;
            let remembered = if *choose {
                None
            } else {
                session.connect_to_stored().await.unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Remembered printer unavailable");
                    None
                })
            };
            let device = match remembered {
                Some(device) => device,
                None => session.connect().await?,
            };
            println!("Printing on {}...", device);
            let result = session
                .print_receipt(&model, &layout.options(*chunk_size))
                .await;
            session.disconnect().await;
            let summary = result?;
            println!(
                "Printed {} bytes in {}-byte chunks.",
                summary.bytes, summary.chunk_size
            );
        }
        Commands::Watch { interval } => watch(session, *interval).await?,
        Commands::Preview { .. } | Commands::Encode { .. } => {}
    }
    Ok(())
}

async fn watch(session: &PrinterSession, interval: Option<u64>) -> Result<()> {
    let Some(stored) = session.stored_device() else {
        return Err(PrinterError::NotFound(
            "no printer remembered; run `blethermal connect` first".into(),
        ));
    };
    println!("Watching {} ({}). Ctrl-C to stop.", stored.name, stored.id);

    let states = session.on_connection_change(|state| println!("state: {}", state));
    let devices = session.on_device_change(|device| match device {
        Some(device) => println!("device: {}", device),
        None => println!("device: none"),
    });

    let mut policy = session.config().reconnect;
    if let Some(secs) = interval {
        policy.interval = Duration::from_secs(secs);
        policy.validate()?;
    }

    if let Err(e) = session.connect_to_stored().await {
        tracing::warn!(error = %e, "Initial connect failed");
    }
    let reconnect = session.start_auto_reconnect(policy);

    tokio::signal::ctrl_c().await?;
    reconnect.shutdown().await;
    states.unsubscribe();
    devices.unsubscribe();
    session.disconnect().await;
    Ok(())
}

fn load_receipt(path: &Path) -> Result<ReceiptModel> {
    ReceiptDraft::load(path)?.into_model(path.parent())
}

async fn open_session(cli: &Cli) -> Result<PrinterSession> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::with_default_registry(),
    };
    if cli.registry.is_some() {
        config.registry_path = cli.registry.clone();
    }
    if config.registry_path.is_none() {
        config.registry_path = SessionConfig::with_default_registry().registry_path;
    }

    let host = if cli.mock {
        mock_host()
    } else {
        adapter_host().await?
    };
    PrinterSession::new(host, config)
}

/// A simulated printer that accepts everything.
fn mock_host() -> Arc<dyn BleHost> {
    let host = MockHost::new().with_device(MockDevice::printer("mock-printer", "Mock BT-58"));
    host.choose(Some("mock-printer"));
    host.authorize("mock-printer");
    Arc::new(host)
}

#[cfg(feature = "btleplug")]
async fn adapter_host() -> Result<Arc<dyn BleHost>> {
    Ok(Arc::new(blethermal::transport::btle::BtleHost::new().await?))
}

#[cfg(not(feature = "btleplug"))]
async fn adapter_host() -> Result<Arc<dyn BleHost>> {
    tracing::warn!("Built without the `btleplug` feature; no Bluetooth adapter available");
    Ok(Arc::new(blethermal::transport::UnsupportedHost))
}
