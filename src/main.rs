use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use plantar_link::domain::settings::{PairedDevice, SettingsService};
use plantar_link::infrastructure::logging::init_logger;
use plantar_link::{
    AppEvent, BluetoothService, ChainedPeripherals, ConfiguredPeripherals, DeviceLocator,
    DeviceRef, MessageSeverity, Status, SystemPeripherals,
};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(
    name = "plantar-link",
    version,
    about = "Stream readings from a Bluetooth foot-pressure sensor"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to a paired sensor and print its readings until Ctrl-C
    Connect(ConnectArgs),
    /// List paired sensors
    List,
}

#[derive(Args, Default)]
struct ConnectArgs {
    /// Device name (defaults to `default_device_name` from the settings)
    #[arg(short, long)]
    device: Option<String>,

    /// Serial port the device is bound to, skipping the paired-device lookup
    #[arg(long)]
    port: Option<String>,

    /// Save the --port mapping to the paired-device table
    #[arg(long, requires = "port")]
    remember: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => SettingsService::load_from(path),
        None => SettingsService::new()?,
    };
    let _log_guard = init_logger(&settings.get().log_settings, cli.verbose)?;
    info!("Using settings from {}", settings.path().display());

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let locator = DeviceLocator::new(
        ChainedPeripherals::new(
            ConfiguredPeripherals::from_settings(settings.get()),
            SystemPeripherals,
        ),
        event_tx.clone(),
    );

    match cli.command.unwrap_or(Command::Connect(ConnectArgs::default())) {
        Command::List => {
            let devices = locator.known_devices()?;
            if devices.is_empty() {
                println!("No paired sensors found");
            }
            for device in devices {
                println!("{}\t{}", device.name, device.address);
            }
            Ok(())
        }
        Command::Connect(args) => {
            let name = args
                .device
                .unwrap_or_else(|| settings.get().default_device_name.clone());
            let device = match args.port {
                Some(port) => {
                    if args.remember {
                        settings
                            .add_paired_device(PairedDevice {
                                name: name.clone(),
                                port: port.clone(),
                            })
                            .context("Could not save paired device")?;
                    }
                    DeviceRef::new(name, port)
                }
                None => locator.resolve(&name)?,
            };

            let mut service = BluetoothService::from_settings(settings.get(), event_tx);
            service.connect(device)?;
            run_consumer(&mut service, event_rx).await
        }
    }
}

/// Print events until the session ends; Ctrl-C disconnects
async fn run_consumer(
    service: &mut BluetoothService,
    mut events: mpsc::UnboundedReceiver<AppEvent>,
) -> anyhow::Result<()> {
    let mut interrupted = false;
    let mut lost_link = None;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { return Ok(()) };
                match event {
                    AppEvent::SampleReceived { magnitude } => println!("{}", magnitude),
                    AppEvent::StatusChanged(status) => {
                        print_status(&status);
                        if let Some(result) = session_outcome(status, &mut lost_link) {
                            return result;
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                info!("Interrupted, disconnecting");
                if let Err(e) = service.disconnect() {
                    debug!("Disconnect on interrupt: {}", e);
                }
            }
        }
    }
}

/// Exit result once `status` ends the session, `None` while it is still
/// running. A lost link is remembered so the final `Disconnected` fails.
fn session_outcome(status: Status, lost_link: &mut Option<String>) -> Option<anyhow::Result<()>> {
    match status {
        Status::StreamLost(reason) => {
            *lost_link = Some(reason);
            None
        }
        Status::ConnectFailed(reason) => Some(Err(anyhow::anyhow!("Connection failed: {}", reason))),
        Status::Disconnected => Some(match lost_link.take() {
            Some(reason) => Err(anyhow::anyhow!("Connection to device was lost: {}", reason)),
            None => Ok(()),
        }),
        _ => None,
    }
}

fn print_status(status: &Status) {
    let tag = match status.severity() {
        MessageSeverity::Info => "info",
        MessageSeverity::Success => "ok",
        MessageSeverity::Warning => "warn",
        MessageSeverity::Error => "error",
    };
    eprintln!("[{}] {}", tag, status);
}
