//! Corella command-line tool.
//!
//! Talks to a Corella module over a serial port, or to the built-in
//! simulated module with `--demo`.
//!
//! # Usage
//!
//! ```text
//! corella [OPTIONS] <COMMAND>
//!
//! Commands:
//!   ports         List serial ports
//!   probe         Send `AT` and print the response
//!   id            Print the device id
//!   status        Print the network throttle status
//!   diagnostics   Print the diagnostics record as JSON
//!   battery       Print the supply voltage
//!   version       Print the version record as JSON
//!   leds          Switch the LEDs on or off
//!   send          Transmit a payload
//!   write-config  Write the effective configuration to a JSON file
//! ```
//!
//! Logging goes through `RUST_LOG` (default `info`).

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use corella_core::demo::DemoDevice;
use corella_core::protocol::{
    list_ports, Connection, ConnectionConfig, LedState, LineTransport, SerialTransport,
    ThrottleDirective,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "corella", about = "Talk to a Corella module over its AT interface", version)]
struct Cli {
    /// Serial port the module is attached to
    #[arg(long, short, env = "CORELLA_PORT")]
    port: Option<String>,

    /// Baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Per-line read timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Do not log commands and responses
    #[arg(long, short)]
    quiet: bool,

    /// Send without checking the module's throttle status
    #[arg(long)]
    no_throttle: bool,

    /// JSON configuration file; command-line options override it
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Use the simulated module instead of a serial port
    #[arg(long)]
    demo: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// List serial ports
    Ports,
    /// Write the effective configuration to a JSON file
    WriteConfig { path: PathBuf },
    #[command(flatten)]
    Device(DeviceCmd),
}

/// Commands that talk to the module
#[derive(Debug, Subcommand)]
enum DeviceCmd {
    /// Send `AT` and print the response
    Probe,
    /// Print the device id
    Id,
    /// Print the network throttle status
    Status,
    /// Print the diagnostics record as JSON
    Diagnostics,
    /// Print the supply voltage
    Battery,
    /// Print the version record as JSON
    Version,
    /// Switch the LEDs on or off
    Leds {
        #[arg(value_enum)]
        state: Leds,
    },
    /// Transmit a payload (padded or truncated to 12 characters)
    Send {
        /// Packet id, 1-9
        packet_id: u8,
        /// Payload data
        data: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Leds {
    On,
    Off,
}

impl From<Leds> for LedState {
    fn from(leds: Leds) -> Self {
        match leds {
            Leds::On => LedState::On,
            Leds::Off => LedState::Off,
        }
    }
}

impl Cli {
    /// Merge the config file (if any) with command-line overrides
    fn connection_config(&self) -> anyhow::Result<ConnectionConfig> {
        let mut config = match &self.config {
            Some(path) => ConnectionConfig::from_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => ConnectionConfig::default(),
        };

        if let Some(port) = &self.port {
            config.port_name = port.clone();
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if self.quiet {
            config.verbose = false;
        }
        if self.no_throttle {
            config.handle_throttling = false;
        }
        Ok(config)
    }
}

fn run<T: LineTransport>(conn: &mut Connection<T>, command: &DeviceCmd) -> anyhow::Result<()> {
    match command {
        DeviceCmd::Probe => {
            for line in conn.request_attention()? {
                println!("{}", line);
            }
        }
        DeviceCmd::Id => println!("{}", conn.id()?),
        DeviceCmd::Status => match conn.status()? {
            ThrottleDirective::NoWait => println!("ready"),
            ThrottleDirective::Wait(secs) => println!("wait {} s", secs),
        },
        DeviceCmd::Diagnostics => {
            let diag = conn.diagnostics()?;
            println!("{}", serde_json::to_string_pretty(&diag)?);
        }
        DeviceCmd::Battery => println!("{:.2}", conn.battery()?),
        DeviceCmd::Version => {
            let version = conn.version()?;
            println!("{}", serde_json::to_string_pretty(&version)?);
        }
        DeviceCmd::Leds { state } => println!("{}", conn.set_leds((*state).into())?),
        DeviceCmd::Send { packet_id, data } => {
            let status = conn
                .send(*packet_id, data)
                .with_context(|| format!("sending packet {}", packet_id))?;
            println!("{}", status);
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.connection_config()?;

    let command = match cli.command {
        Cmd::Ports => {
            for port in list_ports() {
                match port.product {
                    Some(product) => println!("{}\t{}", port.name, product),
                    None => println!("{}", port.name),
                }
            }
            return Ok(());
        }
        Cmd::WriteConfig { path } => {
            config
                .save(&path)
                .with_context(|| format!("writing config to {}", path.display()))?;
            info!("Wrote configuration to {}", path.display());
            return Ok(());
        }
        Cmd::Device(command) => command,
    };

    let transport: Box<dyn LineTransport> = if cli.demo {
        info!("Using simulated module");
        Box::new(DemoDevice::new())
    } else {
        anyhow::ensure!(
            !config.port_name.is_empty(),
            "no serial port given (use --port, CORELLA_PORT or a config file)"
        );
        Box::new(SerialTransport::new(
            &config.port_name,
            config.effective_baud_rate(),
            config.effective_timeout(),
        ))
    };

    let port = config.port_name.clone();
    let mut conn = Connection::with_transport(config, transport);
    run(&mut conn, &command).with_context(|| format!("talking to module on '{}'", port))
}
