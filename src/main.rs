//! Command-line entry point of the EnOcean to Hue gateway.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use enocean_hue::transport::{self, SerialConfig};
use enocean_hue::{BridgeConfig, Gateway, GatewayConfig};
use tokio::net::TcpListener;

/// Forward EnOcean switch and contact telegrams to Hue bridges.
#[derive(Parser, Debug)]
#[command(name = "enocean-hue")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial port of the EnOcean transceiver.
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Serial baud rate.
    #[arg(short, long, default_value_t = transport::serial::DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Bridge as ip:api_key:sensor_id[:group], numbered from 1 in order.
    #[arg(short = 'b', long = "bridge", value_name = "BRIDGE")]
    bridges: Vec<BridgeConfig>,

    /// Mapping rule file.
    #[arg(short, long, default_value = "/etc/enocean-hue.map")]
    rules: PathBuf,

    /// Accept repeater connections on this address.
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Log as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// List serial ports and exit.
    #[arg(long)]
    list_ports: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs);

    if args.list_ports {
        for port in transport::list_ports()? {
            println!("{port}");
        }
        return Ok(());
    }

    let mut config = GatewayConfig::new(
        SerialConfig::new(&args.port).baud_rate(args.baud),
        &args.rules,
    );
    for bridge in args.bridges {
        config = config.bridge(bridge);
    }
    if let Some(addr) = args.listen {
        config = config.listen(addr);
    }

    let mut gateway = Gateway::from_config(&config)
        .with_context(|| format!("cannot load rules from {}", config.rules.display()))?;
    let serial = transport::serial::open(&config.serial)
        .with_context(|| format!("cannot open {}", config.serial.port))?;
    let listener = match config.listen {
        Some(addr) => Some(
            TcpListener::bind(addr)
                .await
                .with_context(|| format!("cannot listen on {addr}"))?,
        ),
        None => None,
    };

    gateway.run(serial, listener).await?;
    Ok(())
}

fn init_logging(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("enocean_hue=info,warn"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }
}
