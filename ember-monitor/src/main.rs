//! Ember Link monitor — connects to one device and logs everything
//! the connection manager reports: status transitions, discovered
//! channels, device properties and live state updates.

mod config;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ember_core::{
    ChannelDescriptor, ChannelState, DeviceHandler, DeviceStatus, EventSink, StatusDetail,
};

use crate::config::MonitorConfig;

#[derive(Parser, Debug)]
#[command(name = "ember-monitor", about = "Diagnostic client for Ember devices")]
struct Args {
    /// Path to a TOML config file.
    #[arg(long, default_value = "ember-monitor.toml")]
    config: PathBuf,

    /// Device hostname (overrides the config file).
    #[arg(long)]
    hostname: Option<String>,

    /// Device port (overrides the config file).
    #[arg(long)]
    port: Option<u16>,

    /// Device password (overrides the config file).
    #[arg(long)]
    password: Option<String>,

    /// Write a default config file and exit.
    #[arg(long)]
    write_config: bool,
}

/// Sink that renders every registry event to the log.
struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn update_status(&self, status: DeviceStatus, detail: StatusDetail, message: &str) {
        match detail {
            StatusDetail::None => info!("device status: {status} ({message})"),
            _ => warn!("device status: {status} [{detail:?}] ({message})"),
        }
    }

    fn replace_properties(&self, properties: HashMap<String, String>) {
        let mut entries: Vec<_> = properties.iter().collect();
        entries.sort();
        for (key, value) in entries {
            info!("property {key} = {value}");
        }
    }

    fn replace_channels(&self, channels: &[ChannelDescriptor]) {
        info!("device exposes {} channels:", channels.len());
        for channel in channels {
            info!(
                "  {} [{}] ({}, key {})",
                channel.id, channel.item_type, channel.capability, channel.key
            );
        }
    }

    fn update_state(&self, channel: &str, state: ChannelState) {
        info!("state {channel} = {state:?}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.write_config {
        MonitorConfig::write_default(&args.config)?;
        println!("wrote default config to {}", args.config.display());
        return Ok(());
    }

    let mut config = MonitorConfig::load(&args.config);
    if let Some(hostname) = args.hostname {
        config.device.hostname = hostname;
    }
    if let Some(port) = args.port {
        config.device.port = port;
    }
    if let Some(password) = args.password {
        config.device.password = password;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    if config.device.hostname.is_empty() {
        return Err("no device hostname configured (use --hostname or a config file)".into());
    }

    let device_config = config.to_device_config();
    info!(
        "monitoring {}:{}",
        device_config.hostname, device_config.port
    );

    let handle = DeviceHandler::spawn(device_config, Arc::new(ConsoleSink));
    handle.connect().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    handle.disconnect().await?;
    // Give the goodbye a moment to flush before the runtime exits.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    Ok(())
}
