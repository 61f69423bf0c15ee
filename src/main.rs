use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glasses_link::config::{Config, TransportKind};
use glasses_link::platform;
use glasses_link::{
    ActuatorState, Angle, BluetoothSerial, LinkLoop, ServoBank, Transport, V4lCamera, WifiClient,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Overrides `[transport] kind` from the config file
    #[arg(long, value_enum)]
    transport: Option<TransportKind>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn build_transport(config: &Config) -> Box<dyn Transport + Send> {
    match config.transport.kind {
        TransportKind::Bluetooth => Box::new(BluetoothSerial::new(&config.bluetooth, &config.link)),
        TransportKind::Wifi => Box::new(WifiClient::new(&config.wifi, &config.link)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.verbose);
    log::info!("Starting application with args: {:?}", args);

    let mut config = Config::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config))?;
    if let Some(kind) = args.transport {
        config.transport.kind = kind;
        config.validate()?;
    }
    log::info!(
        "Transport: {:?}, camera {} at {}x{}, frame interval {} ms",
        config.transport.kind,
        config.camera.device,
        config.camera.width,
        config.camera.height,
        config.link.frame_interval_ms
    );

    platform::log_bringup(&config.bluetooth.device_name);

    // Hardware init failures are fatal; everything after this point recovers.
    let camera = V4lCamera::new(&config.camera)
        .with_context(|| format!("camera init failed for {}", config.camera.device))?;
    let servos = ServoBank::new(&config.actuators).context("servo PWM init failed")?;
    let transport = build_transport(&config);

    let start = ActuatorState::new(
        Angle::clamped(config.actuators.default_angle_a.into()),
        Angle::clamped(config.actuators.default_angle_b.into()),
    );
    log::info!(
        "Servos initialised at A={}°, B={}°",
        config.actuators.default_angle_a,
        config.actuators.default_angle_b
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let loop_shutdown = Arc::clone(&shutdown);
    let link_config = config.link.clone();

    // The link loop is synchronous and polls; keep it off the async workers
    let link_handle = tokio::task::spawn_blocking(move || {
        let mut link = LinkLoop::new(transport, camera, servos, start, link_config);
        link.run(&loop_shutdown);
    });

    log::info!("Link running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");
    shutdown.store(true, Ordering::Relaxed);

    link_handle.await?;

    Ok(())
}
