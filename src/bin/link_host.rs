//! Host end of the WiFi link
//!
//! Accepts the device's TCP connection, stores incoming frames as JPEG files
//! and forwards operator input (`90,45`) as servo commands.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

use glasses_link::host::{format_command, parse_operator_input, serve_device};

#[derive(Parser, Debug)]
#[command(name = "link-host")]
#[command(about = "Receives frames from the glasses and sends servo commands")]
#[command(version)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Directory receiving frame_NNNN.jpg files
    #[arg(short, long, default_value = "frames")]
    out_dir: PathBuf,

    /// Number of frame files kept before names are reused
    #[arg(long, default_value_t = 100)]
    ring: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    tokio::fs::create_dir_all(&cli.out_dir).await?;
    let ring = cli.ring.max(1);

    let listener = TcpListener::bind(&cli.listen).await?;
    log::info!("Waiting for the device on {}", cli.listen);
    log::info!("Enter servo commands as two angles separated by a comma (e.g. 90,45)");

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<String>(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(input)) = lines.next_line().await {
            match parse_operator_input(&input) {
                Ok((a, b)) => {
                    if cmd_tx.send(format_command(a, b)).await.is_err() {
                        break;
                    }
                }
                Err(e) => log::warn!("Invalid input: {}", e),
            }
        }
    });

    // Ctrl+C has to reach both the accept loop and a running session
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let mut session_stop = stop_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Cannot listen for Ctrl+C: {}", e);
            return;
        }
        let _ = stop_tx.send(true);
    });

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                log::info!("Device connected from {}", peer);
                match serve_device(stream, cli.out_dir.clone(), ring, &mut cmd_rx, &mut session_stop).await {
                    Ok(()) => log::info!("Device session ended"),
                    Err(e) => log::error!("Device connection failed: {}", e),
                }
            }
            Ok(()) = stop_rx.changed() => {
                log::info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}
