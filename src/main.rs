use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::color::Color;
use crate::discovery::Discovery;
use crate::engine::{AnimationEngine, DEFAULT_FADE_STEPS};
use crate::strip::{StripDevice, Ws2801Strip};

mod color;
mod command;
mod discovery;
mod engine;
mod error;
mod gradient;
mod remote;
mod rest;
mod strip;

// Shown while searching for a server.
const ATTENTION: Color = Color::new(0, 100, 255);

/// WS2801 LED strip daemon with broadcast server discovery
#[derive(Parser, Debug)]
#[command(name = "ws2801d", version, about)]
struct Args {
    /// Number of LEDs on the strip
    #[arg(long, env = "WS2801D_LED_COUNT", default_value_t = 32)]
    led_count: usize,

    /// SPI character device the strip is wired to
    #[arg(long, env = "WS2801D_SPI_DEVICE", default_value = "/dev/spidev0.0")]
    spi_device: PathBuf,

    /// Port for the local REST control surface
    #[arg(long, env = "WS2801D_HTTP_PORT", default_value_t = 3000)]
    http_port: u16,

    /// Local port the discovery socket binds
    #[arg(long, default_value_t = discovery::DEVICE_PORT)]
    device_port: u16,

    /// Broadcast address announcements are sent to
    #[arg(long, default_value = "192.168.0.255")]
    broadcast_addr: IpAddr,

    /// Port the control server listens on for announcements
    #[arg(long, default_value_t = discovery::SERVER_PORT)]
    server_port: u16,

    /// Seconds between announcements while unanswered
    #[arg(long, default_value_t = discovery::RETRY_INTERVAL.as_secs())]
    retry_interval: u64,
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ws2801d=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let led_count = args.led_count;

    let dev = Ws2801Strip::open(led_count, &args.spi_device).with_context(|| {
        format!("failed to open SPI device {}", args.spi_device.display())
    })?;
    let engine = AnimationEngine::new(dev, led_count);

    // Start from a known-dark strip.
    engine.apply(vec![Color::BLACK; led_count]).await?;
    info!("ws2801 is ready");

    let listener = TcpListener::bind(("0.0.0.0", args.http_port))
        .await
        .with_context(|| format!("failed to bind rest port {}", args.http_port))?;
    tokio::spawn(rest::serve(listener, engine.clone()));

    {
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = rendezvous(engine, args).await {
                error!(error = %e, "rendezvous loop stopped");
            }
        });
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("ctrl-c received, blanking strip");
            engine.apply(vec![Color::BLACK; led_count]).await?;
        }
        Err(e) => {
            error!(error = %e, "unable to listen for shutdown signal");
        }
    }

    Ok(())
}

/// Alternates between the two rendezvous states for the life of the
/// process: search (announce + idle animation) until a server answers, then
/// forward its stream until it drops, then search again.
async fn rendezvous<D: StripDevice>(engine: AnimationEngine<D>, args: Args) -> Result<()> {
    let target = SocketAddr::from((args.broadcast_addr, args.server_port));
    let interval = Duration::from_secs(args.retry_interval);
    let discovery = Discovery::bind(args.device_port, target, interval)
        .await
        .with_context(|| format!("failed to bind discovery port {}", args.device_port))?;

    loop {
        let (stop_idle, idle_stopped) = watch::channel(false);
        let idle = tokio::spawn(idle_animation(engine.clone(), idle_stopped));

        let peer = discovery.search().await.context("discovery socket failed")?;

        // Stop the idle loop before the server's commands start arriving.
        let _ = stop_idle.send(true);
        let _ = idle.await;

        if let Err(e) = remote::run(peer, &engine).await {
            warn!(error = %e, %peer, "lost connection to server");
        }

        info!("searching for a server again");
    }
}

/// Two-phase attention pattern while unanswered: fade up, fade to black,
/// repeat. Exits at the next fade boundary once told to stop.
async fn idle_animation<D: StripDevice>(
    engine: AnimationEngine<D>,
    mut stopped: watch::Receiver<bool>,
) {
    let led_count = engine.led_count();

    loop {
        for target in [vec![ATTENTION; led_count], vec![Color::BLACK; led_count]] {
            tokio::select! {
                _ = stopped.changed() => return,
                result = engine.fade_to(target, DEFAULT_FADE_STEPS) => {
                    if let Err(e) = result {
                        warn!(error = %e, "idle animation fade failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}
