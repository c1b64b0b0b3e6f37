//! Capture-side process: receives frames from the host, runs pose detection,
//! correlates depth and streams skeleton packets.
//!
//! Usage: skeleton_sender [config.toml]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use env_logger::Env;
use tokio_util::sync::CancellationToken;

use skeleton_link::bridge::Bridge;
use skeleton_link::config::Config;
use skeleton_link::host_link::run_host_link;
use skeleton_link::pipeline::FramePipeline;
use skeleton_link::pose::{default_engine, PoseDetector};
use skeleton_link::render::PacketRenderer;
use skeleton_link::transport::Outbound;

const CONFIG_PATH: &str = "skeleton_link.toml";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path)?;

    log::info!("skeleton_sender {}", env!("GIT_VERSION"));
    log::info!("Host link: {}", config.host_link.addr);
    log::info!("Stream mode: {:?}", config.stream.stream_mode);
    log::info!(
        "Exercise: {}, depth mode: {}, device: {}",
        config.stream.exercise,
        config.stream.depth_mode(),
        config.stream.device()
    );

    // No model, no tracking
    let mut detector = PoseDetector::new(default_engine(&config.pose));
    detector
        .init()
        .with_context(|| format!("failed to load pose model {}", config.pose.model))?;

    let (bridge, commands) = Bridge::new(Duration::from_millis(config.host_link.depth_timeout_ms));
    let outbound = Outbound::from_config(&config.stream, &bridge);

    let pipeline = FramePipeline::new(
        Arc::clone(&bridge),
        detector,
        config.stream.clone(),
        debug_overlay(&config),
        outbound.sink(),
    );
    pipeline.attach();

    let cancel = CancellationToken::new();
    let link = tokio::spawn(run_host_link(
        config.host_link.clone(),
        Arc::clone(&bridge),
        commands,
        cancel.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    log::info!("shutting down...");

    cancel.cancel();
    if let Err(e) = link.await {
        log::error!("[host] link task failed: {e}");
    }
    outbound.shutdown().await;
    log::info!("frames dropped while busy: {}", pipeline.dropped_frames());
    Ok(())
}

#[cfg(feature = "viewer")]
fn debug_overlay(config: &Config) -> Option<Arc<dyn PacketRenderer>> {
    use skeleton_link::render::{MinifbWindow, SharedOverlay};

    if !config.debug.view {
        return None;
    }
    let width = config.dashboard.canvas_width;
    let height = config.dashboard.canvas_height;
    let overlay = Arc::new(SharedOverlay::new(width, height));

    let shown = Arc::clone(&overlay);
    std::thread::spawn(move || {
        let mut window = match MinifbWindow::new("Skeleton Debug", width, height) {
            Ok(w) => w,
            Err(e) => {
                log::error!("[debug] window unavailable: {e:#}");
                return;
            }
        };
        while window.is_open() {
            if let Err(e) = window.present(&shown.snapshot()) {
                log::error!("[debug] {e:#}");
                break;
            }
        }
        log::info!("[debug] window closed");
    });

    Some(overlay as Arc<dyn PacketRenderer>)
}

#[cfg(not(feature = "viewer"))]
fn debug_overlay(config: &Config) -> Option<Arc<dyn PacketRenderer>> {
    if config.debug.view {
        log::warn!("[debug] view requested but built without the `viewer` feature");
    }
    None
}
