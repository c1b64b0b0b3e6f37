//! Consumer process: follows the dashboard socket and draws the newest
//! remote frame every display tick.
//!
//! Usage: dashboard_viewer [config.toml]

use anyhow::Result;
use env_logger::Env;

use skeleton_link::config::Config;
use skeleton_link::render::skeleton::BACKGROUND_COLOR;
use skeleton_link::render::{FrameBuffer, MinifbWindow, OverlayRenderer};
use skeleton_link::transport::ConsumerClient;

const CONFIG_PATH: &str = "skeleton_link.toml";

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path)?;
    let dashboard = &config.dashboard;

    log::info!("dashboard_viewer {}", env!("GIT_VERSION"));

    // Socket work runs on the runtime's worker; the window owns the main thread
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;
    let client = ConsumerClient::from_config(dashboard);
    for url in client.candidates() {
        log::info!("Candidate: {url}");
    }
    {
        let _guard = runtime.enter();
        client.start()?;
    }

    let width = dashboard.canvas_width;
    let height = dashboard.canvas_height;
    let mut window = MinifbWindow::new("Skeleton Dashboard", width, height)?;
    let mut fb = FrameBuffer::new(width, height);
    let renderer = OverlayRenderer::default();
    let status = client.subscribe();
    let mut last_title = String::new();

    while window.is_open() {
        fb.clear(BACKGROUND_COLOR);
        if let Some(frame) = client.latest() {
            renderer.render_remote(&mut fb, &frame);
        }

        let title = {
            let s = status.borrow();
            format!(
                "Skeleton Dashboard - {} - {} frames, {} joints{}",
                client.state(),
                s.frames_received,
                s.joint_count,
                s.device.as_deref().map(|d| format!(" ({d})")).unwrap_or_default()
            )
        };
        if title != last_title {
            window.set_title(&title);
            last_title = title;
        }

        window.present(&fb)?;
    }

    runtime.block_on(client.shutdown());
    log::info!("window closed");
    Ok(())
}
