use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub host_link: HostLinkConfig,
    #[serde(default)]
    pub pose: PoseConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

/// Capture-side overlay window (needs the `viewer` feature)
#[derive(Debug, Deserialize, Default, Clone)]
pub struct DebugConfig {
    #[serde(default)]
    pub view: bool,
}

/// How packets leave the capture side
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Hand packets to the capture host, which broadcasts them itself
    #[default]
    #[serde(alias = "hostBroadcast")]
    HostBroadcast,
    /// Own a websocket to the consumer endpoint
    #[serde(alias = "directSocket")]
    DirectSocket,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    #[serde(default, alias = "streamMode")]
    pub stream_mode: StreamMode,
    #[serde(default = "default_stream_host")]
    pub host: String,
    #[serde(default = "default_stream_port")]
    pub port: u16,
    #[serde(default = "default_stream_path")]
    pub path: String,
    #[serde(default, alias = "isUsingLiDAR")]
    pub is_using_lidar: bool,
    /// Unset: "lidar" when `is_using_lidar`, otherwise "stereo_depth"
    #[serde(default, alias = "depthMode")]
    pub depth_mode: Option<String>,
    #[serde(default = "default_exercise")]
    pub exercise: String,
    /// Unset: "lidar_camera" when `is_using_lidar`, otherwise "rgb_camera"
    #[serde(default)]
    pub device: Option<String>,
    /// Fixed retry delay of the direct-socket sender
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

pub const DEFAULT_DEPTH_MODE: &str = "stereo_depth";
pub const LIDAR_DEPTH_MODE: &str = "lidar";
pub const DEFAULT_EXERCISE: &str = "standing_knee_flexion";
pub const DEFAULT_DEVICE: &str = "rgb_camera";
pub const LIDAR_DEVICE: &str = "lidar_camera";

fn default_stream_host() -> String { "127.0.0.1".to_string() }
fn default_stream_port() -> u16 { 8765 }
fn default_stream_path() -> String { "/ws/skeleton".to_string() }
fn default_exercise() -> String { DEFAULT_EXERCISE.to_string() }
fn default_reconnect_delay_ms() -> u64 { 2000 }

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_mode: StreamMode::default(),
            host: default_stream_host(),
            port: default_stream_port(),
            path: default_stream_path(),
            is_using_lidar: false,
            depth_mode: None,
            exercise: default_exercise(),
            device: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl StreamConfig {
    pub fn depth_mode(&self) -> &str {
        match &self.depth_mode {
            Some(mode) => mode,
            None if self.is_using_lidar => LIDAR_DEPTH_MODE,
            None => DEFAULT_DEPTH_MODE,
        }
    }

    pub fn device(&self) -> &str {
        match &self.device {
            Some(device) => device,
            None if self.is_using_lidar => LIDAR_DEVICE,
            None => DEFAULT_DEVICE,
        }
    }

    /// `ws://host:port/path` of the direct-socket consumer
    pub fn socket_url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, self.path)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HostLinkConfig {
    #[serde(default = "default_host_addr")]
    pub addr: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_depth_timeout_ms")]
    pub depth_timeout_ms: u64,
}

fn default_host_addr() -> String { "127.0.0.1:9100".to_string() }
fn default_depth_timeout_ms() -> u64 { 150 }

impl Default for HostLinkConfig {
    fn default() -> Self {
        Self {
            addr: default_host_addr(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            depth_timeout_ms: default_depth_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoseConfig {
    /// ONNX landmark model (BlazePose full/heavy)
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    #[serde(default = "default_landmark_output")]
    pub landmark_output: String,
    #[serde(default = "default_world_output")]
    pub world_output: String,
}

fn default_model() -> String { "models/pose_landmark_full.onnx".to_string() }
fn default_input_name() -> String { "input_1".to_string() }
fn default_landmark_output() -> String { "Identity".to_string() }
fn default_world_output() -> String { "Identity_4".to_string() }

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            input_name: default_input_name(),
            landmark_output: default_landmark_output(),
            world_output: default_world_output(),
        }
    }
}

/// Which consumer endpoint the dashboard client subscribes to
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DashboardView {
    #[default]
    Dashboard,
    Exercise,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default = "default_stream_host")]
    pub host: String,
    /// Same-origin port, tried first
    #[serde(default = "default_dashboard_port")]
    pub port: u16,
    /// Direct port of the socket server, tried second
    #[serde(default = "default_stream_port")]
    pub fallback_port: u16,
    #[serde(default)]
    pub view: DashboardView,
    #[serde(default = "default_exercise")]
    pub exercise_key: String,
    #[serde(default = "default_detection_modes")]
    pub detection_modes: Vec<String>,
    #[serde(default = "default_canvas_width")]
    pub canvas_width: usize,
    #[serde(default = "default_canvas_height")]
    pub canvas_height: usize,
}

fn default_dashboard_port() -> u16 { 8080 }
fn default_detection_modes() -> Vec<String> { vec!["pose".to_string(), "depth".to_string()] }
fn default_canvas_width() -> usize { 960 }
fn default_canvas_height() -> usize { 540 }

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            host: default_stream_host(),
            port: default_dashboard_port(),
            fallback_port: default_stream_port(),
            view: DashboardView::default(),
            exercise_key: default_exercise(),
            detection_modes: default_detection_modes(),
            canvas_width: default_canvas_width(),
            canvas_height: default_canvas_height(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Defaults when the file does not exist; a broken file is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::warn!("[config] {} not found, using defaults", path.display());
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        Self::load(path)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let stream = &self.stream;
        if stream.port == 0 {
            bail!("stream.port must be non-zero");
        }
        if !stream.path.starts_with('/') {
            bail!("stream.path must start with '/', got {:?}", stream.path);
        }
        if stream.exercise.trim().is_empty() {
            bail!("stream.exercise must not be empty");
        }
        if stream.depth_mode().trim().is_empty() {
            bail!("stream.depth_mode must not be empty");
        }
        if self.host_link.depth_timeout_ms == 0 {
            bail!("host_link.depth_timeout_ms must be non-zero");
        }
        if self.dashboard.port == 0 || self.dashboard.fallback_port == 0 {
            bail!("dashboard ports must be non-zero");
        }
        if self.dashboard.canvas_width == 0 || self.dashboard.canvas_height == 0 {
            bail!("dashboard canvas must have a non-zero size");
        }
        Ok(())
    }
}
