use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::frame::Frame;

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub mode: String, // "libcamera-jpeg" | "v4l2-mjpeg" | "replay"
    #[serde(default = "default_device")]
    pub device: String, // /dev/video0 (v4l2)
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Directory of .jpg/.png frames for `replay`.
    pub replay_dir: Option<String>,
    #[serde(default)]
    pub replay_loop: bool,
}

fn default_device() -> String {
    "/dev/video0".into()
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

/// Source of frames for a run. `read` returning `None` means no data.
#[allow(async_fn_in_trait)]
pub trait FrameSource {
    async fn open(&mut self) -> Result<()>;
    async fn read(&mut self) -> Option<Frame>;
    fn release(&mut self);
}

pub struct Camera {
    cfg: CameraConfig,
    replay: Vec<PathBuf>,
    cursor: usize,
    opened: bool,
}

impl Camera {
    pub fn new(cfg: CameraConfig) -> Self {
        Self { cfg, replay: Vec::new(), cursor: 0, opened: false }
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    async fn next_encoded(&mut self) -> Result<Vec<u8>> {
        if self.cfg.mode == "replay" {
            if self.cursor >= self.replay.len() {
                anyhow::ensure!(self.cfg.replay_loop && !self.replay.is_empty(), "replay exhausted");
                self.cursor = 0;
            }
            let path = &self.replay[self.cursor];
            self.cursor += 1;
            return tokio::fs::read(path)
                .await
                .with_context(|| format!("read replay frame {}", path.display()));
        }
        capture_jpeg(&self.cfg).await
    }
}

impl FrameSource for Camera {
    async fn open(&mut self) -> Result<()> {
        match self.cfg.mode.as_str() {
            "replay" => {
                let dir = self.cfg.replay_dir.as_deref().context("camera.replay_dir missing")?;
                self.replay = list_frames(dir).await?;
                anyhow::ensure!(!self.replay.is_empty(), "no .jpg/.png frames in {}", dir);
                self.cursor = 0;
                info!("camera: replaying {} frames from {}", self.replay.len(), dir);
            }
            "libcamera-jpeg" | "v4l2-mjpeg" => {
                // probe with one capture so a missing camera fails the start, not the first frame
                let probe = capture_jpeg(&self.cfg).await.context("camera probe")?;
                info!("camera: {} ready ({} byte probe)", self.cfg.mode, probe.len());
            }
            other => anyhow::bail!("unknown camera.mode: {}", other),
        }
        self.opened = true;
        Ok(())
    }

    async fn read(&mut self) -> Option<Frame> {
        if !self.opened {
            warn!("camera: read on a closed source");
            return None;
        }
        let bytes = match self.next_encoded().await {
            Ok(b) => b,
            Err(e) => {
                warn!("camera: no frame: {:#}", e);
                return None;
            }
        };
        match Frame::from_encoded(&bytes) {
            Ok(f) => Some(f),
            Err(e) => {
                warn!("camera: undecodable frame: {:#}", e);
                None
            }
        }
    }

    fn release(&mut self) {
        if self.opened {
            debug!("camera: released");
        }
        self.opened = false;
        self.cursor = 0;
    }
}

async fn list_frames(dir: &str) -> Result<Vec<PathBuf>> {
    let mut rd = tokio::fs::read_dir(dir).await.with_context(|| format!("open replay dir {}", dir))?;
    let mut out = Vec::new();
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase());
        if matches!(ext.as_deref(), Some("jpg" | "jpeg" | "png")) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Pragmatic capture:
/// - libcamera-jpeg: `libcamera-still -n -t 1 --width ... --height ... -o -`
///   returns a JPEG frame on stdout
/// - v4l2-mjpeg: `ffmpeg` grabs a single MJPEG frame from the device
pub async fn capture_jpeg(cfg: &CameraConfig) -> Result<Vec<u8>> {
    let jpeg = match cfg.mode.as_str() {
        "libcamera-jpeg" => capture_libcamera(cfg).await?,
        "v4l2-mjpeg" => capture_v4l2_ffmpeg(cfg).await?,
        other => anyhow::bail!("camera.mode {} cannot capture", other),
    };
    anyhow::ensure!(!jpeg.is_empty(), "{} returned no data", cfg.mode);
    Ok(jpeg)
}

async fn capture_libcamera(cfg: &CameraConfig) -> Result<Vec<u8>> {
    let mut cmd = Command::new("libcamera-still");
    cmd.args([
        "-n",                 // no preview
        "-t", "1",            // 1ms
        "--width", &cfg.width.to_string(),
        "--height", &cfg.height.to_string(),
        "-o", "-",            // stdout
    ]);

    debug!("capture: libcamera-still");
    let out = cmd.output().await.context("run libcamera-still")?;
    anyhow::ensure!(out.status.success(), "libcamera-still failed");
    Ok(out.stdout)
}

async fn capture_v4l2_ffmpeg(cfg: &CameraConfig) -> Result<Vec<u8>> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args([
        "-hide_banner", "-loglevel", "error",
        "-f", "video4linux2",
        "-input_format", "mjpeg",
        "-video_size", &format!("{}x{}", cfg.width, cfg.height),
        "-i", &cfg.device,
        "-vframes", "1",
        "-f", "image2pipe",
        "-vcodec", "mjpeg",
        "-",
    ]);

    debug!("capture: ffmpeg v4l2 {}", cfg.device);
    let out = cmd.output().await.context("run ffmpeg capture")?;
    anyhow::ensure!(out.status.success(), "ffmpeg capture failed on {}", cfg.device);
    Ok(out.stdout)
}
