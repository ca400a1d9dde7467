use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crowd_live::render::log_report;
use crowd_live::{stop_channel, ConsoleRenderer, LiveLoop, LoopSettings};
use crowd_metrics::SessionConfig;
use crowd_vision::annotate::Overlay;
use crowd_vision::camera::{Camera, CameraConfig};
use crowd_vision::{Detector, PersonDetector, VisionConfig};

#[cfg(feature = "vision-onnx")]
use crowd_vision::onnx::OnnxDetector;
#[cfg(feature = "vision-tflite")]
use crowd_vision::tflite::TfliteDetector;

#[derive(Debug, Parser)]
#[command(name = "crowd", version, about = "crowdgauge - live people count and crowd density from a camera")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Doctor,
    /// Start a run; Ctrl-C stops it and writes the report.
    Run(RunArgs),
    Vision { #[command(subcommand)] cmd: VisionCmd },
}

#[derive(Debug, Subcommand)]
enum VisionCmd { Inspect }

#[derive(Debug, Args)]
struct RunArgs {
    /// Visible area in m² (overrides session.visible_area).
    #[arg(long)]
    area: Option<f64>,
    /// Detector confidence threshold (overrides session.confidence_threshold).
    #[arg(long)]
    conf: Option<f32>,
    /// Stop after this many seconds.
    #[arg(long)]
    duration_s: Option<u64>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    #[serde(default)]
    session: SessionCfg,
    camera: CameraConfig,
    vision: VisionConfig,
    #[serde(default)]
    render: RenderCfg,
    #[serde(default)]
    report: ReportCfg,
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct SessionCfg {
    visible_area: f64,
    confidence_threshold: f32,
    pacing_ms: u64,
    chart_min_records: usize,
}

impl Default for SessionCfg {
    fn default() -> Self {
        let s = SessionConfig::default();
        let l = LoopSettings::default();
        Self {
            visible_area: s.visible_area,
            confidence_threshold: s.confidence_threshold,
            pacing_ms: l.pacing.as_millis() as u64,
            chart_min_records: l.chart_min_records,
        }
    }
}

impl SessionCfg {
    fn measurement(&self) -> SessionConfig {
        SessionConfig {
            visible_area: self.visible_area,
            confidence_threshold: self.confidence_threshold,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct RenderCfg {
    frame_path: Option<String>,
    status_path: Option<String>,
    /// TTF/OTF used for the count/density caption; no caption when unset.
    font_path: Option<String>,
    font_px: f32,
}

impl Default for RenderCfg {
    fn default() -> Self {
        Self { frame_path: None, status_path: None, font_path: None, font_px: 32.0 }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct ReportCfg {
    out_dir: String,
}

impl Default for ReportCfg {
    fn default() -> Self {
        Self { out_dir: ".".into() }
    }
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    parse_config(&s)
}

fn parse_config(s: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(s).context("parse config toml")?;
    let session = cfg.session.measurement();
    session.validate()?;
    warn_unusable_area("config", &session);
    Ok(cfg)
}

fn warn_unusable_area(origin: &str, session: &SessionConfig) {
    if !session.area_is_usable() {
        warn!("{}: visible_area={} is not positive; density will read 0", origin, session.visible_area);
    }
}

/// Session settings for one run: config values with CLI overrides applied.
fn session_for_run(cfg: &Config, args: &RunArgs) -> Result<SessionConfig> {
    let mut session = cfg.session.measurement();
    if let Some(a) = args.area { session.visible_area = a; }
    if let Some(c) = args.conf { session.confidence_threshold = c; }
    session.validate()?;
    if args.area.is_some() {
        warn_unusable_area("run --area", &session);
    }
    Ok(session)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // before any blocking pool thread exists
    crowd_metrics::session::init_local_offset();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Run(args) => run(&cfg, args).await?,
        Command::Vision { cmd } => vision_cmd(&cfg, cmd)?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    crowd_metrics::doctor::check_session(&cfg.session.measurement())?;
    crowd_metrics::doctor::check_report_dir(&cfg.report.out_dir)?;
    crowd_vision::doctor::check_camera(&cfg.camera)?;
    crowd_vision::doctor::check_model(&cfg.vision)?;
    anyhow::ensure!(cfg.session.pacing_ms <= 5_000, "session.pacing_ms too large");

    info!("doctor: OK");
    Ok(())
}

fn vision_cmd(cfg: &Config, cmd: VisionCmd) -> Result<()> {
    match cmd {
        VisionCmd::Inspect => {
            let v = &cfg.vision;
            let report: String = match v.backend.as_str() {
                #[cfg(feature = "vision-onnx")]
                "onnx" => OnnxDetector::new(v)?.inspect()?,
                #[cfg(feature = "vision-tflite")]
                "tflite" => TfliteDetector::new(v)?.inspect()?,
                other => anyhow::bail!("vision backend {} not available in this build", other),
            };
            print!("{}", report);
            Ok(())
        }
    }
}

async fn run(cfg: &Config, args: RunArgs) -> Result<()> {
    let session = session_for_run(cfg, &args)?;

    // model is loaded once and handed to the loop
    let detector = PersonDetector::from_config(init_detector(&cfg.vision)?, &cfg.vision)?;
    let settings = LoopSettings {
        pacing: Duration::from_millis(cfg.session.pacing_ms),
        chart_min_records: cfg.session.chart_min_records,
        max_frames: args.max_frames,
    };
    let mut live = LiveLoop::new(detector, session, settings);
    if let Some(font) = &cfg.render.font_path {
        live = live.with_overlay(Overlay::load(font, cfg.render.font_px)?);
    }
    let mut camera = Camera::new(cfg.camera.clone());
    let mut renderer = ConsoleRenderer::new(
        cfg.render.frame_path.as_ref().map(PathBuf::from),
        cfg.render.status_path.as_ref().map(PathBuf::from),
    );

    let (stop, signal) = stop_channel();
    let on_ctrl_c = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("run: ctrl-c, stopping after this frame");
            on_ctrl_c.stop();
        }
    });
    if let Some(secs) = args.duration_s {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            stop.stop();
        });
    }

    // the loop logs its own failure; the report still covers what was recorded
    let outcome = live.run(&mut camera, &mut renderer, &signal).await;

    match live.report() {
        Some(report) => {
            log_report(&report);
            let path = report.write_to(Path::new(&cfg.report.out_dir))?;
            println!("{}", path.display());
        }
        None => info!("run: nothing recorded, no report"),
    }

    outcome.map(|_| ()).context("run ended with an error")
}

fn init_detector(v: &VisionConfig) -> Result<Box<dyn Detector>> {
    match v.backend.as_str() {
        #[cfg(feature = "vision-onnx")]
        "onnx" => Ok(Box::new(OnnxDetector::new(v)?)),
        #[cfg(feature = "vision-tflite")]
        "tflite" => Ok(Box::new(TfliteDetector::new(v)?)),
        other => anyhow::bail!(
            "vision.backend {} not available; build with --features vision-onnx or vision-tflite",
            other
        ),
    }
}
