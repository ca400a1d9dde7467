use crowd_metrics::session::local_now;
use crowd_metrics::{build_report, DensityRecord, Report, SessionConfig, SessionLog};
use crowd_vision::annotate::{annotate, Overlay};
use crowd_vision::camera::FrameSource;
use crowd_vision::{Detector, PersonDetector};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::LiveError;
use crate::render::{status_markdown, RenderUpdate, Renderer};
use crate::signal::StopSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Pause between iterations.
    pub pacing: Duration,
    /// The trend chart is emitted once the log holds more records than this.
    pub chart_min_records: usize,
    /// Treated like a stop signal once this many frames were processed.
    pub max_frames: Option<u64>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            pacing: Duration::from_millis(30),
            chart_min_records: 10,
            max_frames: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Signal,
    FrameLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub reason: StopReason,
}

/// Drives acquire -> detect -> estimate -> append -> render while running.
///
/// Owns the session log. The log is cleared when a run starts and stays
/// readable after it stops, until the next start.
pub struct LiveLoop<D> {
    pipeline: Pipeline<D>,
    state: LoopState,
}

/// Everything one iteration touches, kept apart from `state` so a run can
/// hold the state and the camera in an [`Active`] guard while iterating.
struct Pipeline<D> {
    detector: PersonDetector<D>,
    session: SessionConfig,
    settings: LoopSettings,
    overlay: Option<Overlay>,
    log: SessionLog,
}

/// An opened camera. Dropping it releases the camera and marks the loop
/// stopped, including when the run future itself is dropped mid-await.
struct Active<'a, C: FrameSource> {
    camera: &'a mut C,
    state: &'a mut LoopState,
}

impl<C: FrameSource> Drop for Active<'_, C> {
    fn drop(&mut self) {
        self.camera.release();
        if *self.state == LoopState::Running {
            info!("live: camera released");
        }
        *self.state = LoopState::Stopped;
    }
}

impl<D: Detector> LiveLoop<D> {
    pub fn new(detector: PersonDetector<D>, session: SessionConfig, settings: LoopSettings) -> Self {
        Self {
            pipeline: Pipeline {
                detector,
                session,
                settings,
                overlay: None,
                log: SessionLog::new(),
            },
            state: LoopState::Stopped,
        }
    }

    /// Write the person count and density onto every rendered frame.
    pub fn with_overlay(mut self, overlay: Overlay) -> Self {
        self.pipeline.overlay = Some(overlay);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn log(&self) -> &SessionLog {
        &self.pipeline.log
    }

    /// Report over the last run. `None` while running or when nothing was recorded.
    pub fn report(&self) -> Option<Report> {
        if self.state == LoopState::Running {
            return None;
        }
        build_report(self.pipeline.log.snapshot(), local_now())
    }

    /// One complete run: STOPPED -> RUNNING -> STOPPED.
    ///
    /// The camera is released on every exit path, also when the returned
    /// future is dropped before completion. An error ends the run but leaves
    /// the records gathered so far in the log.
    pub async fn run<C, R>(&mut self, camera: &mut C, renderer: &mut R, stop: &StopSignal) -> Result<RunSummary, LiveError>
    where
        C: FrameSource,
        R: Renderer + ?Sized,
    {
        let p = &mut self.pipeline;
        p.log.clear();

        let mut active = Active { camera, state: &mut self.state };
        if let Err(e) = active.camera.open().await {
            error!("live: camera open failed: {:#}", e);
            return Err(LiveError::CameraUnavailable(format!("{:#}", e)));
        }

        *active.state = LoopState::Running;
        info!(
            "live: running (area={} m², conf={}, backend={})",
            p.session.visible_area,
            p.session.confidence_threshold,
            p.detector.backend()
        );

        let result = p.drive(&mut *active.camera, renderer, stop).await;
        drop(active);

        match &result {
            Ok(s) => info!("live: stopped ({:?}) after {} frames", s.reason, s.frames),
            Err(e) => error!("live: run aborted after {} records: {}", p.log.len(), e),
        }
        result
    }
}

impl<D: Detector> Pipeline<D> {
    async fn drive<C, R>(&mut self, camera: &mut C, renderer: &mut R, stop: &StopSignal) -> Result<RunSummary, LiveError>
    where
        C: FrameSource,
        R: Renderer + ?Sized,
    {
        let mut frames = 0u64;
        loop {
            if stop.is_stopped() {
                return Ok(RunSummary { frames, reason: StopReason::Signal });
            }
            if self.settings.max_frames.is_some_and(|max| frames >= max) {
                return Ok(RunSummary { frames, reason: StopReason::FrameLimit });
            }

            self.step(camera, renderer).await?;
            frames += 1;

            tokio::time::sleep(self.settings.pacing).await;
        }
    }

    async fn step<C, R>(&mut self, camera: &mut C, renderer: &mut R) -> Result<(), LiveError>
    where
        C: FrameSource,
        R: Renderer + ?Sized,
    {
        let frame = camera
            .read()
            .await
            .ok_or_else(|| LiveError::CameraUnavailable("frame read returned no data".into()))?;

        let people = self
            .detector
            .detect(&frame, self.session.confidence_threshold)
            .map_err(LiveError::ModelInvocation)?;

        let record = DensityRecord::now(people.len() as u32, self.session.visible_area);
        self.log.append(record);
        debug!("live: frame {}x{} -> {} persons", frame.width(), frame.height(), record.person_count);

        let mut annotated = annotate(&frame, &people.boxes);
        if let Some(overlay) = &self.overlay {
            overlay.draw(&mut annotated, record.person_count, record.density);
        }
        let status = status_markdown(&record, self.log.len());
        let trend = (self.log.len() > self.settings.chart_min_records).then(|| self.log.densities());

        renderer.render(&RenderUpdate {
            frame: &annotated,
            status: &status,
            record: &record,
            records: self.log.len(),
            trend: trend.as_deref(),
        });
        Ok(())
    }
}
