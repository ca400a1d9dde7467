use anyhow::{Context, Result};
use crowd_metrics::{DensityRecord, Report};
use image::RgbImage;
use std::path::PathBuf;
use tracing::{info, warn};

/// Everything the presentation side gets after one iteration.
pub struct RenderUpdate<'a> {
    pub frame: &'a RgbImage,
    pub status: &'a str,
    pub record: &'a DensityRecord,
    pub records: usize,
    /// Density series, present once the log is long enough to chart.
    pub trend: Option<&'a [f64]>,
}

/// Presentation callback, invoked after each state update.
pub trait Renderer {
    fn render(&mut self, update: &RenderUpdate<'_>);
}

pub fn status_markdown(record: &DensityRecord, records: usize) -> String {
    format!(
        "**Current state**  \nPeople detected: **{}**  \nDensity: **{:.2} persons/m²** → **{}**  \nRecords: {}\n",
        record.person_count, record.density, record.tier(), records
    )
}

const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Text chart of the last `width` values, scaled to the window's max.
pub fn sparkline(values: &[f64], width: usize) -> String {
    let tail = &values[values.len().saturating_sub(width)..];
    let max = tail.iter().copied().fold(0.0f64, f64::max);
    tail.iter()
        .map(|v| {
            if max <= 0.0 || !v.is_finite() {
                BARS[0]
            } else {
                let idx = ((v / max) * (BARS.len() - 1) as f64).round() as usize;
                BARS[idx.min(BARS.len() - 1)]
            }
        })
        .collect()
}

/// Logs each update; optionally mirrors the annotated frame and status to
/// files a browser page or image viewer can poll.
pub struct ConsoleRenderer {
    frame_path: Option<PathBuf>,
    status_path: Option<PathBuf>,
    chart_width: usize,
}

impl ConsoleRenderer {
    pub fn new(frame_path: Option<PathBuf>, status_path: Option<PathBuf>) -> Self {
        Self { frame_path, status_path, chart_width: 60 }
    }

    fn write_outputs(&self, update: &RenderUpdate<'_>) -> Result<()> {
        if let Some(p) = &self.frame_path {
            update.frame.save(p).with_context(|| format!("write frame {}", p.display()))?;
        }
        if let Some(p) = &self.status_path {
            std::fs::write(p, update.status).with_context(|| format!("write status {}", p.display()))?;
        }
        Ok(())
    }
}

impl Renderer for ConsoleRenderer {
    fn render(&mut self, update: &RenderUpdate<'_>) {
        let r = update.record;
        info!(
            "live: {} persons {:.2}/m² {} (records={})",
            r.person_count, r.density, r.tier(), update.records
        );
        if let Some(trend) = update.trend {
            info!("live: density {}", sparkline(trend, self.chart_width));
        }
        if let Err(e) = self.write_outputs(update) {
            warn!("render: {:#}", e);
        }
    }
}

/// Logs the end-of-run summary and the combined persons / density×20 chart.
pub fn log_report(report: &Report) {
    let s = &report.summary;
    info!("report: capture finished, {} records", s.records);
    info!("report: mean density {:.2} pers/m²", s.mean_density);
    info!("report: max density {:.2} pers/m²", s.max_density);
    info!("report: mean persons {:.1}", s.mean_persons);
    info!("report: persons     {}", sparkline(&report.persons_series, 80));
    info!("report: density x20 {}", sparkline(&report.density_series, 80));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(count: u32, area: f64) -> DensityRecord {
        DensityRecord::new(time::OffsetDateTime::UNIX_EPOCH, count, area)
    }

    #[test]
    fn test_status_markdown() {
        let s = status_markdown(&record(45, 30.0), 12);
        assert!(s.contains("People detected: **45**"));
        assert!(s.contains("Density: **1.50 persons/m²** → **MEDIUM**"));
        assert!(s.ends_with("Records: 12\n"));
    }

    #[test]
    fn test_sparkline_scales_and_truncates() {
        assert_eq!(sparkline(&[0.0, 1.0, 2.0], 10), "▁▅█");
        assert_eq!(sparkline(&[9.0, 0.0, 0.0, 0.0], 2), "▁▁");
        assert_eq!(sparkline(&[], 5), "");
        assert_eq!(sparkline(&[5.0, 5.0], 5).chars().count(), 2);
    }

    #[test]
    fn test_console_renderer_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let frame_path = dir.path().join("live.png");
        let status_path = dir.path().join("status.md");
        let mut r = ConsoleRenderer::new(Some(frame_path.clone()), Some(status_path.clone()));

        let img = RgbImage::new(16, 12);
        let rec = record(3, 1.0);
        let status = status_markdown(&rec, 1);
        let trend = [3.0];
        r.render(&RenderUpdate { frame: &img, status: &status, record: &rec, records: 1, trend: Some(&trend[..]) });

        assert_eq!(std::fs::read_to_string(status_path).unwrap(), status);
        let back = image::open(frame_path).unwrap();
        assert_eq!((back.width(), back.height()), (16, 12));
    }

    struct Counting(usize);

    impl Renderer for Counting {
        fn render(&mut self, _update: &RenderUpdate<'_>) {
            self.0 += 1;
        }
    }

    #[test]
    fn test_renderer_is_object_safe() {
        let mut c = Counting(0);
        let img = RgbImage::new(1, 1);
        let rec = record(0, 1.0);
        {
            let r: &mut dyn Renderer = &mut c;
            r.render(&RenderUpdate { frame: &img, status: "", record: &rec, records: 1, trend: None });
        }
        assert_eq!(c.0, 1);
    }
}
