use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::info;

use crate::session::DensityRecord;

pub const CSV_HEADER: &str = "timestamp,personas,densidad_pers_m2";

/// Scale applied to density when plotted next to the person count.
pub const CHART_DENSITY_SCALE: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportSummary {
    pub records: usize,
    pub mean_density: f64,
    pub max_density: f64,
    pub mean_persons: f64,
}

/// End-of-run artifact: summary statistics plus the CSV export.
#[derive(Debug, Clone)]
pub struct Report {
    pub summary: ReportSummary,
    pub filename: String,
    pub csv: String,
    pub persons_series: Vec<f64>,
    pub density_series: Vec<f64>,
}

/// Builds the report for a stopped run. Returns `None` for an empty log.
pub fn build_report(log: &[DensityRecord], generated_at: OffsetDateTime) -> Option<Report> {
    let summary = summarize(log)?;
    Some(Report {
        summary,
        filename: report_filename(generated_at),
        csv: to_csv(log),
        persons_series: log.iter().map(|r| r.person_count as f64).collect(),
        density_series: log.iter().map(|r| r.density * CHART_DENSITY_SCALE).collect(),
    })
}

pub fn summarize(log: &[DensityRecord]) -> Option<ReportSummary> {
    if log.is_empty() {
        return None;
    }
    let n = log.len() as f64;
    let sum_density: f64 = log.iter().map(|r| r.density).sum();
    let sum_persons: f64 = log.iter().map(|r| r.person_count as f64).sum();
    let max_density = log.iter().map(|r| r.density).fold(f64::NEG_INFINITY, f64::max);
    Some(ReportSummary {
        records: log.len(),
        mean_density: sum_density / n,
        max_density,
        mean_persons: sum_persons / n,
    })
}

/// `conteo_carnaval_<YYYYMMDD_HHMM>.csv`
pub fn report_filename(at: OffsetDateTime) -> String {
    let fmt = format_description!("[year][month][day]_[hour][minute]");
    let stamp = at.format(&fmt).unwrap_or_else(|_| at.unix_timestamp().to_string());
    format!("conteo_carnaval_{}.csv", stamp)
}

pub fn to_csv(log: &[DensityRecord]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + log.len() * 24);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for r in log {
        // density keeps 3 decimals in the export
        let _ = writeln!(out, "{},{},{:.3}", r.clock(), r.person_count, r.density);
    }
    out
}

impl Report {
    /// Writes the CSV under `dir` and returns its path. Does not touch the log.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).with_context(|| format!("create report dir {}", dir.display()))?;
        let path = dir.join(&self.filename);
        std::fs::write(&path, self.csv.as_bytes())
            .with_context(|| format!("write report {}", path.display()))?;
        info!("report: wrote {} records to {}", self.summary.records, path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn log_of(counts: &[u32], area: f64) -> Vec<DensityRecord> {
        let start = datetime!(2026-02-14 21:05:00 UTC);
        counts
            .iter()
            .enumerate()
            .map(|(i, c)| DensityRecord::new(start + time::Duration::seconds(i as i64), *c, area))
            .collect()
    }

    #[test]
    fn test_empty_log_has_no_report() {
        assert!(build_report(&[], datetime!(2026-02-14 21:05:00 UTC)).is_none());
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn test_summary_stats() {
        let log = log_of(&[2, 4, 6], 2.0);
        let s = summarize(&log).unwrap();
        assert_eq!(s.records, 3);
        assert!((s.mean_density - 2.0).abs() < 1e-12);
        assert!((s.max_density - 3.0).abs() < 1e-12);
        assert!((s.mean_persons - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_csv_layout() {
        let log = log_of(&[1, 0], 3.0);
        let csv = to_csv(&log);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "timestamp,personas,densidad_pers_m2");
        assert_eq!(lines[1], "21:05:00,1,0.333");
        assert_eq!(lines[2], "21:05:01,0,0.000");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_filename_pattern() {
        let name = report_filename(datetime!(2026-02-14 21:05:59 UTC));
        assert_eq!(name, "conteo_carnaval_20260214_2105.csv");
    }

    #[test]
    fn test_chart_series_scaled() {
        let log = log_of(&[2, 4], 2.0);
        let r = build_report(&log, datetime!(2026-02-14 21:06:00 UTC)).unwrap();
        assert_eq!(r.persons_series, vec![2.0, 4.0]);
        assert_eq!(r.density_series, vec![20.0, 40.0]);
    }

    #[test]
    fn test_write_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log = log_of(&[5, 7], 10.0);
        let r = build_report(&log, datetime!(2026-02-14 21:06:00 UTC)).unwrap();
        let path = r.write_to(&dir.path().join("out")).unwrap();
        assert!(path.ends_with("conteo_carnaval_20260214_2106.csv"));
        let body = std::fs::read_to_string(path).unwrap();
        assert_eq!(body, r.csv);
        assert_eq!(log.len(), 2);
    }
}
