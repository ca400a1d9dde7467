use anyhow::Result;
use std::path::Path;
use tracing::warn;

use crate::config::SessionConfig;

/// Hard failures for bad confidence; a non-positive area only warns because
/// the estimator degrades to density 0 instead of failing.
pub fn check_session(cfg: &SessionConfig) -> Result<()> {
    cfg.validate()?;
    if !cfg.area_is_usable() {
        warn!(
            "doctor: session.visible_area={} is not positive; every density will read 0",
            cfg.visible_area
        );
    }
    Ok(())
}

pub fn check_report_dir(out_dir: &str) -> Result<()> {
    let p = Path::new(out_dir);
    if p.exists() {
        anyhow::ensure!(p.is_dir(), "report.out_dir is not a dir: {}", out_dir);
    }
    Ok(())
}
