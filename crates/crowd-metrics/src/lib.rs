pub mod config;
pub mod density;
pub mod doctor;
pub mod report;
pub mod session;

pub use config::{ConfigError, SessionConfig};
pub use density::{estimate, Estimate, Tier};
pub use report::{build_report, Report, ReportSummary};
pub use session::{DensityRecord, SessionLog};
