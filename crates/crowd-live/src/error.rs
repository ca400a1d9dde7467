use thiserror::Error;

/// Errors that end a run. None of them end the process.
#[derive(Debug, Error)]
pub enum LiveError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("model invocation failed: {0:#}")]
    ModelInvocation(#[source] anyhow::Error),
}
