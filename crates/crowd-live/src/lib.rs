pub mod controller;
pub mod error;
pub mod render;
pub mod signal;

pub use controller::{LiveLoop, LoopSettings, LoopState, RunSummary, StopReason};
pub use error::LiveError;
pub use render::{ConsoleRenderer, RenderUpdate, Renderer};
pub use signal::{stop_channel, StopHandle, StopSignal};
