use std::sync::Arc;
use tokio::sync::watch;

/// Fires the stop request. Cloneable so a signal handler and a timer can share it.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<watch::Sender<bool>>);

/// Polled by the live loop once per iteration boundary.
#[derive(Debug, Clone)]
pub struct StopSignal(watch::Receiver<bool>);

pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle(Arc::new(tx)), StopSignal(rx))
}

impl StopHandle {
    pub fn stop(&self) {
        self.0.send_replace(true);
    }
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_sticky() {
        let (handle, sig) = stop_channel();
        assert!(!sig.is_stopped());
        let h2 = handle.clone();
        h2.stop();
        assert!(sig.is_stopped());
        drop(handle);
        drop(h2);
        assert!(sig.is_stopped());
    }
}
