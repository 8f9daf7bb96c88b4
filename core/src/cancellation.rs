//! Cancellation handle for I/O-suspending work: every I/O call receives a
//! cancellation handle propagated from the request. On cancellation the
//! partial result is discarded and no persistence writes are attempted past
//! the last successful one.
//!
//! Built on `tokio::sync::watch` rather than `tokio_util::sync::
//! CancellationToken`, since the core pulls in `tokio` for little beyond its
//! sync primitives and the `#[tokio::test]` harness.

use tokio::sync::watch;

#[derive(Clone)]
pub struct CancellationSignal {
    rx: watch::Receiver<bool>,
}

impl CancellationSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// A signal that never fires, for callers that don't need cancellation
    /// (e.g. the pure in-memory test harness).
    pub fn never() -> Self {
        CancellationHandle::new().1
    }
}

pub struct CancellationHandle {
    tx: watch::Sender<bool>,
}

impl CancellationHandle {
    pub fn new() -> (Self, CancellationSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancellationSignal { rx })
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_observes_cancel() {
        let (handle, signal) = CancellationHandle::new();
        assert!(!signal.is_cancelled());
        handle.cancel();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn never_signal_stays_alive() {
        let signal = CancellationSignal::never();
        assert!(!signal.is_cancelled());
    }
}
