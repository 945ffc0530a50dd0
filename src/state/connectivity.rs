use std::sync::atomic::{AtomicBool, Ordering};

/// Whether the last communication with the remote server succeeded.
///
/// Written by several workers. A write that does not change the value is a
/// no-op, so repeated identical outcomes never log or flap.
#[derive(Debug)]
pub struct ConnectivityState {
    connected: AtomicBool,
}

impl ConnectivityState {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Set the flag; returns `true` only if this call changed it.
    pub fn set(&self, connected: bool, reporter: &str) -> bool {
        let previous = self.connected.swap(connected, Ordering::AcqRel);
        if previous == connected {
            return false;
        }

        if connected {
            tracing::info!("✓ Server connection restored ({reporter})");
        } else {
            tracing::warn!("Server connection lost ({reporter}), pausing outbound stream");
        }
        true
    }
}

impl Default for ConnectivityState {
    fn default() -> Self {
        Self::new(true)
    }
}
