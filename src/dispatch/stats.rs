//! Per-instance execution counters

use crate::error::ErrorKind;

/// Counters kept by one [`super::ExecutionDispatcher`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    pub batches: u64,
    pub requests: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// LiDAR requests that found no new frame
    pub empty_reads: u64,
    pub frames_delivered: u64,
    pub data_loss_events: u64,
    pub frames_dropped: u64,
    pub stylus_samples: u64,
    pub buffer_too_small: u64,
}

impl DispatcherStats {
    pub(crate) fn record_failure(&mut self, kind: ErrorKind) {
        self.failed += 1;
        match kind {
            ErrorKind::Empty => self.empty_reads += 1,
            ErrorKind::BufferTooSmall => self.buffer_too_small += 1,
            _ => {}
        }
    }

    pub(crate) fn record_data_loss(&mut self, dropped: u64) {
        self.data_loss_events += 1;
        self.frames_dropped += dropped;
    }

    /// Fraction of requests that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            return 1.0;
        }
        self.succeeded as f64 / self.requests as f64
    }
}
