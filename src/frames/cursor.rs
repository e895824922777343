//! Per-consumer read cursor

/// Monotonic read position of one consumer, in payload bytes
///
/// Independent of every other consumer of the same segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadCursor {
    position: u64,
    frames_read: u64,
    frames_dropped: u64,
    data_loss_events: u64,
    resyncs: u64,
}

impl ReadCursor {
    /// Cursor at the start of the stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor positioned at `position`
    pub fn at(position: u64) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Current position
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Frames successfully handed out
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Frames skipped by overrun resyncs
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Number of overruns observed
    pub fn data_loss_events(&self) -> u64 {
        self.data_loss_events
    }

    /// Number of times the cursor jumped to the producer position
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    pub(crate) fn advance(&mut self, stride: u64) {
        self.position += stride;
        self.frames_read += 1;
    }

    pub(crate) fn record_loss(&mut self, dropped: u64) {
        self.frames_dropped += dropped;
        self.data_loss_events += 1;
    }

    pub(crate) fn resync(&mut self, position: u64) {
        self.position = position;
        self.resyncs += 1;
    }
}
