//! On-segment header layout shared with the producer

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{IngestError, Result};

/// Size of the header preceding the payload region
pub const HEADER_SIZE: usize = 64;

/// Byte offset of the write cursor
pub const WRITE_CURSOR_OFFSET: usize = 0;
/// Byte offset of the payload capacity
pub const CAPACITY_OFFSET: usize = 8;
/// Byte offset of the frame stride
pub const FRAME_STRIDE_OFFSET: usize = 16;

/// Header at offset 0 of the segment
///
/// The producer owns every field. `write_cursor` is a monotonic byte count
/// published with release ordering after the frame bytes are written.
#[repr(C)]
pub struct SegmentHeader {
    /// Monotonic producer cursor in payload bytes
    pub write_cursor: AtomicU64,
    /// Payload capacity in bytes
    pub capacity: u64,
    /// Fixed frame size in bytes
    pub frame_stride: u32,
    _reserved: [u8; HEADER_SIZE - 20],
}

const _: () = assert!(std::mem::size_of::<SegmentHeader>() == HEADER_SIZE);

impl SegmentHeader {
    /// Create a fresh header for a producer
    pub fn new(capacity: u64, frame_stride: u32) -> Self {
        Self {
            write_cursor: AtomicU64::new(0),
            capacity,
            frame_stride,
            _reserved: [0; HEADER_SIZE - 20],
        }
    }

    /// Load the producer cursor with acquire ordering
    ///
    /// Pairs with the producer's release store, so frame bytes below the
    /// returned cursor are visible to this thread.
    pub fn load_write_cursor(&self) -> u64 {
        self.write_cursor.load(Ordering::Acquire)
    }

    /// Check the producer-declared geometry against the mapped size
    pub fn validate(&self, segment_size: usize) -> Result<()> {
        validate_geometry(self.capacity, self.frame_stride, segment_size)
    }
}

/// Validate a capacity/stride pair for a segment of `segment_size` bytes
pub fn validate_geometry(capacity: u64, frame_stride: u32, segment_size: usize) -> Result<()> {
    if frame_stride == 0 {
        return Err(IngestError::invalid_parameter(
            "frame_stride",
            "Frame stride must be greater than 0",
        ));
    }

    if capacity == 0 || capacity % frame_stride as u64 != 0 {
        return Err(IngestError::invalid_parameter(
            "capacity",
            format!(
                "Capacity {} must be a non-zero multiple of the frame stride {}",
                capacity, frame_stride
            ),
        ));
    }

    let required = (HEADER_SIZE as u64).saturating_add(capacity);
    if required > segment_size as u64 {
        return Err(IngestError::invalid_parameter(
            "capacity",
            format!(
                "Header plus payload ({} bytes) exceeds segment size {}",
                required, segment_size
            ),
        ));
    }

    Ok(())
}
