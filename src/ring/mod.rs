//! Producer-owned circular buffer segment, mapped read-only
//!
//! Layout of the segment:
//!
//! ```text
//! 0        8          16            20          64                  64+capacity
//! ┌────────┬──────────┬─────────────┬───────────┬───────────────────┐
//! │ write  │ capacity │ frame_stride│ reserved  │ payload (frames)  │
//! │ cursor │   u64    │    u32      │           │                   │
//! └────────┴──────────┴─────────────┴───────────┴───────────────────┘
//! ```

pub mod config;
pub mod handle;
pub mod header;
pub mod producer;

pub use config::{RingBufferConfig, SegmentBacking};
pub use handle::{RingBufferHandle, RingGeometry};
pub use header::{SegmentHeader, HEADER_SIZE};
pub use producer::SegmentWriter;
