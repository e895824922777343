//! # Spatial Ingest - Zero-Copy Sensor Ingestion for GPU Inference
//!
//! Spatial Ingest moves LiDAR frames and stylus samples into device-visible
//! memory for an inference backend without copying frame data on the host.
//!
//! ## Features
//!
//! - **Shared-memory ring reader**: POSIX shm or file-backed segment written
//!   by an external producer, read with acquire ordering
//! - **Pinned memory registry**: refcounted driver registration with an
//!   explicit or passthrough strategy
//! - **Lap detection**: data loss is reported and the reader resyncs
//! - **Stylus normalization**: raw integer samples to a dense `f32` layout
//! - **C API**: backend/instance lifecycle for a C++ inference server
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────┐        ┌──────────────────────────┐
//! │  LiDAR producer (ext) │        │  Stylus tensor (request) │
//! └──────────┬────────────┘        └────────────┬─────────────┘
//!            │ shm ring                          │
//!            ▼                                   ▼
//! ┌───────────────────────┐        ┌──────────────────────────┐
//! │ RingBufferHandle      │        │ StylusPreprocessor       │
//! │ PinnedMemoryRegistry  │        │                          │
//! │ FrameReader           │        │                          │
//! └──────────┬────────────┘        └────────────┬─────────────┘
//!            └──────────────┬───────────────────┘
//!                           ▼
//!               ┌───────────────────────┐
//!               │  ExecutionDispatcher  │
//!               └───────────────────────┘
//! ```

// Core modules
pub mod error;
pub mod ring;
pub mod pinning;
pub mod frames;
pub mod stylus;
pub mod dispatch;

#[cfg(feature = "c-api")]
pub mod ffi;

// Main API re-exports
pub use error::{ErrorKind, IngestError, Result};
pub use ring::{RingBufferConfig, RingBufferHandle, SegmentBacking, SegmentHeader, SegmentWriter};
pub use pinning::{
    DeviceAddress, DeviceRegistration, ExplicitRegistration, GpuDriver, HostAddress,
    Passthrough, PinState, PinnedMemoryRegistry, RegisterFlags, RegistrationMode,
};
pub use frames::{FrameRead, FrameReader, FrameView, ReadCursor};
pub use stylus::{
    DeviceDestination, NormalizedSample, PackedSamples, RawStylusSample, StylusPreprocessor,
};
pub use dispatch::{
    Backend, BatchResult, DeviceFrame, ExecutionDispatcher, ExecutionRequest, ExecutionResult,
    InstanceConfig, ModelLifecycle, Outcome,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;

/// Default configuration constants
pub mod config {
    /// Shared-memory name of the LiDAR ring
    pub const DEFAULT_SEGMENT_NAME: &str = "/lidar_circular_buffer";

    /// Total segment size including the header (16 MiB)
    pub const DEFAULT_SEGMENT_SIZE: usize = 16 * 1024 * 1024;

    /// Frame stride used by the simulated producer
    pub const DEFAULT_FRAME_STRIDE: u32 = 64 * 1024;
}
