//! FFI type definitions and handle types

use std::ffi::{c_char, c_void};

use crate::error::{ErrorKind, IngestError};

/// Opaque handle types for C API
pub type SpatialBackendHandle = *mut c_void;
pub type SpatialInstanceHandle = *mut c_void;

/// Library version reported by [`spatial_version`](super::lifecycle::spatial_version)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpatialVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// Error codes for C API
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialErrorCode {
    Success = 0,
    InvalidParameter = 1,
    ResourceUnavailable = 2,
    MappingFailed = 3,
    PinningFailed = 4,
    DataLoss = 5,
    BufferTooSmall = 6,
    Empty = 7,
    IoError = 8,
    ConcurrencyError = 9,
    UnknownError = 99,
}

impl From<ErrorKind> for SpatialErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::InvalidParameter => SpatialErrorCode::InvalidParameter,
            ErrorKind::ResourceUnavailable => SpatialErrorCode::ResourceUnavailable,
            ErrorKind::MappingFailed => SpatialErrorCode::MappingFailed,
            ErrorKind::PinningFailed => SpatialErrorCode::PinningFailed,
            ErrorKind::DataLoss => SpatialErrorCode::DataLoss,
            ErrorKind::BufferTooSmall => SpatialErrorCode::BufferTooSmall,
            ErrorKind::Empty => SpatialErrorCode::Empty,
            ErrorKind::Io => SpatialErrorCode::IoError,
            ErrorKind::Concurrency => SpatialErrorCode::ConcurrencyError,
        }
    }
}

impl From<IngestError> for SpatialErrorCode {
    fn from(error: IngestError) -> Self {
        error.kind().into()
    }
}

/// Instance configuration (C-compatible)
#[repr(C)]
pub struct SpatialInstanceConfig {
    pub name: *const c_char,
    pub segment_name: *const c_char,
    pub segment_size: usize,
    pub backing: u32, // 0 = POSIX shm, 1 = file-backed
    pub file_path: *const c_char,
    pub registration: u32, // 0 = explicit, 1 = passthrough
}

/// Request path selector values
pub const SPATIAL_PATH_LIDAR: u32 = 0;
pub const SPATIAL_PATH_STYLUS: u32 = 1;

/// One request of a batch (C-compatible)
#[repr(C)]
pub struct SpatialRequest {
    pub path: u32,
    /// Packed 9-byte stylus samples; unused for LiDAR
    pub input: *const u8,
    pub input_len: usize,
    /// Host-writable alias of the destination
    pub output: *mut u8,
    pub output_capacity: usize,
    /// Device address of `output`; 0 means same as the host address
    pub output_device_address: u64,
}

/// Outcome of one request (C-compatible)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SpatialResult {
    pub status: SpatialErrorCode,
    /// Stylus samples written
    pub count: u64,
    /// LiDAR frame device address
    pub device_address: u64,
    pub length: u64,
    pub epoch: u64,
}

impl SpatialResult {
    pub(crate) fn failed(status: SpatialErrorCode) -> Self {
        Self {
            status,
            count: 0,
            device_address: 0,
            length: 0,
            epoch: 0,
        }
    }
}

/// GPU driver callbacks (C-compatible); each returns 0 on success
#[repr(C)]
pub struct SpatialGpuDriver {
    pub context: *mut c_void,
    pub register_host_memory:
        extern "C" fn(context: *mut c_void, address: *mut c_void, size: usize, flags: u32) -> i32,
    pub get_device_pointer:
        extern "C" fn(context: *mut c_void, address: *mut c_void, device: *mut u64) -> i32,
    pub unregister_host_memory: extern "C" fn(context: *mut c_void, address: *mut c_void) -> i32,
}
