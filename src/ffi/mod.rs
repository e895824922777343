//! C Foreign Function Interface (FFI) for inference-server integration
//!
//! Exposes the backend/instance lifecycle to a C or C++ host framework,
//! organized into logical submodules.

pub mod lifecycle;
pub mod types;
pub mod utils;

// Re-export commonly used types and functions
pub use types::{
    SpatialBackendHandle, SpatialErrorCode, SpatialGpuDriver, SpatialInstanceConfig,
    SpatialInstanceHandle, SpatialRequest, SpatialResult, SpatialVersion, SPATIAL_PATH_LIDAR,
    SPATIAL_PATH_STYLUS,
};

pub use utils::{CallbackDriver, HANDLE_REGISTRY};

// Lifecycle API
pub use lifecycle::{
    spatial_backend_create, spatial_backend_destroy, spatial_init_logging,
    spatial_instance_execute, spatial_instance_finalize, spatial_instance_initialize,
    spatial_version, spatial_version_string,
};
