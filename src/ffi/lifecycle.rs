//! FFI functions for the backend/instance lifecycle
//!
//! The host inference framework drives these in order:
//! `spatial_backend_create`, then per model instance
//! `spatial_instance_initialize`, any number of `spatial_instance_execute`
//! calls, `spatial_instance_finalize`, and finally `spatial_backend_destroy`.
//!
//! # Thread Safety
//! All functions are thread-safe. Batches on one instance are serialized.

use std::{
    ffi::c_char,
    path::PathBuf,
    sync::{Arc, MutexGuard},
};

use log::{debug, warn};

use crate::{
    dispatch::{Backend, ExecutionRequest, InstanceConfig, ModelLifecycle, Outcome},
    error::IngestError,
    pinning::{DeviceAddress, GpuDriver, RegistrationMode},
    ring::{RingBufferConfig, SegmentBacking},
    stylus::{DeviceDestination, PackedSamples},
};

use super::{
    types::*,
    utils::{c_str_to_string, CallbackDriver, HandleRegistry, HANDLE_REGISTRY},
};

fn lock_registry() -> Result<MutexGuard<'static, HandleRegistry>, SpatialErrorCode> {
    HANDLE_REGISTRY
        .lock()
        .map_err(|_| SpatialErrorCode::ConcurrencyError)
}

fn registration_mode(value: u32) -> Option<RegistrationMode> {
    match value {
        0 => Some(RegistrationMode::Explicit),
        1 => Some(RegistrationMode::Passthrough),
        _ => None,
    }
}

/// Initialize env_logger for hosts that do not install a logger
///
/// Safe to call more than once.
#[no_mangle]
pub extern "C" fn spatial_init_logging() {
    let _ = env_logger::try_init();
}

/// Fill `out` with the library version.
///
/// Hosts compare `major` against the header they were built with.
#[no_mangle]
pub extern "C" fn spatial_version(out: *mut SpatialVersion) -> SpatialErrorCode {
    if out.is_null() {
        return SpatialErrorCode::InvalidParameter;
    }
    unsafe {
        *out = SpatialVersion {
            major: crate::VERSION_MAJOR,
            minor: crate::VERSION_MINOR,
            patch: crate::VERSION_PATCH,
        };
    }
    SpatialErrorCode::Success
}

/// NUL-terminated version string with static lifetime; do not free.
#[no_mangle]
pub extern "C" fn spatial_version_string() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

// ============================================================================
// Backend API
// ============================================================================

/// Create the process-wide backend.
///
/// # Parameters
/// - `registration`: 0 = explicit driver registration, 1 = passthrough
/// - `driver`: driver callbacks, required for explicit registration and
///   ignored for passthrough
///
/// # Returns
/// - Valid handle on success
/// - Null pointer on failure
#[no_mangle]
pub extern "C" fn spatial_backend_create(
    registration: u32,
    driver: *const SpatialGpuDriver,
) -> SpatialBackendHandle {
    let Some(mode) = registration_mode(registration) else {
        return std::ptr::null_mut();
    };

    let driver: Option<Arc<dyn GpuDriver>> = if driver.is_null() {
        None
    } else {
        let callbacks = unsafe { &*driver };
        Some(Arc::new(CallbackDriver::new(callbacks)))
    };

    let backend = match mode {
        RegistrationMode::Passthrough => Backend::passthrough(),
        RegistrationMode::Explicit => match Backend::new(mode, driver) {
            Ok(backend) => backend,
            Err(e) => {
                warn!("spatial_backend_create: {}", e);
                return std::ptr::null_mut();
            }
        },
    };

    match lock_registry() {
        Ok(mut registry) => registry.store_backend(Arc::new(backend)) as SpatialBackendHandle,
        Err(_) => std::ptr::null_mut(),
    }
}

/// Destroy a backend.
///
/// Fails with `InvalidParameter` while instances created by it are alive.
#[no_mangle]
pub extern "C" fn spatial_backend_destroy(backend: SpatialBackendHandle) -> SpatialErrorCode {
    if backend.is_null() {
        return SpatialErrorCode::InvalidParameter;
    }

    let backend_id = backend as usize;
    let removed = {
        let mut registry = match lock_registry() {
            Ok(registry) => registry,
            Err(code) => return code,
        };
        if registry.backend_in_use(backend_id) {
            return SpatialErrorCode::InvalidParameter;
        }
        registry.remove_backend(backend_id)
    };

    match removed {
        Some(backend) => match backend.shutdown() {
            Ok(_) => SpatialErrorCode::Success,
            Err(e) => e.into(),
        },
        None => SpatialErrorCode::InvalidParameter,
    }
}

// ============================================================================
// Instance API
// ============================================================================

fn instance_config(config: &SpatialInstanceConfig) -> Result<InstanceConfig, SpatialErrorCode> {
    let name = c_str_to_string(config.name).map_err(|_| SpatialErrorCode::InvalidParameter)?;
    let segment_name =
        c_str_to_string(config.segment_name).map_err(|_| SpatialErrorCode::InvalidParameter)?;
    let file_path =
        c_str_to_string(config.file_path).map_err(|_| SpatialErrorCode::InvalidParameter)?;
    let registration =
        registration_mode(config.registration).ok_or(SpatialErrorCode::InvalidParameter)?;

    let mut ring = RingBufferConfig::default();
    if !segment_name.is_empty() {
        ring.name = segment_name;
    }
    if config.segment_size != 0 {
        ring.size = config.segment_size;
    }
    ring = match config.backing {
        0 => ring.with_backing(SegmentBacking::PosixShm),
        1 if file_path.is_empty() => ring.with_backing(SegmentBacking::FileBacked),
        1 => ring.with_file_path(PathBuf::from(file_path)),
        _ => return Err(SpatialErrorCode::InvalidParameter),
    };

    let mut instance = InstanceConfig::new(name, ring).with_registration(registration);
    if instance.name.is_empty() {
        instance.name = InstanceConfig::default().name;
    }
    Ok(instance)
}

/// Initialize a model instance: open, map and pin the LiDAR ring.
///
/// # Returns
/// - `Success` with `*out_instance` set
/// - The failing error code otherwise; nothing stays open or pinned
#[no_mangle]
pub extern "C" fn spatial_instance_initialize(
    backend: SpatialBackendHandle,
    config: *const SpatialInstanceConfig,
    out_instance: *mut SpatialInstanceHandle,
) -> SpatialErrorCode {
    if backend.is_null() || config.is_null() || out_instance.is_null() {
        return SpatialErrorCode::InvalidParameter;
    }

    let backend_id = backend as usize;
    let config = match instance_config(unsafe { &*config }) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let backend = match lock_registry() {
        Ok(registry) => match registry.get_backend(backend_id) {
            Some(backend) => backend,
            None => return SpatialErrorCode::InvalidParameter,
        },
        Err(code) => return code,
    };

    let instance = match backend.initialize(config) {
        Ok(instance) => instance,
        Err(e) => {
            warn!("spatial_instance_initialize: {}", e);
            return e.into();
        }
    };

    match lock_registry() {
        Ok(mut registry) => {
            let id = registry.store_instance(backend_id, instance);
            unsafe {
                *out_instance = id as SpatialInstanceHandle;
            }
            SpatialErrorCode::Success
        }
        Err(code) => {
            if let Err(e) = backend.finalize(instance) {
                warn!("finalizing unregistered instance: {}", e);
            }
            code
        }
    }
}

/// Execute one batch of requests.
///
/// `results` must have room for `count` entries. Every request gets its
/// own status; the call itself returns `Success` whenever the batch ran.
#[no_mangle]
pub extern "C" fn spatial_instance_execute(
    instance: SpatialInstanceHandle,
    requests: *const SpatialRequest,
    count: usize,
    results: *mut SpatialResult,
) -> SpatialErrorCode {
    if instance.is_null() || (count > 0 && (requests.is_null() || results.is_null())) {
        return SpatialErrorCode::InvalidParameter;
    }
    if count == 0 {
        return SpatialErrorCode::Success;
    }

    let requests = unsafe { std::slice::from_raw_parts(requests, count) };
    let results = unsafe { std::slice::from_raw_parts_mut(results, count) };

    let instance = match lock_registry() {
        Ok(registry) => match registry.get_instance(instance as usize) {
            Some(instance) => instance,
            None => return SpatialErrorCode::InvalidParameter,
        },
        Err(code) => return code,
    };
    let mut dispatcher = match instance.lock() {
        Ok(dispatcher) => dispatcher,
        Err(_) => return SpatialErrorCode::ConcurrencyError,
    };

    let mut batch = Vec::with_capacity(count);
    let mut positions = Vec::with_capacity(count);
    for (index, request) in requests.iter().enumerate() {
        let packed = match request.path {
            SPATIAL_PATH_LIDAR => None,
            SPATIAL_PATH_STYLUS if request.input.is_null() && request.input_len > 0 => {
                results[index] = SpatialResult::failed(SpatialErrorCode::InvalidParameter);
                continue;
            }
            SPATIAL_PATH_STYLUS => {
                let input: &[u8] = if request.input_len == 0 {
                    &[]
                } else {
                    unsafe { std::slice::from_raw_parts(request.input, request.input_len) }
                };
                match PackedSamples::new(input) {
                    Ok(packed) => Some(packed),
                    Err(e) => {
                        results[index] = SpatialResult::failed(e.into());
                        continue;
                    }
                }
            }
            _ => {
                results[index] = SpatialResult::failed(SpatialErrorCode::InvalidParameter);
                continue;
            }
        };

        let device = match request.output_device_address {
            0 => DeviceAddress(request.output as u64),
            address => DeviceAddress(address),
        };
        let destination = match unsafe {
            DeviceDestination::from_raw_parts(request.output, request.output_capacity, device)
        } {
            Ok(destination) => destination,
            Err(e) => {
                results[index] = SpatialResult::failed(e.into());
                continue;
            }
        };

        let request = match packed {
            Some(packed) => ExecutionRequest::stylus_packed(packed, destination),
            None => ExecutionRequest::lidar(destination),
        };
        batch.push(request);
        positions.push(index);
    }

    let outcome = dispatcher.execute(&mut batch);
    for (result, &index) in outcome.iter().zip(positions.iter()) {
        results[index] = match result.outcome {
            Outcome::Frame(frame) => SpatialResult {
                status: SpatialErrorCode::Success,
                count: 0,
                device_address: frame.device_address,
                length: frame.length,
                epoch: frame.epoch,
            },
            Outcome::Normalized { count } => SpatialResult {
                status: SpatialErrorCode::Success,
                count: count as u64,
                device_address: 0,
                length: 0,
                epoch: 0,
            },
            Outcome::Failed(kind) => SpatialResult::failed(kind.into()),
        };
    }

    debug!(
        "spatial_instance_execute: {} requests, {} dispatched",
        count,
        positions.len()
    );
    SpatialErrorCode::Success
}

/// Finalize an instance: release its pin, then unmap the ring.
#[no_mangle]
pub extern "C" fn spatial_instance_finalize(instance: SpatialInstanceHandle) -> SpatialErrorCode {
    if instance.is_null() {
        return SpatialErrorCode::InvalidParameter;
    }

    let (backend, instance) = {
        let mut registry = match lock_registry() {
            Ok(registry) => registry,
            Err(code) => return code,
        };
        let Some((owner, instance)) = registry.remove_instance(instance as usize) else {
            return SpatialErrorCode::InvalidParameter;
        };
        (registry.get_backend(owner), instance)
    };

    let dispatcher = match Arc::try_unwrap(instance) {
        Ok(mutex) => match mutex.into_inner() {
            Ok(dispatcher) => dispatcher,
            Err(_) => return SpatialErrorCode::ConcurrencyError,
        },
        Err(_) => {
            return IngestError::concurrency("Instance finalized while a batch is running").into()
        }
    };

    let finalized = match backend {
        Some(backend) => backend.finalize(dispatcher),
        None => dispatcher.finalize(),
    };
    match finalized {
        Ok(()) => SpatialErrorCode::Success,
        Err(e) => e.into(),
    }
}
