//! FFI utilities and handle management

use std::{
    collections::HashMap,
    ffi::{c_char, c_void, CStr},
    sync::{Arc, Mutex},
};

use crate::{
    dispatch::{Backend, ExecutionDispatcher},
    error::{IngestError, Result},
    pinning::{DeviceAddress, GpuDriver, HostAddress, RegisterFlags},
};

use super::types::SpatialGpuDriver;

// Global handle management
lazy_static::lazy_static! {
    pub static ref HANDLE_REGISTRY: Mutex<HandleRegistry> = Mutex::new(HandleRegistry::new());
}

pub struct HandleRegistry {
    pub backends: HashMap<usize, Arc<Backend>>,
    pub instances: HashMap<usize, Arc<Mutex<ExecutionDispatcher>>>,
    /// Instance id to the backend that created it
    pub owners: HashMap<usize, usize>,
    pub next_id: usize,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            instances: HashMap::new(),
            owners: HashMap::new(),
            next_id: 1,
        }
    }

    fn next_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn store_backend(&mut self, backend: Arc<Backend>) -> usize {
        let id = self.next_id();
        self.backends.insert(id, backend);
        id
    }

    pub fn get_backend(&self, id: usize) -> Option<Arc<Backend>> {
        self.backends.get(&id).cloned()
    }

    pub fn remove_backend(&mut self, id: usize) -> Option<Arc<Backend>> {
        self.backends.remove(&id)
    }

    pub fn store_instance(&mut self, backend_id: usize, instance: ExecutionDispatcher) -> usize {
        let id = self.next_id();
        self.instances.insert(id, Arc::new(Mutex::new(instance)));
        self.owners.insert(id, backend_id);
        id
    }

    pub fn get_instance(&self, id: usize) -> Option<Arc<Mutex<ExecutionDispatcher>>> {
        self.instances.get(&id).cloned()
    }

    pub fn remove_instance(&mut self, id: usize) -> Option<(usize, Arc<Mutex<ExecutionDispatcher>>)> {
        let instance = self.instances.remove(&id)?;
        let owner = self.owners.remove(&id).unwrap_or(0);
        Some((owner, instance))
    }

    /// Whether any instance created by `backend_id` is still alive
    pub fn backend_in_use(&self, backend_id: usize) -> bool {
        self.owners.values().any(|&owner| owner == backend_id)
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert C string to Rust String
pub fn c_str_to_string(c_str: *const c_char) -> std::result::Result<String, Box<dyn std::error::Error>> {
    if c_str.is_null() {
        return Ok(String::new());
    }

    unsafe {
        CStr::from_ptr(c_str)
            .to_str()
            .map(|s| s.to_owned())
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
    }
}

/// [`GpuDriver`] over C callbacks supplied by the host
pub struct CallbackDriver {
    context: *mut c_void,
    register: extern "C" fn(*mut c_void, *mut c_void, usize, u32) -> i32,
    device_pointer: extern "C" fn(*mut c_void, *mut c_void, *mut u64) -> i32,
    unregister: extern "C" fn(*mut c_void, *mut c_void) -> i32,
}

// The host guarantees its driver context is usable from any thread
unsafe impl Send for CallbackDriver {}
unsafe impl Sync for CallbackDriver {}

impl std::fmt::Debug for CallbackDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackDriver")
            .field("context", &self.context)
            .finish()
    }
}

impl CallbackDriver {
    pub fn new(driver: &SpatialGpuDriver) -> Self {
        Self {
            context: driver.context,
            register: driver.register_host_memory,
            device_pointer: driver.get_device_pointer,
            unregister: driver.unregister_host_memory,
        }
    }
}

impl GpuDriver for CallbackDriver {
    fn register_host_memory(&self, address: HostAddress, size: usize, flags: RegisterFlags) -> Result<()> {
        match (self.register)(self.context, address as *mut c_void, size, flags.bits()) {
            0 => Ok(()),
            status => Err(IngestError::pinning_failed(
                address,
                format!("register_host_memory returned {}", status),
            )),
        }
    }

    fn device_pointer(&self, address: HostAddress) -> Result<DeviceAddress> {
        let mut device = 0u64;
        match (self.device_pointer)(self.context, address as *mut c_void, &mut device) {
            0 => Ok(DeviceAddress(device)),
            status => Err(IngestError::pinning_failed(
                address,
                format!("get_device_pointer returned {}", status),
            )),
        }
    }

    fn unregister_host_memory(&self, address: HostAddress) -> Result<()> {
        match (self.unregister)(self.context, address as *mut c_void) {
            0 => Ok(()),
            status => Err(IngestError::pinning_failed(
                address,
                format!("unregister_host_memory returned {}", status),
            )),
        }
    }
}
