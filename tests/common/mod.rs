//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use spatial_ingest::{
    error::{IngestError, Result},
    pinning::{DeviceAddress, GpuDriver, HostAddress, RegisterFlags},
    ring::{RingBufferConfig, SegmentWriter, HEADER_SIZE},
};
use tempfile::TempDir;

/// Fixed offset between host and device addresses handed out by [`MockDriver`]
pub const DEVICE_OFFSET: u64 = 0x7000_0000_0000;

/// In-process stand-in for the GPU driver that counts every call
#[derive(Debug, Default)]
pub struct MockDriver {
    pub registers: AtomicUsize,
    pub unregisters: AtomicUsize,
    pub device_lookups: AtomicUsize,
    pub fail_register: AtomicBool,
    pub fail_device_pointer: AtomicBool,
    pub last_flags: Mutex<Option<RegisterFlags>>,
    registered: Mutex<HashSet<HostAddress>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let driver = Self::default();
        driver.fail_register.store(true, Ordering::SeqCst);
        driver
    }

    pub fn registers(&self) -> usize {
        self.registers.load(Ordering::SeqCst)
    }

    pub fn unregisters(&self) -> usize {
        self.unregisters.load(Ordering::SeqCst)
    }

    /// Ranges the driver currently considers registered
    pub fn live(&self) -> usize {
        self.registered.lock().unwrap().len()
    }
}

impl GpuDriver for MockDriver {
    fn register_host_memory(&self, address: HostAddress, _size: usize, flags: RegisterFlags) -> Result<()> {
        self.registers.fetch_add(1, Ordering::SeqCst);
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(IngestError::pinning_failed(address, "mock register failure"));
        }
        *self.last_flags.lock().unwrap() = Some(flags);
        self.registered.lock().unwrap().insert(address);
        Ok(())
    }

    fn device_pointer(&self, address: HostAddress) -> Result<DeviceAddress> {
        self.device_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_device_pointer.load(Ordering::SeqCst) {
            return Err(IngestError::pinning_failed(address, "mock lookup failure"));
        }
        Ok(DeviceAddress(address as u64 + DEVICE_OFFSET))
    }

    fn unregister_host_memory(&self, address: HostAddress) -> Result<()> {
        self.unregisters.fetch_add(1, Ordering::SeqCst);
        self.registered.lock().unwrap().remove(&address);
        Ok(())
    }
}

/// File-backed segment with a producer attached
pub fn file_segment(dir: &TempDir, name: &str, capacity: u64, stride: u32) -> (RingBufferConfig, SegmentWriter) {
    let config = RingBufferConfig::new(name, HEADER_SIZE + capacity as usize)
        .with_file_path(dir.path().join(name));
    let writer = SegmentWriter::create(config.clone(), capacity, stride).unwrap();
    (config, writer)
}
