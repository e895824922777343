//! Process-wide, reference-counted cache of device registrations

use std::{
    collections::HashMap,
    sync::{atomic::Ordering, Arc, Mutex, MutexGuard},
};

use log::{debug, info, warn};

use crate::error::{IngestError, Result};

use super::{
    driver::{DeviceAddress, GpuDriver, HostAddress},
    stats::{RegistryStats, RegistryStatsSnapshot},
    strategy::{strategy_for, DeviceRegistration, RegistrationMode},
};

/// Lifecycle of a pinned region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState {
    Unpinned,
    Pinning,
    Pinned,
    Unpinning,
}

/// One registered host range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedRegion {
    pub host_address: HostAddress,
    pub size: usize,
    /// Only meaningful while `state` is `Pinned`
    pub device_address: Option<DeviceAddress>,
    pub refcount: usize,
    pub state: PinState,
}

impl PinnedRegion {
    fn contains(&self, address: HostAddress) -> bool {
        address >= self.host_address && address < self.host_address + self.size
    }
}

/// Shared registry of pinned host ranges
///
/// Pinning is a driver round-trip that rewrites GPU page tables, so each
/// host address is registered once and shared by refcount until the last
/// holder releases it. Every mutation happens under one mutex, including the
/// driver calls, which serializes concurrent instances.
#[derive(Debug)]
pub struct PinnedMemoryRegistry {
    strategy: Box<dyn DeviceRegistration>,
    regions: Mutex<HashMap<HostAddress, PinnedRegion>>,
    stats: RegistryStats,
}

impl PinnedMemoryRegistry {
    /// Create a registry over an explicit strategy
    pub fn new(strategy: Box<dyn DeviceRegistration>) -> Self {
        info!("pinned memory registry using {} registration", strategy.name());
        Self {
            strategy,
            regions: Mutex::new(HashMap::new()),
            stats: RegistryStats::new(),
        }
    }

    /// Create a registry for the configured mode
    pub fn for_mode(mode: RegistrationMode, driver: Option<Arc<dyn GpuDriver>>) -> Result<Self> {
        Ok(Self::new(strategy_for(mode, driver)?))
    }

    /// Pin `size` bytes at `host_address`, or reuse the existing pin
    pub fn acquire_pin(&self, host_address: HostAddress, size: usize) -> Result<DeviceAddress> {
        if host_address == 0 || size == 0 {
            return Err(IngestError::invalid_parameter(
                "host_address",
                "Cannot pin a null or empty range",
            ));
        }

        let mut regions = self.regions.lock()?;

        if let Some(region) = regions.get_mut(&host_address) {
            if size > region.size {
                return Err(IngestError::invalid_parameter(
                    "size",
                    format!(
                        "{:#x} is pinned with {} bytes, requested {}",
                        host_address, region.size, size
                    ),
                ));
            }
            let device = region.device_address.ok_or_else(|| {
                IngestError::pinning_failed(host_address, "Cached region has no device address")
            })?;
            region.refcount += 1;
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!("pin hit {:#x} (refcount {})", host_address, region.refcount);
            return Ok(device);
        }

        regions.insert(
            host_address,
            PinnedRegion {
                host_address,
                size,
                device_address: None,
                refcount: 0,
                state: PinState::Pinning,
            },
        );

        match self.strategy.register(host_address, size) {
            Ok(device) => {
                if let Some(region) = regions.get_mut(&host_address) {
                    region.device_address = Some(device);
                    region.refcount = 1;
                    region.state = PinState::Pinned;
                }
                self.stats.registrations.fetch_add(1, Ordering::Relaxed);
                info!(
                    "pinned {} bytes at {:#x} -> device {}",
                    size, host_address, device
                );
                Ok(device)
            }
            Err(e) => {
                regions.remove(&host_address);
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!("pinning {:#x} failed: {}", host_address, e);
                Err(IngestError::pinning_failed(host_address, e.to_string()))
            }
        }
    }

    /// Drop one reference; the last one unregisters and evicts the entry
    pub fn release_pin(&self, host_address: HostAddress) -> Result<()> {
        let mut regions = self.regions.lock()?;

        let region = regions.get_mut(&host_address).ok_or_else(|| {
            IngestError::invalid_parameter(
                "host_address",
                format!("{:#x} is not pinned", host_address),
            )
        })?;

        region.refcount = region.refcount.saturating_sub(1);
        if region.refcount > 0 {
            debug!("pin release {:#x} (refcount {})", host_address, region.refcount);
            return Ok(());
        }

        region.state = PinState::Unpinning;
        region.device_address = None;
        let result = self.strategy.unregister(host_address);
        regions.remove(&host_address);

        match result {
            Ok(()) => {
                self.stats.unregistrations.fetch_add(1, Ordering::Relaxed);
                info!("unpinned {:#x}", host_address);
                Ok(())
            }
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!("unpinning {:#x} failed: {}", host_address, e);
                Err(IngestError::pinning_failed(host_address, e.to_string()))
            }
        }
    }

    /// Unregister every entry regardless of refcount
    ///
    /// Returns how many regions were torn down. The first driver error is
    /// returned after all entries have been evicted.
    pub fn teardown(&self) -> Result<usize> {
        let mut regions = self.regions.lock()?;
        let mut first_error = None;
        let count = regions.len();

        for (address, region) in regions.drain() {
            if region.refcount > 0 {
                warn!(
                    "tearing down {:#x} with {} outstanding references",
                    address, region.refcount
                );
            }
            match self.strategy.unregister(address) {
                Ok(()) => {
                    self.stats.unregistrations.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    if first_error.is_none() {
                        first_error = Some(IngestError::pinning_failed(address, e.to_string()));
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    // Read-only accessors report a poisoned lock as "nothing pinned"
    fn inspect(&self) -> Option<MutexGuard<'_, HashMap<HostAddress, PinnedRegion>>> {
        match self.regions.lock() {
            Ok(regions) => Some(regions),
            Err(_) => {
                warn!("pinned memory registry lock poisoned");
                None
            }
        }
    }

    /// Current state of `host_address`
    pub fn state(&self, host_address: HostAddress) -> PinState {
        self.inspect()
            .and_then(|r| r.get(&host_address).map(|region| region.state))
            .unwrap_or(PinState::Unpinned)
    }

    /// Reference count of `host_address`, 0 when not pinned
    pub fn refcount(&self, host_address: HostAddress) -> usize {
        self.inspect()
            .and_then(|r| r.get(&host_address).map(|region| region.refcount))
            .unwrap_or(0)
    }

    /// Device address of the region registered at exactly `host_address`
    ///
    /// `None` unless the region is `Pinned`.
    pub fn device_address(&self, host_address: HostAddress) -> Option<DeviceAddress> {
        let regions = self.inspect()?;
        let region = regions.get(&host_address)?;
        match region.state {
            PinState::Pinned => region.device_address,
            _ => None,
        }
    }

    /// Device address for any host address inside a pinned range
    pub fn translate(&self, host_address: HostAddress) -> Option<DeviceAddress> {
        let regions = self.inspect()?;
        regions
            .values()
            .find(|region| region.state == PinState::Pinned && region.contains(host_address))
            .and_then(|region| {
                region
                    .device_address
                    .map(|d| d.offset((host_address - region.host_address) as u64))
            })
    }

    /// Copy of one entry
    pub fn region(&self, host_address: HostAddress) -> Option<PinnedRegion> {
        self.inspect()?.get(&host_address).cloned()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.inspect().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether no entries are live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the active registration strategy
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Counter snapshot
    pub fn stats(&self) -> RegistryStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pinning::strategy::Passthrough;

    #[test]
    fn test_refcounted_passthrough() {
        let registry = PinnedMemoryRegistry::new(Box::new(Passthrough));

        let d1 = registry.acquire_pin(0x10000, 4096).unwrap();
        let d2 = registry.acquire_pin(0x10000, 4096).unwrap();
        assert_eq!(d1, d2);
        assert_eq!(registry.refcount(0x10000), 2);
        assert_eq!(registry.state(0x10000), PinState::Pinned);
        assert_eq!(registry.translate(0x10010), Some(DeviceAddress(0x10010)));
        assert_eq!(registry.translate(0x20000), None);

        registry.release_pin(0x10000).unwrap();
        assert_eq!(registry.state(0x10000), PinState::Pinned);
        registry.release_pin(0x10000).unwrap();
        assert_eq!(registry.state(0x10000), PinState::Unpinned);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_release_unknown_address() {
        let registry = PinnedMemoryRegistry::new(Box::new(Passthrough));
        let err = registry.release_pin(0x4000).unwrap_err();
        assert!(matches!(err, IngestError::InvalidParameter { .. }));
    }

    #[test]
    fn test_reacquire_with_larger_size_rejected() {
        let registry = PinnedMemoryRegistry::new(Box::new(Passthrough));
        registry.acquire_pin(0x8000, 1024).unwrap();
        assert!(registry.acquire_pin(0x8000, 2048).is_err());
        assert!(registry.acquire_pin(0x8000, 512).is_ok());
        assert_eq!(registry.refcount(0x8000), 2);
    }

    #[test]
    fn test_null_range_rejected() {
        let registry = PinnedMemoryRegistry::new(Box::new(Passthrough));
        assert!(registry.acquire_pin(0, 4096).is_err());
        assert!(registry.acquire_pin(0x1000, 0).is_err());
    }

    #[derive(Debug)]
    struct PanickingRegistration;

    impl DeviceRegistration for PanickingRegistration {
        fn register(&self, _address: HostAddress, _size: usize) -> Result<DeviceAddress> {
            panic!("driver crashed");
        }

        fn unregister(&self, _address: HostAddress) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    #[test]
    fn test_poisoned_lock_surfaces_on_mutation() {
        let registry = Arc::new(PinnedMemoryRegistry::new(Box::new(PanickingRegistration)));

        let worker = Arc::clone(&registry);
        assert!(std::thread::spawn(move || worker.acquire_pin(0x1000, 64))
            .join()
            .is_err());

        let err = registry.acquire_pin(0x2000, 64).unwrap_err();
        assert!(matches!(err, IngestError::Concurrency { .. }));
        assert!(registry.release_pin(0x1000).is_err());
        assert_eq!(registry.state(0x1000), PinState::Unpinned);
        assert_eq!(registry.device_address(0x1000), None);
    }
}
