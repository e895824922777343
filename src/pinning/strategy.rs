//! Device-visible memory registration strategies

use std::{fmt, sync::Arc};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

use super::driver::{DeviceAddress, GpuDriver, HostAddress, RegisterFlags};

/// Which registration strategy an instance uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationMode {
    /// Discrete GPU: register through the driver and query the device pointer
    Explicit,
    /// Unified memory: host addresses are already device-visible
    Passthrough,
}

impl Default for RegistrationMode {
    fn default() -> Self {
        Self::Explicit
    }
}

/// Capability to make a host range device-visible
pub trait DeviceRegistration: Send + Sync + fmt::Debug {
    /// Register a range and return its device address
    fn register(&self, address: HostAddress, size: usize) -> Result<DeviceAddress>;

    /// Undo [`DeviceRegistration::register`]
    fn unregister(&self, address: HostAddress) -> Result<()>;

    /// Strategy name for logs
    fn name(&self) -> &'static str;
}

/// Registration through the GPU driver
#[derive(Debug)]
pub struct ExplicitRegistration {
    driver: Arc<dyn GpuDriver>,
    flags: RegisterFlags,
}

impl ExplicitRegistration {
    /// Register read-only, mapped memory through `driver`
    pub fn new(driver: Arc<dyn GpuDriver>) -> Self {
        Self {
            driver,
            flags: RegisterFlags::MAPPED | RegisterFlags::READ_ONLY,
        }
    }

    /// Override the registration flags
    pub fn with_flags(mut self, flags: RegisterFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl DeviceRegistration for ExplicitRegistration {
    fn register(&self, address: HostAddress, size: usize) -> Result<DeviceAddress> {
        self.driver.register_host_memory(address, size, self.flags)?;

        match self.driver.device_pointer(address) {
            Ok(device) => Ok(device),
            Err(e) => {
                // Leave nothing registered behind a failed pin
                if let Err(undo) = self.driver.unregister_host_memory(address) {
                    warn!("rollback of registration at {:#x} failed: {}", address, undo);
                }
                Err(e)
            }
        }
    }

    fn unregister(&self, address: HostAddress) -> Result<()> {
        self.driver.unregister_host_memory(address)
    }

    fn name(&self) -> &'static str {
        "explicit"
    }
}

/// Identity mapping for unified-memory platforms
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl DeviceRegistration for Passthrough {
    fn register(&self, address: HostAddress, _size: usize) -> Result<DeviceAddress> {
        Ok(DeviceAddress(address as u64))
    }

    fn unregister(&self, _address: HostAddress) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}

/// Build the strategy selected by `mode`
pub fn strategy_for(
    mode: RegistrationMode,
    driver: Option<Arc<dyn GpuDriver>>,
) -> Result<Box<dyn DeviceRegistration>> {
    match mode {
        RegistrationMode::Explicit => {
            let driver = driver.ok_or_else(|| {
                IngestError::invalid_parameter(
                    "registration",
                    "Explicit registration requires a GPU driver",
                )
            })?;
            Ok(Box::new(ExplicitRegistration::new(driver)))
        }
        RegistrationMode::Passthrough => Ok(Box::new(Passthrough)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_is_identity() {
        let strategy = Passthrough;
        assert_eq!(strategy.register(0x1000, 64).unwrap(), DeviceAddress(0x1000));
        assert!(strategy.unregister(0x1000).is_ok());
    }

    #[test]
    fn test_explicit_requires_driver() {
        assert!(strategy_for(RegistrationMode::Explicit, None).is_err());
        let strategy = strategy_for(RegistrationMode::Passthrough, None).unwrap();
        assert_eq!(strategy.name(), "passthrough");
    }
}
