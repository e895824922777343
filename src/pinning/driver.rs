//! GPU driver interface for host-memory registration

use std::fmt;

use bitflags::bitflags;

use crate::error::Result;

/// Host virtual address
pub type HostAddress = usize;

/// Address meaningful in the device's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress(pub u64);

impl DeviceAddress {
    /// Address `offset` bytes past this one
    pub fn offset(self, offset: u64) -> Self {
        DeviceAddress(self.0 + offset)
    }

    /// Raw numeric value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

bitflags! {
    /// Flags passed to [`GpuDriver::register_host_memory`]
    ///
    /// Values follow the CUDA runtime's `cudaHostRegister*` constants.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RegisterFlags: u32 {
        const PORTABLE = 0x01;
        const MAPPED = 0x02;
        const IO_MEMORY = 0x04;
        const READ_ONLY = 0x08;
    }
}

/// Driver calls consumed by explicit registration
///
/// Implemented by the embedding application over its GPU runtime.
pub trait GpuDriver: Send + Sync + fmt::Debug {
    /// Page-lock `size` bytes at `address` and make them device-visible
    fn register_host_memory(
        &self,
        address: HostAddress,
        size: usize,
        flags: RegisterFlags,
    ) -> Result<()>;

    /// Device pointer for a registered host address
    fn device_pointer(&self, address: HostAddress) -> Result<DeviceAddress>;

    /// Undo a previous registration
    fn unregister_host_memory(&self, address: HostAddress) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let flags = RegisterFlags::MAPPED | RegisterFlags::READ_ONLY;
        assert_eq!(flags.bits(), 0x0a);
        assert!(flags.contains(RegisterFlags::MAPPED));
        assert!(!flags.contains(RegisterFlags::PORTABLE));
        assert_eq!(RegisterFlags::default().bits(), 0);
        assert_eq!(
            RegisterFlags::from_bits(0x0a),
            Some(RegisterFlags::MAPPED | RegisterFlags::READ_ONLY)
        );
        assert_eq!(RegisterFlags::from_bits(0x10), None);
    }

    #[test]
    fn test_device_address_offset() {
        let base = DeviceAddress(0x7f00_0000);
        assert_eq!(base.offset(0x40), DeviceAddress(0x7f00_0040));
        assert_eq!(format!("{}", base), "0x7f000000");
    }
}
