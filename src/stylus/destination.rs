//! Caller-supplied output region in device-visible memory

use std::{marker::PhantomData, ptr::NonNull};

use crate::{
    error::{IngestError, Result},
    pinning::DeviceAddress,
};

/// Bounds-checked, host-writable view of a device-visible destination
///
/// The host framework owns the memory; this crate never allocates it.
#[derive(Debug)]
pub struct DeviceDestination<'a> {
    ptr: NonNull<u8>,
    capacity: usize,
    device_address: DeviceAddress,
    _marker: PhantomData<&'a mut [u8]>,
}

unsafe impl Send for DeviceDestination<'_> {}

impl<'a> DeviceDestination<'a> {
    /// Destination over host memory that the device addresses directly
    pub fn from_slice(buffer: &'a mut [u8]) -> Self {
        let device_address = DeviceAddress(buffer.as_mut_ptr() as u64);
        Self {
            ptr: NonNull::from(&mut *buffer).cast(),
            capacity: buffer.len(),
            device_address,
            _marker: PhantomData,
        }
    }

    /// Destination from raw parts handed over by the host framework
    ///
    /// # Safety
    /// `host_ptr` must be writable for `capacity` bytes for `'a`, with no
    /// other access while this value lives, and must alias the device memory
    /// at `device_address`.
    pub unsafe fn from_raw_parts(
        host_ptr: *mut u8,
        capacity: usize,
        device_address: DeviceAddress,
    ) -> Result<Self> {
        let ptr = NonNull::new(host_ptr).ok_or_else(|| {
            IngestError::invalid_parameter("destination", "Null destination pointer")
        })?;
        Ok(Self {
            ptr,
            capacity,
            device_address,
            _marker: PhantomData,
        })
    }

    /// Capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Device-side address of the first byte
    pub fn device_address(&self) -> DeviceAddress {
        self.device_address
    }

    /// Store `value` at byte `offset` without alignment requirements
    pub(crate) fn write_unaligned<T: Copy>(&mut self, offset: usize, value: T) -> Result<()> {
        let end = offset.checked_add(std::mem::size_of::<T>()).ok_or_else(|| {
            IngestError::buffer_too_small(usize::MAX, self.capacity)
        })?;
        if end > self.capacity {
            return Err(IngestError::buffer_too_small(end, self.capacity));
        }
        // SAFETY: [offset, end) is inside the destination
        unsafe {
            std::ptr::write_unaligned(self.ptr.as_ptr().add(offset) as *mut T, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_checked_write() {
        let mut storage = [0u8; 8];
        let mut dest = DeviceDestination::from_slice(&mut storage);
        assert_eq!(dest.capacity(), 8);
        dest.write_unaligned(1, 0xABCD_u16).unwrap();
        assert!(dest.write_unaligned(6, 0u32).is_err());
        drop(dest);
        assert_eq!(u16::from_ne_bytes([storage[1], storage[2]]), 0xABCD);
    }

    #[test]
    fn test_null_raw_parts_rejected() {
        let result = unsafe {
            DeviceDestination::from_raw_parts(std::ptr::null_mut(), 16, DeviceAddress(0))
        };
        assert!(result.is_err());
    }
}
