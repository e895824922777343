//! Pinned (device-visible) host memory registration
//!
//! Host ranges are registered with the GPU once and shared by refcount.
//! The registration itself is delegated to a [`DeviceRegistration`] strategy
//! chosen by configuration: explicit driver registration for discrete GPUs,
//! or an identity passthrough on unified-memory platforms.

pub mod driver;
pub mod registry;
pub mod stats;
pub mod strategy;

pub use driver::{DeviceAddress, GpuDriver, HostAddress, RegisterFlags};
pub use registry::{PinState, PinnedMemoryRegistry, PinnedRegion};
pub use stats::{RegistryStats, RegistryStatsSnapshot};
pub use strategy::{
    strategy_for, DeviceRegistration, ExplicitRegistration, Passthrough, RegistrationMode,
};
