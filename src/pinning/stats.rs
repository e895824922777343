//! Statistics for the pinned memory registry

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters for registry activity
#[derive(Debug, Default)]
pub struct RegistryStats {
    /// Driver registrations performed
    pub registrations: AtomicUsize,
    /// Driver unregistrations performed
    pub unregistrations: AtomicUsize,
    /// Acquires served from the cache
    pub cache_hits: AtomicUsize,
    /// Registrations or unregistrations the driver rejected
    pub failures: AtomicUsize,
}

impl RegistryStats {
    /// Create new statistics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a plain copy of the counters
    pub fn snapshot(&self) -> RegistryStatsSnapshot {
        RegistryStatsSnapshot {
            registrations: self.registrations.load(Ordering::Relaxed),
            unregistrations: self.unregistrations.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RegistryStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStatsSnapshot {
    pub registrations: usize,
    pub unregistrations: usize,
    pub cache_hits: usize,
    pub failures: usize,
}

impl RegistryStatsSnapshot {
    /// Registrations still outstanding
    pub fn active_registrations(&self) -> usize {
        self.registrations.saturating_sub(self.unregistrations)
    }

    /// Fraction of acquires that avoided a driver call
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.registrations;
        if total == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / total as f64
    }
}
