//! Model instance: cached ring mapping plus per-batch dispatch

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    error::{IngestError, Result},
    frames::{FrameRead, FrameReader, ReadCursor},
    pinning::{DeviceAddress, HostAddress, PinnedMemoryRegistry, RegistrationMode},
    ring::{RingBufferConfig, RingBufferHandle},
    stylus::{DeviceDestination, StylusPreprocessor},
};

use super::{
    request::{BatchResult, DeviceFrame, ExecutionRequest, ExecutionResult, Outcome, RequestPath},
    stats::DispatcherStats,
};

/// Configuration handed over by the host framework at instance startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Instance name for logs
    pub name: String,
    /// LiDAR ring segment
    pub ring: RingBufferConfig,
    /// How the ring is made device-visible
    pub registration: RegistrationMode,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            name: "spatial_0".to_string(),
            ring: RingBufferConfig::default(),
            registration: RegistrationMode::default(),
        }
    }
}

impl InstanceConfig {
    /// Create an instance configuration
    pub fn new(name: impl Into<String>, ring: RingBufferConfig) -> Self {
        Self {
            name: name.into(),
            ring,
            ..Default::default()
        }
    }

    /// Set the registration mode
    pub fn with_registration(mut self, registration: RegistrationMode) -> Self {
        self.registration = registration;
        self
    }
}

/// Routes each request of a batch to the frame reader or the stylus path
///
/// Owns the ring mapping and one pin on it for its whole lifetime, so no
/// per-call open, map or registration happens on the hot path.
#[derive(Debug)]
pub struct ExecutionDispatcher {
    config: InstanceConfig,
    ring: RingBufferHandle,
    registry: Arc<PinnedMemoryRegistry>,
    pinned_host: Option<HostAddress>,
    host_base: HostAddress,
    device_base: DeviceAddress,
    reader: FrameReader,
    preprocessor: StylusPreprocessor,
    stats: DispatcherStats,
    live: Option<Arc<AtomicUsize>>,
}

impl ExecutionDispatcher {
    /// Open, map and pin the ring
    ///
    /// Any failure here is fatal for the instance and leaves nothing open
    /// or pinned behind.
    pub fn initialize(config: InstanceConfig, registry: Arc<PinnedMemoryRegistry>) -> Result<Self> {
        let mut ring = RingBufferHandle::open(config.ring.clone())?;
        ring.map()?;

        let host_base = ring.host_base().ok_or_else(|| {
            IngestError::mapping_failed(ring.name(), "Mapping vanished after map")
        })?;
        let device_base = registry.acquire_pin(host_base, ring.mapped_len())?;

        let reader = match FrameReader::attach(&ring) {
            Ok(reader) => reader,
            Err(e) => {
                if let Err(unpin) = registry.release_pin(host_base) {
                    warn!("releasing pin after failed attach: {}", unpin);
                }
                return Err(e);
            }
        };

        info!(
            "instance {} ready: ring {} host {:#x} device {}",
            config.name,
            ring.name(),
            host_base,
            device_base
        );

        Ok(Self {
            config,
            ring,
            registry,
            pinned_host: Some(host_base),
            host_base,
            device_base,
            reader,
            preprocessor: StylusPreprocessor::new(),
            stats: DispatcherStats::default(),
            live: None,
        })
    }

    /// Count this instance in `live` until it is finalized or dropped
    pub(crate) fn track(&mut self, live: Arc<AtomicUsize>) {
        live.fetch_add(1, Ordering::AcqRel);
        if let Some(previous) = self.live.replace(live) {
            previous.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Process every request independently
    ///
    /// Always returns one result per request; a failing request never
    /// stops the remaining ones.
    pub fn execute(&mut self, requests: &mut [ExecutionRequest<'_>]) -> BatchResult {
        let mut batch = BatchResult::with_capacity(requests.len());
        self.stats.batches += 1;

        for (index, request) in requests.iter_mut().enumerate() {
            self.stats.requests += 1;
            let outcome = match self.execute_one(request) {
                Ok(outcome) => {
                    self.stats.succeeded += 1;
                    outcome
                }
                Err(e) => {
                    let kind = e.kind();
                    debug!("{} request {} failed: {}", self.config.name, index, e);
                    self.stats.record_failure(kind);
                    Outcome::Failed(kind)
                }
            };
            batch.push(ExecutionResult { index, outcome });
        }

        batch
    }

    fn execute_one(&mut self, request: &mut ExecutionRequest<'_>) -> Result<Outcome> {
        match request.path {
            RequestPath::Lidar => self.handoff_frame(&mut request.destination),
            RequestPath::Stylus(samples) => {
                let count = self.preprocessor.transform(samples, &mut request.destination)?;
                self.stats.stylus_samples += count as u64;
                Ok(Outcome::Normalized { count })
            }
            RequestPath::PackedStylus(packed) => {
                let count = self
                    .preprocessor
                    .transform_packed(packed, &mut request.destination)?;
                self.stats.stylus_samples += count as u64;
                Ok(Outcome::Normalized { count })
            }
        }
    }

    fn handoff_frame(&mut self, destination: &mut DeviceDestination<'_>) -> Result<Outcome> {
        if destination.capacity() < DeviceFrame::SIZE {
            return Err(IngestError::buffer_too_small(
                DeviceFrame::SIZE,
                destination.capacity(),
            ));
        }

        let view = match self.reader.next_frame(&self.ring)? {
            FrameRead::Frame(view) => view,
            FrameRead::Empty => return Err(IngestError::Empty),
            FrameRead::DataLoss { dropped } => {
                self.stats.record_data_loss(dropped);
                return Err(IngestError::data_loss(dropped));
            }
        };

        let frame = DeviceFrame {
            device_address: self
                .device_base
                .offset((view.address() - self.host_base) as u64)
                .as_u64(),
            length: view.len() as u64,
            epoch: view.epoch(),
        };
        destination.write_unaligned(0, frame)?;
        self.stats.frames_delivered += 1;
        Ok(Outcome::Frame(frame))
    }

    /// Release the pin, then close the mapping
    pub fn finalize(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let released = match self.pinned_host.take() {
            Some(host) => self.registry.release_pin(host),
            None => Ok(()),
        };
        self.ring.close();
        if let Some(live) = self.live.take() {
            live.fetch_sub(1, Ordering::AcqRel);
        }
        if released.is_ok() {
            info!("instance {} finalized", self.config.name);
        }
        released
    }

    /// Instance configuration
    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    /// Execution counters
    pub fn stats(&self) -> &DispatcherStats {
        &self.stats
    }

    /// LiDAR read cursor
    pub fn cursor(&self) -> &ReadCursor {
        self.reader.cursor()
    }

    /// The cached ring handle
    pub fn ring(&self) -> &RingBufferHandle {
        &self.ring
    }

    /// Device address of the start of the pinned mapping
    pub fn device_base(&self) -> DeviceAddress {
        self.device_base
    }

    /// Whether the instance still holds its pin
    pub fn is_pinned(&self) -> bool {
        self.pinned_host.is_some()
    }
}

impl Drop for ExecutionDispatcher {
    fn drop(&mut self) {
        if self.pinned_host.is_some() {
            warn!("instance {} dropped without finalize", self.config.name);
            if let Err(e) = self.shutdown() {
                warn!("releasing pin on drop failed: {}", e);
            }
        }
    }
}
