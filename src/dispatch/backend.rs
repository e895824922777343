//! Backend lifecycle seen by the host inference framework

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use log::info;

use crate::{
    error::{IngestError, Result},
    pinning::{GpuDriver, PinnedMemoryRegistry, RegistrationMode},
};

use super::{
    instance::{ExecutionDispatcher, InstanceConfig},
    request::{BatchResult, ExecutionRequest},
};

/// Capabilities the host framework drives: initialize, execute, finalize
pub trait ModelLifecycle {
    /// Per-instance state
    type Instance;

    /// Bring up one instance; errors are fatal for that instance
    fn initialize(&self, config: InstanceConfig) -> Result<Self::Instance>;

    /// Run one batch; per-request failures are inside the result
    fn execute(
        &self,
        instance: &mut Self::Instance,
        requests: &mut [ExecutionRequest<'_>],
    ) -> BatchResult;

    /// Tear the instance down, releasing pins before unmapping
    fn finalize(&self, instance: Self::Instance) -> Result<()>;
}

/// Process-wide backend shared by every model instance
///
/// Holds the one [`PinnedMemoryRegistry`] all instances pin through.
#[derive(Debug)]
pub struct Backend {
    registry: Arc<PinnedMemoryRegistry>,
    mode: RegistrationMode,
    live_instances: Arc<AtomicUsize>,
}

impl Backend {
    /// Create a backend for `mode`; explicit mode needs a driver
    pub fn new(mode: RegistrationMode, driver: Option<Arc<dyn GpuDriver>>) -> Result<Self> {
        let registry = PinnedMemoryRegistry::for_mode(mode, driver)?;
        Ok(Self {
            registry: Arc::new(registry),
            mode,
            live_instances: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Backend for unified-memory platforms
    pub fn passthrough() -> Self {
        Self {
            registry: Arc::new(PinnedMemoryRegistry::new(Box::new(
                crate::pinning::Passthrough,
            ))),
            mode: RegistrationMode::Passthrough,
            live_instances: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Registration mode of this backend
    pub fn mode(&self) -> RegistrationMode {
        self.mode
    }

    /// Shared registry
    pub fn registry(&self) -> &Arc<PinnedMemoryRegistry> {
        &self.registry
    }

    /// Instances initialized and not yet finalized or dropped
    pub fn live_instances(&self) -> usize {
        self.live_instances.load(Ordering::Acquire)
    }

    /// Force-unregister anything still pinned
    ///
    /// Refused while any instance is live, since each one hands out device
    /// addresses derived from its pin.
    pub fn shutdown(&self) -> Result<usize> {
        let live = self.live_instances();
        if live > 0 {
            return Err(IngestError::invalid_parameter(
                "backend",
                format!("{} instances still live", live),
            ));
        }
        let released = self.registry.teardown()?;
        info!("backend shut down, {} registrations torn down", released);
        Ok(released)
    }
}

impl ModelLifecycle for Backend {
    type Instance = ExecutionDispatcher;

    fn initialize(&self, config: InstanceConfig) -> Result<ExecutionDispatcher> {
        if config.registration != self.mode {
            return Err(IngestError::invalid_parameter(
                "registration",
                format!(
                    "Instance wants {:?} but the backend runs {:?}",
                    config.registration, self.mode
                ),
            ));
        }

        let mut instance = ExecutionDispatcher::initialize(config, Arc::clone(&self.registry))?;
        instance.track(Arc::clone(&self.live_instances));
        Ok(instance)
    }

    fn execute(
        &self,
        instance: &mut ExecutionDispatcher,
        requests: &mut [ExecutionRequest<'_>],
    ) -> BatchResult {
        instance.execute(requests)
    }

    fn finalize(&self, instance: ExecutionDispatcher) -> Result<()> {
        instance.finalize()
    }
}
