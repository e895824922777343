//! Batch execution entry point for the host inference framework

pub mod backend;
pub mod instance;
pub mod request;
pub mod stats;

pub use backend::{Backend, ModelLifecycle};
pub use instance::{ExecutionDispatcher, InstanceConfig};
pub use request::{
    BatchResult, DeviceFrame, ExecutionRequest, ExecutionResult, Outcome, RequestPath,
};
pub use stats::DispatcherStats;
