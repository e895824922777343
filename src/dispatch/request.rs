//! Per-call request and result types

use crate::{
    error::ErrorKind,
    pinning::DeviceAddress,
    stylus::{DeviceDestination, PackedSamples, RawStylusSample},
};

/// Which pipeline a request goes through
#[derive(Debug, Clone, Copy)]
pub enum RequestPath<'a> {
    /// Next frame from the instance's LiDAR ring
    Lidar,
    /// Raw stylus tensor attached to the request
    Stylus(&'a [RawStylusSample]),
    /// Raw stylus tensor still in its packed wire form
    PackedStylus(PackedSamples<'a>),
}

/// One request of a batch, owned by the host framework for the call
#[derive(Debug)]
pub struct ExecutionRequest<'a> {
    pub path: RequestPath<'a>,
    pub destination: DeviceDestination<'a>,
}

impl<'a> ExecutionRequest<'a> {
    /// LiDAR request writing its frame descriptor into `destination`
    pub fn lidar(destination: DeviceDestination<'a>) -> Self {
        Self {
            path: RequestPath::Lidar,
            destination,
        }
    }

    /// Stylus request normalizing `samples` into `destination`
    pub fn stylus(samples: &'a [RawStylusSample], destination: DeviceDestination<'a>) -> Self {
        Self {
            path: RequestPath::Stylus(samples),
            destination,
        }
    }

    /// Stylus request decoding `packed` as it writes into `destination`
    pub fn stylus_packed(packed: PackedSamples<'a>, destination: DeviceDestination<'a>) -> Self {
        Self {
            path: RequestPath::PackedStylus(packed),
            destination,
        }
    }
}

/// Frame handed to the device, written to a LiDAR request's destination
///
/// Points into the pinned ring; the frame itself is never copied.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFrame {
    /// Device-visible address of the first frame byte
    pub device_address: u64,
    /// Frame length in bytes
    pub length: u64,
    /// Producer cursor the frame was written at
    pub epoch: u64,
}

impl DeviceFrame {
    /// Bytes occupied in the destination
    pub const SIZE: usize = std::mem::size_of::<DeviceFrame>();

    /// Typed device address
    pub fn address(&self) -> DeviceAddress {
        DeviceAddress(self.device_address)
    }
}

/// What happened to one request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// LiDAR frame handed off
    Frame(DeviceFrame),
    /// Stylus samples written
    Normalized { count: usize },
    /// Request failed; the rest of the batch was unaffected
    Failed(ErrorKind),
}

/// Result of one request, keyed by its position in the batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionResult {
    pub index: usize,
    pub outcome: Outcome,
}

impl ExecutionResult {
    /// Whether the request succeeded
    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, Outcome::Failed(_))
    }

    /// Error kind of a failed request
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self.outcome {
            Outcome::Failed(kind) => Some(kind),
            _ => None,
        }
    }
}

/// Aggregate outcome of one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    results: Vec<ExecutionResult>,
}

impl BatchResult {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            results: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, result: ExecutionResult) {
        self.results.push(result);
    }

    /// Result for request `index`
    pub fn get(&self, index: usize) -> Option<&ExecutionResult> {
        self.results.get(index)
    }

    /// All results in request order
    pub fn results(&self) -> &[ExecutionResult] {
        &self.results
    }

    /// Number of results
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether the batch was empty
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Number of successful requests
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// Number of failed requests
    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    /// Iterate over results
    pub fn iter(&self) -> std::slice::Iter<'_, ExecutionResult> {
        self.results.iter()
    }
}

impl<'a> IntoIterator for &'a BatchResult {
    type Item = &'a ExecutionResult;
    type IntoIter = std::slice::Iter<'a, ExecutionResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_counts() {
        let mut batch = BatchResult::with_capacity(2);
        batch.push(ExecutionResult {
            index: 0,
            outcome: Outcome::Normalized { count: 3 },
        });
        batch.push(ExecutionResult {
            index: 1,
            outcome: Outcome::Failed(ErrorKind::Empty),
        });

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.succeeded(), 1);
        assert_eq!(batch.failed(), 1);
        assert_eq!(batch.get(1).unwrap().error_kind(), Some(ErrorKind::Empty));
        assert_eq!(batch.get(0).unwrap().error_kind(), None);
    }

    #[test]
    fn test_device_frame_layout() {
        assert_eq!(DeviceFrame::SIZE, 24);
    }
}
