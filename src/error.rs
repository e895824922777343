//! Error types and handling for the ingest path

/// Result type alias for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Error types for the zero-copy ingest path
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Backing shared-memory segment does not exist
    #[error("Resource unavailable: {name}")]
    ResourceUnavailable {
        name: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Mapping the segment into this process failed
    #[error("Mapping failed for {name}: {message}")]
    MappingFailed { name: String, message: String },

    /// Device registration of host memory failed
    #[error("Pinning failed at {address:#x}: {message}")]
    PinningFailed { address: usize, message: String },

    /// The producer lapped the reader; unread frames were discarded
    #[error("Data loss: {dropped} frames dropped")]
    DataLoss { dropped: u64 },

    /// Destination is too small for the transformed samples
    #[error("Buffer too small: required {required}, available {available}")]
    BufferTooSmall { required: usize, available: usize },

    /// No new frame since the last read
    #[error("No frame available")]
    Empty,

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// I/O related errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Poisoned lock or other concurrency failure
    #[error("Concurrency error: {message}")]
    Concurrency { message: String },
}

/// Copyable classification of an [`IngestError`], reported per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ResourceUnavailable,
    MappingFailed,
    PinningFailed,
    DataLoss,
    BufferTooSmall,
    Empty,
    InvalidParameter,
    Io,
    Concurrency,
}

impl ErrorKind {
    /// Whether this kind aborts instance startup
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::ResourceUnavailable | ErrorKind::MappingFailed | ErrorKind::PinningFailed
        )
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::ResourceUnavailable => "resource-unavailable",
            ErrorKind::MappingFailed => "mapping-failed",
            ErrorKind::PinningFailed => "pinning-failed",
            ErrorKind::DataLoss => "data-loss",
            ErrorKind::BufferTooSmall => "buffer-too-small",
            ErrorKind::Empty => "empty",
            ErrorKind::InvalidParameter => "invalid-parameter",
            ErrorKind::Io => "io",
            ErrorKind::Concurrency => "concurrency",
        }
    }
}

impl IngestError {
    /// Create a resource-unavailable error without an underlying cause
    pub fn resource_unavailable(name: impl Into<String>) -> Self {
        Self::ResourceUnavailable {
            name: name.into(),
            source: None,
        }
    }

    /// Create a resource-unavailable error from the failed open
    pub fn resource_unavailable_io(name: impl Into<String>, source: std::io::Error) -> Self {
        Self::ResourceUnavailable {
            name: name.into(),
            source: Some(source),
        }
    }

    /// Create a mapping error
    pub fn mapping_failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MappingFailed {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a pinning error
    pub fn pinning_failed(address: usize, message: impl Into<String>) -> Self {
        Self::PinningFailed {
            address,
            message: message.into(),
        }
    }

    /// Create a data loss error
    pub fn data_loss(dropped: u64) -> Self {
        Self::DataLoss { dropped }
    }

    /// Create a buffer-too-small error
    pub fn buffer_too_small(required: usize, available: usize) -> Self {
        Self::BufferTooSmall {
            required,
            available,
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create a concurrency error
    pub fn concurrency(message: impl Into<String>) -> Self {
        Self::Concurrency {
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::ResourceUnavailable { .. } => ErrorKind::ResourceUnavailable,
            IngestError::MappingFailed { .. } => ErrorKind::MappingFailed,
            IngestError::PinningFailed { .. } => ErrorKind::PinningFailed,
            IngestError::DataLoss { .. } => ErrorKind::DataLoss,
            IngestError::BufferTooSmall { .. } => ErrorKind::BufferTooSmall,
            IngestError::Empty => ErrorKind::Empty,
            IngestError::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            IngestError::Io { .. } => ErrorKind::Io,
            IngestError::Concurrency { .. } => ErrorKind::Concurrency,
        }
    }
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<nix::Error> for IngestError {
    fn from(err: nix::Error) -> Self {
        Self::from_io(std::io::Error::from(err), "System call failed")
    }
}

impl<T> From<std::sync::PoisonError<T>> for IngestError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::concurrency("Lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = IngestError::resource_unavailable("/lidar_circular_buffer");
        assert!(matches!(err, IngestError::ResourceUnavailable { .. }));

        let err = IngestError::buffer_too_small(100, 40);
        assert!(matches!(err, IngestError::BufferTooSmall { .. }));
        assert_eq!(err.kind(), ErrorKind::BufferTooSmall);

        let err = IngestError::data_loss(7);
        assert_eq!(err.kind(), ErrorKind::DataLoss);
    }

    #[test]
    fn test_error_display() {
        let err = IngestError::buffer_too_small(60, 20);
        let display = format!("{}", err);
        assert!(display.contains("Buffer too small"));
        assert!(display.contains("60"));

        let err = IngestError::pinning_failed(0x1000, "driver refused");
        assert!(format!("{}", err).contains("0x1000"));
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(ErrorKind::ResourceUnavailable.is_fatal());
        assert!(ErrorKind::MappingFailed.is_fatal());
        assert!(ErrorKind::PinningFailed.is_fatal());
        assert!(!ErrorKind::BufferTooSmall.is_fatal());
        assert!(!ErrorKind::Empty.is_fatal());
        assert!(!ErrorKind::DataLoss.is_fatal());
    }
}
