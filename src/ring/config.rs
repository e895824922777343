//! Configuration types for the shared circular buffer segment

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::{DEFAULT_SEGMENT_NAME, DEFAULT_SEGMENT_SIZE};
use crate::error::{IngestError, Result};

use super::header::HEADER_SIZE;

/// Where the producer's segment lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentBacking {
    /// POSIX shared memory object (`shm_open`)
    PosixShm,
    /// Regular file mapped shared, used for simulation and tests
    FileBacked,
}

impl Default for SegmentBacking {
    fn default() -> Self {
        Self::PosixShm
    }
}

impl SegmentBacking {
    /// Get a human-readable name for the backing type
    pub fn name(&self) -> &'static str {
        match self {
            SegmentBacking::PosixShm => "posix-shm",
            SegmentBacking::FileBacked => "file-backed",
        }
    }
}

/// Configuration for opening the producer's ring buffer segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingBufferConfig {
    /// Name of the shared segment
    pub name: String,
    /// Total segment size in bytes (header + payload)
    pub size: usize,
    /// Backing of the segment
    pub backing: SegmentBacking,
    /// Explicit path for file-backed segments
    pub file_path: Option<PathBuf>,
}

impl Default for RingBufferConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SEGMENT_NAME.to_string(),
            size: DEFAULT_SEGMENT_SIZE,
            backing: SegmentBacking::default(),
            file_path: None,
        }
    }
}

impl RingBufferConfig {
    /// Create a new segment configuration
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            ..Default::default()
        }
    }

    /// Set the backing type
    pub fn with_backing(mut self, backing: SegmentBacking) -> Self {
        self.backing = backing;
        self
    }

    /// Set the file path, switching to a file-backed segment
    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self.backing = SegmentBacking::FileBacked;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(IngestError::invalid_parameter(
                "name",
                "Segment name cannot be empty",
            ));
        }

        if self.size <= HEADER_SIZE {
            return Err(IngestError::invalid_parameter(
                "size",
                format!("Segment size must exceed the {} byte header", HEADER_SIZE),
            ));
        }

        if self.backing == SegmentBacking::PosixShm {
            // shm_open wants exactly one leading slash
            if !self.name.starts_with('/') || self.name[1..].contains('/') || self.name.len() < 2 {
                return Err(IngestError::invalid_parameter(
                    "name",
                    "POSIX shared memory names must look like /name",
                ));
            }
        }

        Ok(())
    }

    /// Get the path used for file-backed segments
    pub fn default_file_path(&self) -> PathBuf {
        self.file_path.clone().unwrap_or_else(|| {
            PathBuf::from(format!(
                "/tmp/spatial_{}",
                self.name.trim_start_matches('/')
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_reference() {
        let config = RingBufferConfig::default();
        assert_eq!(config.name, "/lidar_circular_buffer");
        assert_eq!(config.size, 16 * 1024 * 1024);
        assert_eq!(config.backing, SegmentBacking::PosixShm);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = RingBufferConfig::new("", 4096);
        assert!(config.validate().is_err());

        config.name = "no_slash".to_string();
        assert!(config.validate().is_err());

        config.name = "/ok".to_string();
        assert!(config.validate().is_ok());

        config.size = HEADER_SIZE;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_backed_skips_shm_name_rules() {
        let config = RingBufferConfig::new("plain", 4096).with_file_path("/tmp/x");
        assert_eq!(config.backing, SegmentBacking::FileBacked);
        assert!(config.validate().is_ok());
        assert_eq!(config.default_file_path(), PathBuf::from("/tmp/x"));

        let config = RingBufferConfig::new("/lidar", 4096).with_backing(SegmentBacking::FileBacked);
        assert_eq!(config.default_file_path(), PathBuf::from("/tmp/spatial_lidar"));
    }
}
