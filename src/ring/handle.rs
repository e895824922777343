//! Read-only handle over the producer's memory-mapped circular buffer

use std::{
    fs::File,
    io::ErrorKind as IoErrorKind,
    ptr::NonNull,
};

use log::{debug, info};
use memmap2::{Mmap, MmapOptions};
use nix::{
    errno::Errno,
    fcntl::OFlag,
    sys::{mman::shm_open, stat::Mode},
};

use crate::error::{IngestError, Result};

use super::{
    config::{RingBufferConfig, SegmentBacking},
    header::{SegmentHeader, HEADER_SIZE},
};

/// Capacity and stride captured when the segment is mapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingGeometry {
    /// Payload bytes
    pub capacity: u64,
    /// Bytes per frame
    pub frame_stride: u32,
}

impl RingGeometry {
    /// Number of frames that fit in one lap
    pub fn frames_per_lap(&self) -> u64 {
        self.capacity / self.frame_stride as u64
    }
}

/// Owns the descriptor and read-only mapping of one ring buffer segment
///
/// Opened once per model instance and kept for its whole lifetime.
#[derive(Debug)]
pub struct RingBufferHandle {
    config: RingBufferConfig,
    file: Option<File>,
    mmap: Option<Mmap>,
    geometry: Option<RingGeometry>,
}

impl RingBufferHandle {
    /// Open the named segment read-only
    pub fn open(config: RingBufferConfig) -> Result<Self> {
        config.validate()?;

        let file = Self::open_backing(&config)?;
        debug!(
            "opened ring segment {} ({}, {} bytes)",
            config.name,
            config.backing.name(),
            config.size
        );

        Ok(Self {
            config,
            file: Some(file),
            mmap: None,
            geometry: None,
        })
    }

    /// Open and map in one step
    pub fn open_mapped(config: RingBufferConfig) -> Result<Self> {
        let mut handle = Self::open(config)?;
        handle.map()?;
        Ok(handle)
    }

    fn open_backing(config: &RingBufferConfig) -> Result<File> {
        match config.backing {
            SegmentBacking::PosixShm => {
                match shm_open(config.name.as_str(), OFlag::O_RDONLY, Mode::empty()) {
                    Ok(fd) => Ok(File::from(fd)),
                    Err(Errno::ENOENT) => Err(IngestError::resource_unavailable_io(
                        &config.name,
                        std::io::Error::from(Errno::ENOENT),
                    )),
                    Err(e) => Err(IngestError::from_io(
                        std::io::Error::from(e),
                        "Failed to open shared memory segment",
                    )),
                }
            }
            SegmentBacking::FileBacked => {
                let path = config.default_file_path();
                File::open(&path).map_err(|e| {
                    if e.kind() == IoErrorKind::NotFound {
                        IngestError::resource_unavailable_io(&config.name, e)
                    } else {
                        IngestError::from_io(e, "Failed to open segment file")
                    }
                })
            }
        }
    }

    /// Map the segment into this process and return the host base pointer
    ///
    /// Any failure drops the descriptor, leaving the handle closed.
    pub fn map(&mut self) -> Result<NonNull<u8>> {
        if let Some(mmap) = &self.mmap {
            return NonNull::new(mmap.as_ptr() as *mut u8)
                .ok_or_else(|| IngestError::mapping_failed(&self.config.name, "Null mapping"));
        }

        let file = self.file.take().ok_or_else(|| {
            IngestError::invalid_parameter("handle", "Segment is closed")
        })?;

        let (mmap, geometry) = match Self::create_mapping(&self.config, &file) {
            Ok(mapped) => mapped,
            Err(e) => {
                drop(file);
                return Err(e);
            }
        };

        let base = NonNull::new(mmap.as_ptr() as *mut u8)
            .ok_or_else(|| IngestError::mapping_failed(&self.config.name, "Null mapping"))?;

        info!(
            "mapped ring segment {} at {:p}: capacity {} bytes, stride {} bytes",
            self.config.name, base, geometry.capacity, geometry.frame_stride
        );

        self.file = Some(file);
        self.mmap = Some(mmap);
        self.geometry = Some(geometry);
        Ok(base)
    }

    fn create_mapping(config: &RingBufferConfig, file: &File) -> Result<(Mmap, RingGeometry)> {
        let actual = file
            .metadata()
            .map_err(|e| IngestError::mapping_failed(&config.name, e.to_string()))?
            .len();

        if actual < config.size as u64 {
            return Err(IngestError::mapping_failed(
                &config.name,
                format!("Segment is {} bytes, expected at least {}", actual, config.size),
            ));
        }

        let mmap = unsafe {
            MmapOptions::new()
                .len(config.size)
                .map(file)
                .map_err(|e| IngestError::mapping_failed(&config.name, e.to_string()))?
        };

        // SAFETY: the mapping is page aligned and at least HEADER_SIZE long
        let header = unsafe { &*(mmap.as_ptr() as *const SegmentHeader) };
        header
            .validate(config.size)
            .map_err(|e| IngestError::mapping_failed(&config.name, e.to_string()))?;

        let geometry = RingGeometry {
            capacity: header.capacity,
            frame_stride: header.frame_stride,
        };
        Ok((mmap, geometry))
    }

    /// Unmap and release the descriptor; safe to call repeatedly
    pub fn close(&mut self) {
        let was_open = self.mmap.is_some() || self.file.is_some();
        self.mmap = None;
        self.file = None;
        self.geometry = None;
        if was_open {
            debug!("closed ring segment {}", self.config.name);
        }
    }

    /// Whether the descriptor is still held
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Whether the segment is currently mapped
    pub fn is_mapped(&self) -> bool {
        self.mmap.is_some()
    }

    /// Segment configuration
    pub fn config(&self) -> &RingBufferConfig {
        &self.config
    }

    /// Segment name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn mapping(&self) -> Result<&Mmap> {
        self.mmap.as_ref().ok_or_else(|| {
            IngestError::invalid_parameter("handle", "Segment is not mapped")
        })
    }

    /// Header of the mapped segment
    pub fn header(&self) -> Result<&SegmentHeader> {
        let mmap = self.mapping()?;
        // SAFETY: validated in create_mapping, lives as long as &self
        Ok(unsafe { &*(mmap.as_ptr() as *const SegmentHeader) })
    }

    /// Geometry captured at map time
    pub fn geometry(&self) -> Result<RingGeometry> {
        self.geometry.ok_or_else(|| {
            IngestError::invalid_parameter("handle", "Segment is not mapped")
        })
    }

    /// Producer's current write cursor (acquire load)
    pub fn write_cursor(&self) -> Result<u64> {
        Ok(self.header()?.load_write_cursor())
    }

    /// Payload capacity in bytes
    pub fn capacity(&self) -> Result<u64> {
        Ok(self.geometry()?.capacity)
    }

    /// Frame stride in bytes
    pub fn frame_stride(&self) -> Result<u32> {
        Ok(self.geometry()?.frame_stride)
    }

    /// Payload region
    ///
    /// Contents change underneath the caller as the producer writes.
    pub fn payload(&self) -> Result<&[u8]> {
        let mmap = self.mapping()?;
        let capacity = self.capacity()? as usize;
        Ok(&mmap[HEADER_SIZE..HEADER_SIZE + capacity])
    }

    /// Host address of the start of the mapping
    pub fn host_base(&self) -> Option<usize> {
        self.mmap.as_ref().map(|m| m.as_ptr() as usize)
    }

    /// Mapped length in bytes, 0 when unmapped
    pub fn mapped_len(&self) -> usize {
        self.mmap.as_ref().map(|m| m.len()).unwrap_or(0)
    }
}

impl Drop for RingBufferHandle {
    fn drop(&mut self) {
        self.close();
    }
}
