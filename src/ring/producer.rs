//! Simulated sensor producer
//!
//! The real capture process lives outside this crate. This writer follows the
//! same protocol (frame bytes first, then a release store of the cursor) so
//! the reader side can be exercised by tests, benches and `spatial-cli simulate`.

use std::{
    fs::{File, OpenOptions},
    sync::atomic::Ordering,
};

use log::{debug, warn};
use memmap2::{MmapMut, MmapOptions};
use nix::{
    fcntl::OFlag,
    sys::{
        mman::{shm_open, shm_unlink},
        stat::Mode,
    },
};

use crate::error::{IngestError, Result};

use super::{
    config::{RingBufferConfig, SegmentBacking},
    header::{validate_geometry, SegmentHeader, HEADER_SIZE},
};

/// Writable side of a ring segment
#[derive(Debug)]
pub struct SegmentWriter {
    config: RingBufferConfig,
    mmap: MmapMut,
    _file: File,
    capacity: u64,
    frame_stride: u32,
    unlink_on_drop: bool,
}

impl SegmentWriter {
    /// Create (or truncate) a segment and initialize its header
    pub fn create(config: RingBufferConfig, capacity: u64, frame_stride: u32) -> Result<Self> {
        config.validate()?;
        validate_geometry(capacity, frame_stride, config.size)?;

        let file = match config.backing {
            SegmentBacking::PosixShm => {
                let fd = shm_open(
                    config.name.as_str(),
                    OFlag::O_CREAT | OFlag::O_RDWR,
                    Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH,
                )?;
                File::from(fd)
            }
            SegmentBacking::FileBacked => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(config.default_file_path())
                .map_err(|e| IngestError::from_io(e, "Failed to create segment file"))?,
        };

        file.set_len(config.size as u64)
            .map_err(|e| IngestError::from_io(e, "Failed to set segment size"))?;

        let mut mmap = unsafe {
            MmapOptions::new()
                .len(config.size)
                .map_mut(&file)
                .map_err(|e| IngestError::mapping_failed(&config.name, e.to_string()))?
        };

        // SAFETY: page-aligned mapping of at least HEADER_SIZE bytes
        unsafe {
            std::ptr::write(
                mmap.as_mut_ptr() as *mut SegmentHeader,
                SegmentHeader::new(capacity, frame_stride),
            );
        }

        debug!(
            "producer created segment {} (capacity {}, stride {})",
            config.name, capacity, frame_stride
        );

        let unlink_on_drop = config.backing == SegmentBacking::PosixShm;
        Ok(Self {
            config,
            mmap,
            _file: file,
            capacity,
            frame_stride,
            unlink_on_drop,
        })
    }

    /// Keep a POSIX segment alive after this writer drops
    pub fn persist(mut self) -> Self {
        self.unlink_on_drop = false;
        self
    }

    fn header(&self) -> &SegmentHeader {
        // SAFETY: initialized in create
        unsafe { &*(self.mmap.as_ptr() as *const SegmentHeader) }
    }

    /// Current producer cursor
    pub fn write_cursor(&self) -> u64 {
        self.header().write_cursor.load(Ordering::Relaxed)
    }

    /// Payload capacity
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Frame stride
    pub fn frame_stride(&self) -> u32 {
        self.frame_stride
    }

    /// Segment configuration, for opening the reader side
    pub fn config(&self) -> &RingBufferConfig {
        &self.config
    }

    /// Write one frame and publish it
    ///
    /// `data` shorter than the stride leaves the remaining bytes untouched.
    pub fn write_frame(&mut self, data: &[u8]) -> Result<u64> {
        let stride = self.frame_stride as usize;
        if data.len() > stride {
            return Err(IngestError::invalid_parameter(
                "data",
                format!("Frame of {} bytes exceeds stride {}", data.len(), stride),
            ));
        }

        let cursor = self.write_cursor();
        let offset = HEADER_SIZE + (cursor % self.capacity) as usize;
        self.mmap[offset..offset + data.len()].copy_from_slice(data);

        let next = cursor + stride as u64;
        self.header().write_cursor.store(next, Ordering::Release);
        Ok(next)
    }

    /// Publish `frames` frames without touching their bytes
    pub fn advance_frames(&mut self, frames: u64) -> u64 {
        let next = self.write_cursor() + frames * self.frame_stride as u64;
        self.header().write_cursor.store(next, Ordering::Release);
        next
    }

    /// Reset the cursor to zero, as a restarted producer would
    pub fn restart(&mut self) {
        self.header().write_cursor.store(0, Ordering::Release);
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        if self.unlink_on_drop {
            if let Err(e) = shm_unlink(self.config.name.as_str()) {
                warn!("failed to unlink segment {}: {}", self.config.name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_writer_publishes_frames() {
        let dir = TempDir::new().unwrap();
        let config = RingBufferConfig::new("/writer_test", HEADER_SIZE + 1024)
            .with_file_path(dir.path().join("ring"));
        let mut writer = SegmentWriter::create(config, 1024, 256).unwrap();

        assert_eq!(writer.write_cursor(), 0);
        assert_eq!(writer.write_frame(&[1u8; 256]).unwrap(), 256);
        assert_eq!(writer.write_frame(&[2u8; 10]).unwrap(), 512);
        assert!(writer.write_frame(&[0u8; 257]).is_err());

        assert_eq!(writer.advance_frames(4), 1536);
        writer.restart();
        assert_eq!(writer.write_cursor(), 0);
    }

    #[test]
    fn test_writer_rejects_bad_geometry() {
        let dir = TempDir::new().unwrap();
        let config = RingBufferConfig::new("/writer_bad", HEADER_SIZE + 1024)
            .with_file_path(dir.path().join("ring"));
        assert!(SegmentWriter::create(config.clone(), 1000, 256).is_err());
        assert!(SegmentWriter::create(config, 2048, 256).is_err());
    }

    #[test]
    fn test_persisted_segment_outlives_writer() {
        let name = format!("/spatial_persist_{}", std::process::id());
        let config = RingBufferConfig::new(name.as_str(), HEADER_SIZE + 1024);

        let mut writer = SegmentWriter::create(config.clone(), 1024, 256).unwrap().persist();
        writer.write_frame(&[7u8; 256]).unwrap();
        drop(writer);

        let mut handle = crate::ring::RingBufferHandle::open(config).unwrap();
        handle.map().unwrap();
        assert_eq!(handle.write_cursor().unwrap(), 256);
        handle.close();

        shm_unlink(name.as_str()).unwrap();
    }
}
