//! Integration tests for the shared ring segment

use spatial_ingest::{
    error::{ErrorKind, IngestError},
    ring::{RingBufferConfig, RingBufferHandle, SegmentBacking, SegmentWriter, HEADER_SIZE},
};
use tempfile::TempDir;

const STRIDE: u32 = 256;
const CAPACITY: u64 = STRIDE as u64 * 8;

fn file_config(dir: &TempDir, name: &str) -> RingBufferConfig {
    RingBufferConfig::new(name, HEADER_SIZE + CAPACITY as usize)
        .with_file_path(dir.path().join(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_points_at_lidar_segment() {
        let config = RingBufferConfig::default();
        assert_eq!(config.name, "/lidar_circular_buffer");
        assert_eq!(config.size, 16 * 1024 * 1024);
        assert_eq!(config.backing, SegmentBacking::PosixShm);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_open_missing_file_segment() {
        let temp_dir = TempDir::new().unwrap();
        let config = file_config(&temp_dir, "missing");

        let err = RingBufferHandle::open(config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);
    }

    #[test]
    fn test_open_missing_shm_segment() {
        let name = format!("/spatial_missing_{}", std::process::id());
        let config = RingBufferConfig::new(name, HEADER_SIZE + CAPACITY as usize);

        let err = RingBufferHandle::open(config).unwrap_err();
        assert!(matches!(err, IngestError::ResourceUnavailable { .. }));
    }

    #[test]
    fn test_open_map_close_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let config = file_config(&temp_dir, "lifecycle");
        let _writer = SegmentWriter::create(config.clone(), CAPACITY, STRIDE).unwrap();

        let mut handle = RingBufferHandle::open(config).unwrap();
        assert!(handle.is_open());
        assert!(!handle.is_mapped());
        assert!(handle.host_base().is_none());

        let base = handle.map().unwrap();
        assert!(handle.is_mapped());
        assert_eq!(handle.host_base(), Some(base.as_ptr() as usize));
        assert_eq!(handle.mapped_len(), HEADER_SIZE + CAPACITY as usize);

        // Mapping twice hands back the same base
        assert_eq!(handle.map().unwrap(), base);

        handle.close();
        assert!(!handle.is_open());
        assert!(!handle.is_mapped());

        // Idempotent
        handle.close();
        assert!(handle.write_cursor().is_err());
    }

    #[test]
    fn test_header_is_read_from_producer() {
        let temp_dir = TempDir::new().unwrap();
        let config = file_config(&temp_dir, "header");
        let mut writer = SegmentWriter::create(config.clone(), CAPACITY, STRIDE).unwrap();

        let handle = RingBufferHandle::open_mapped(config).unwrap();
        let geometry = handle.geometry().unwrap();
        assert_eq!(geometry.capacity, CAPACITY);
        assert_eq!(geometry.frame_stride, STRIDE);
        assert_eq!(geometry.frames_per_lap(), 8);
        assert_eq!(handle.write_cursor().unwrap(), 0);

        writer.write_frame(&[7u8; STRIDE as usize]).unwrap();
        writer.write_frame(&[9u8; 16]).unwrap();
        assert_eq!(handle.write_cursor().unwrap(), 2 * STRIDE as u64);

        let payload = handle.payload().unwrap();
        assert_eq!(payload.len(), CAPACITY as usize);
        assert!(payload[..STRIDE as usize].iter().all(|&b| b == 7));
        assert!(payload[STRIDE as usize..STRIDE as usize + 16].iter().all(|&b| b == 9));
    }

    #[test]
    fn test_segment_smaller_than_config_fails_to_map() {
        let temp_dir = TempDir::new().unwrap();
        let config = file_config(&temp_dir, "short");
        let _writer = SegmentWriter::create(config.clone(), CAPACITY, STRIDE).unwrap();

        let mut oversized = config.clone();
        oversized.size = config.size * 2;
        let mut handle = RingBufferHandle::open(oversized).unwrap();

        let err = handle.map().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MappingFailed);
        assert!(!handle.is_open());
    }

    #[test]
    fn test_corrupt_header_fails_to_map() {
        let temp_dir = TempDir::new().unwrap();
        let config = file_config(&temp_dir, "corrupt");
        std::fs::write(
            temp_dir.path().join("corrupt"),
            vec![0u8; HEADER_SIZE + CAPACITY as usize],
        )
        .unwrap();

        // Zero stride in the header
        let mut handle = RingBufferHandle::open(config).unwrap();
        let err = handle.map().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MappingFailed);
        assert!(err.kind().is_fatal());
        assert!(!handle.is_mapped());
    }

    #[test]
    fn test_producer_rejects_oversized_frame() {
        let temp_dir = TempDir::new().unwrap();
        let config = file_config(&temp_dir, "oversized");
        let mut writer = SegmentWriter::create(config, CAPACITY, STRIDE).unwrap();

        let err = writer.write_frame(&vec![0u8; STRIDE as usize + 1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert_eq!(writer.write_cursor(), 0);
    }

    #[test]
    fn test_producer_rejects_bad_geometry() {
        let temp_dir = TempDir::new().unwrap();

        // Capacity not a multiple of stride
        let config = file_config(&temp_dir, "geometry");
        assert!(SegmentWriter::create(config.clone(), CAPACITY - 1, STRIDE).is_err());

        // Capacity larger than the segment
        assert!(SegmentWriter::create(config, CAPACITY * 2, STRIDE).is_err());
    }

    #[test]
    fn test_posix_shm_round_trip() {
        let name = format!("/spatial_ring_test_{}", std::process::id());
        let config = RingBufferConfig::new(name, HEADER_SIZE + CAPACITY as usize);

        let mut writer = SegmentWriter::create(config.clone(), CAPACITY, STRIDE).unwrap();
        writer.write_frame(&[1u8; 8]).unwrap();

        let handle = RingBufferHandle::open_mapped(config).unwrap();
        assert_eq!(handle.config().backing, SegmentBacking::PosixShm);
        assert_eq!(handle.write_cursor().unwrap(), STRIDE as u64);
        assert_eq!(&handle.payload().unwrap()[..8], &[1u8; 8]);
    }
}
