//! Lock-free frame reader over the producer's ring
//!
//! The only synchronization with the producer is the monotonic write cursor:
//! the producer writes frame bytes and then publishes the cursor with a
//! release store; [`FrameReader::read_next`] loads it with acquire ordering
//! before touching the payload.

use log::{debug, warn};

use crate::{
    error::{IngestError, Result},
    ring::{RingBufferHandle, HEADER_SIZE},
};

use super::cursor::ReadCursor;

/// Zero-copy view of one frame in the mapped payload
///
/// Valid until the producer wraps around onto the same slot, i.e. while the
/// write cursor stays below `epoch + capacity`.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    bytes: &'a [u8],
    epoch: u64,
    capacity: u64,
    payload_offset: usize,
}

impl<'a> FrameView<'a> {
    /// Host address of the first byte
    pub fn address(&self) -> usize {
        self.bytes.as_ptr() as usize
    }

    /// Frame length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the frame has no bytes
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Producer cursor at which this frame was written
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Offset of the frame from the start of the payload region
    pub fn payload_offset(&self) -> usize {
        self.payload_offset
    }

    /// Offset of the frame from the start of the mapping
    pub fn segment_offset(&self) -> usize {
        HEADER_SIZE + self.payload_offset
    }

    /// Whether the slot is still untouched at producer cursor `write_cursor`
    pub fn is_current(&self, write_cursor: u64) -> bool {
        write_cursor < self.epoch + self.capacity
    }

    /// Check validity against the live producer cursor
    pub fn is_valid(&self, buffer: &RingBufferHandle) -> bool {
        buffer
            .write_cursor()
            .map(|w| self.is_current(w))
            .unwrap_or(false)
    }

    /// Frame bytes
    ///
    /// Callers must be done with them before the producer laps this slot.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Outcome of one [`FrameReader::next_frame`] call
#[derive(Debug)]
pub enum FrameRead<'a> {
    /// Next unread frame
    Frame(FrameView<'a>),
    /// Producer has not advanced; skip this cycle
    Empty,
    /// Producer lapped the reader; cursor moved to the write position
    DataLoss { dropped: u64 },
}

impl<'a> FrameRead<'a> {
    /// Whether this is a frame
    pub fn is_frame(&self) -> bool {
        matches!(self, FrameRead::Frame(_))
    }

    /// Convert non-frame outcomes into errors
    pub fn into_frame(self) -> Result<FrameView<'a>> {
        match self {
            FrameRead::Frame(view) => Ok(view),
            FrameRead::Empty => Err(IngestError::Empty),
            FrameRead::DataLoss { dropped } => Err(IngestError::data_loss(dropped)),
        }
    }
}

/// Reads frames in order for a single consumer
#[derive(Debug, Clone, Default)]
pub struct FrameReader {
    cursor: ReadCursor,
}

impl FrameReader {
    /// Reader starting at the beginning of the stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Reader that only sees frames published after this call
    pub fn attach(buffer: &RingBufferHandle) -> Result<Self> {
        Ok(Self {
            cursor: ReadCursor::at(buffer.write_cursor()?),
        })
    }

    /// Reader over an existing cursor
    pub fn with_cursor(cursor: ReadCursor) -> Self {
        Self { cursor }
    }

    /// This reader's cursor
    pub fn cursor(&self) -> &ReadCursor {
        &self.cursor
    }

    /// Read the next frame with this reader's cursor
    pub fn next_frame<'a>(&mut self, buffer: &'a RingBufferHandle) -> Result<FrameRead<'a>> {
        Self::read_next(buffer, &mut self.cursor)
    }

    /// Compare `cursor` with the producer and return the next frame
    ///
    /// Never blocks. `Empty` means the producer has published nothing new.
    /// More than one lap of lag yields `DataLoss` with every skipped frame
    /// counted, and the cursor jumps to the producer position.
    pub fn read_next<'a>(
        buffer: &'a RingBufferHandle,
        cursor: &mut ReadCursor,
    ) -> Result<FrameRead<'a>> {
        let geometry = buffer.geometry()?;
        let stride = geometry.frame_stride as u64;
        let write = buffer.write_cursor()?;
        let read = cursor.position();

        if write == read {
            return Ok(FrameRead::Empty);
        }

        if write < read {
            warn!(
                "producer cursor on {} went backwards ({} < {}), resyncing",
                buffer.name(),
                write,
                read
            );
            cursor.resync(write);
            return Ok(FrameRead::Empty);
        }

        let lag = write - read;
        if lag > geometry.capacity {
            let dropped = lag / stride;
            warn!(
                "reader on {} lapped: {} frames dropped, resyncing to {}",
                buffer.name(),
                dropped,
                write
            );
            cursor.record_loss(dropped);
            cursor.resync(write);
            return Ok(FrameRead::DataLoss { dropped });
        }

        if lag < stride {
            // Partial frame: cursor not yet at a full frame boundary
            return Ok(FrameRead::Empty);
        }

        let payload = buffer.payload()?;
        let offset = (read % geometry.capacity) as usize;
        let bytes = payload.get(offset..offset + stride as usize).ok_or_else(|| {
            IngestError::invalid_parameter(
                "cursor",
                format!("Frame at offset {} crosses the payload end", offset),
            )
        })?;

        cursor.advance(stride);
        debug!("frame {} at payload offset {}", read, offset);

        Ok(FrameRead::Frame(FrameView {
            bytes,
            epoch: read,
            capacity: geometry.capacity,
            payload_offset: offset,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::{RingBufferConfig, SegmentWriter};
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (SegmentWriter, RingBufferHandle) {
        let config = RingBufferConfig::new("/reader_test", HEADER_SIZE + 1024)
            .with_file_path(dir.path().join("ring"));
        let writer = SegmentWriter::create(config.clone(), 1024, 256).unwrap();
        let handle = RingBufferHandle::open_mapped(config).unwrap();
        (writer, handle)
    }

    #[test]
    fn test_empty_when_no_writes() {
        let dir = TempDir::new().unwrap();
        let (_writer, handle) = setup(&dir);
        let mut reader = FrameReader::new();
        assert!(matches!(reader.next_frame(&handle).unwrap(), FrameRead::Empty));
        assert_eq!(reader.cursor().position(), 0);
    }

    #[test]
    fn test_reads_frame_contents() {
        let dir = TempDir::new().unwrap();
        let (mut writer, handle) = setup(&dir);
        writer.write_frame(&[7u8; 256]).unwrap();

        let mut reader = FrameReader::new();
        let view = reader.next_frame(&handle).unwrap().into_frame().unwrap();
        assert_eq!(view.len(), 256);
        assert_eq!(view.epoch(), 0);
        assert_eq!(view.payload_offset(), 0);
        assert_eq!(view.segment_offset(), HEADER_SIZE);
        assert!(view.as_bytes().iter().all(|&b| b == 7));
        assert!(view.is_valid(&handle));
        assert_eq!(reader.cursor().frames_read(), 1);
    }

    #[test]
    fn test_view_expires_after_lap() {
        let dir = TempDir::new().unwrap();
        let (mut writer, handle) = setup(&dir);
        writer.write_frame(&[1u8; 256]).unwrap();

        let mut reader = FrameReader::new();
        let view = reader.next_frame(&handle).unwrap().into_frame().unwrap();
        assert!(view.is_current(768));
        writer.advance_frames(3);
        assert!(!view.is_valid(&handle));
    }

    #[test]
    fn test_producer_restart_resyncs() {
        let dir = TempDir::new().unwrap();
        let (mut writer, handle) = setup(&dir);
        writer.advance_frames(2);

        let mut reader = FrameReader::new();
        reader.next_frame(&handle).unwrap();
        reader.next_frame(&handle).unwrap();
        writer.restart();

        assert!(matches!(reader.next_frame(&handle).unwrap(), FrameRead::Empty));
        assert_eq!(reader.cursor().position(), 0);
        assert_eq!(reader.cursor().resyncs(), 1);
    }

    #[test]
    fn test_unmapped_handle_errors() {
        let dir = TempDir::new().unwrap();
        let (_writer, mut handle) = setup(&dir);
        handle.close();
        assert!(FrameReader::new().next_frame(&handle).is_err());
    }
}
