//! Raw and normalized stylus sample types

use crate::error::{IngestError, Result};

/// Full-scale raw pressure
pub const PRESSURE_MAX: u16 = 4096;
/// Full-scale tilt magnitude
pub const TILT_MAGNITUDE_MAX: u8 = 255;

/// Stylus sample as delivered by the digitizer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RawStylusSample {
    pub x: u16,
    pub y: u16,
    /// 0..=4096; larger values are clamped
    pub pressure: u16,
    /// Degrees, 0..360
    pub tilt_angle: u16,
    pub tilt_magnitude: u8,
}

impl RawStylusSample {
    /// Packed little-endian size in a raw input tensor
    pub const WIRE_SIZE: usize = 9;

    /// Create a sample
    pub fn new(x: u16, y: u16, pressure: u16, tilt_angle: u16, tilt_magnitude: u8) -> Self {
        Self {
            x,
            y,
            pressure,
            tilt_angle,
            tilt_magnitude,
        }
    }

    /// Decode one packed sample
    pub fn from_le_bytes(bytes: [u8; Self::WIRE_SIZE]) -> Self {
        Self {
            x: u16::from_le_bytes([bytes[0], bytes[1]]),
            y: u16::from_le_bytes([bytes[2], bytes[3]]),
            pressure: u16::from_le_bytes([bytes[4], bytes[5]]),
            tilt_angle: u16::from_le_bytes([bytes[6], bytes[7]]),
            tilt_magnitude: bytes[8],
        }
    }

    /// Encode as packed little-endian bytes
    pub fn to_le_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        out[0..2].copy_from_slice(&self.x.to_le_bytes());
        out[2..4].copy_from_slice(&self.y.to_le_bytes());
        out[4..6].copy_from_slice(&self.pressure.to_le_bytes());
        out[6..8].copy_from_slice(&self.tilt_angle.to_le_bytes());
        out[8] = self.tilt_magnitude;
        out
    }

    /// Decode a packed raw tensor into owned samples
    pub fn decode_all(bytes: &[u8]) -> Result<Vec<RawStylusSample>> {
        Ok(PackedSamples::new(bytes)?.iter().collect())
    }
}

/// Borrowed raw tensor of packed 9-byte samples, decoded on demand
#[derive(Debug, Clone, Copy)]
pub struct PackedSamples<'a> {
    bytes: &'a [u8],
}

impl<'a> PackedSamples<'a> {
    /// Wrap `bytes`, which must hold a whole number of samples
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() % RawStylusSample::WIRE_SIZE != 0 {
            return Err(IngestError::invalid_parameter(
                "input",
                format!(
                    "Raw stylus tensor of {} bytes is not a multiple of {}",
                    bytes.len(),
                    RawStylusSample::WIRE_SIZE
                ),
            ));
        }
        Ok(Self { bytes })
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.bytes.len() / RawStylusSample::WIRE_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decode samples one at a time
    pub fn iter(&self) -> PackedIter<'a> {
        PackedIter {
            chunks: self.bytes.chunks_exact(RawStylusSample::WIRE_SIZE),
        }
    }
}

/// Iterator over [`PackedSamples`]
#[derive(Debug, Clone)]
pub struct PackedIter<'a> {
    chunks: std::slice::ChunksExact<'a, u8>,
}

impl Iterator for PackedIter<'_> {
    type Item = RawStylusSample;

    fn next(&mut self) -> Option<Self::Item> {
        self.chunks.next().map(|chunk| {
            let mut packed = [0u8; RawStylusSample::WIRE_SIZE];
            packed.copy_from_slice(chunk);
            RawStylusSample::from_le_bytes(packed)
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for PackedIter<'_> {}
impl std::iter::FusedIterator for PackedIter<'_> {}

/// Normalized stylus sample as laid out in device memory
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizedSample {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    /// 0.0..=1.0
    pub pressure: f32,
}

impl NormalizedSample {
    /// Bytes between consecutive samples in the destination
    pub const STRIDE: usize = std::mem::size_of::<NormalizedSample>();

    /// Deterministic transform of one raw sample
    ///
    /// `pressure = min(p, 4096) / 4096`, and the tilt vector is the unit
    /// direction of `tilt_angle` degrees scaled by `tilt_magnitude / 255`.
    pub fn from_raw(raw: &RawStylusSample) -> Self {
        let pressure = raw.pressure.min(PRESSURE_MAX) as f32 / PRESSURE_MAX as f32;
        let magnitude = raw.tilt_magnitude as f32 / TILT_MAGNITUDE_MAX as f32;
        let radians = ((raw.tilt_angle % 360) as f32).to_radians();

        Self {
            x: raw.x as f32,
            y: raw.y as f32,
            vx: magnitude * radians.cos(),
            vy: magnitude * radians.sin(),
            pressure,
        }
    }

    /// Output tuple `(x, y, vx, vy, pressure)`
    pub fn as_tuple(&self) -> (f32, f32, f32, f32, f32) {
        (self.x, self.y, self.vx, self.vy, self.pressure)
    }
}

impl From<&RawStylusSample> for NormalizedSample {
    fn from(raw: &RawStylusSample) -> Self {
        Self::from_raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride() {
        assert_eq!(NormalizedSample::STRIDE, 20);
    }

    #[test]
    fn test_wire_decoding() {
        let raw = RawStylusSample::new(100, 200, 2048, 45, 128);
        let bytes = raw.to_le_bytes();
        assert_eq!(bytes[0..2], [100, 0]);
        assert_eq!(bytes[8], 128);
        assert_eq!(RawStylusSample::from_le_bytes(bytes), raw);

        let mut tensor = bytes.to_vec();
        tensor.extend_from_slice(&RawStylusSample::new(1, 2, 3, 4, 5).to_le_bytes());
        let decoded = RawStylusSample::decode_all(&tensor).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1].tilt_angle, 4);

        assert!(RawStylusSample::decode_all(&tensor[..10]).is_err());
    }

    #[test]
    fn test_packed_view_decodes_lazily() {
        let raw = [
            RawStylusSample::new(5, 6, 700, 30, 9),
            RawStylusSample::new(7, 8, 900, 60, 10),
        ];
        let tensor: Vec<u8> = raw.iter().flat_map(|s| s.to_le_bytes()).collect();

        let packed = PackedSamples::new(&tensor).unwrap();
        assert_eq!(packed.len(), 2);
        let mut iter = packed.iter();
        assert_eq!(iter.len(), 2);
        assert_eq!(iter.next(), Some(raw[0]));
        assert_eq!(iter.next(), Some(raw[1]));
        assert_eq!(iter.next(), None);

        assert!(PackedSamples::new(&tensor[..17]).is_err());
        assert!(PackedSamples::new(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_reference_values() {
        let n = NormalizedSample::from_raw(&RawStylusSample::new(10, 20, 2048, 0, 255));
        assert_eq!(n.as_tuple(), (10.0, 20.0, 1.0, 0.0, 0.5));
    }

    #[test]
    fn test_pressure_clamped() {
        let n = NormalizedSample::from_raw(&RawStylusSample::new(0, 0, u16::MAX, 0, 0));
        assert_eq!(n.pressure, 1.0);
        assert_eq!(n.vx, 0.0);
    }
}
