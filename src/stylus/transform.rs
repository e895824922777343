//! Stylus preprocessing straight into the destination

use std::iter::FusedIterator;

use log::debug;

use crate::error::{IngestError, Result};

use super::{
    destination::DeviceDestination,
    sample::{NormalizedSample, PackedIter, PackedSamples, RawStylusSample},
};

/// One-pass sequence of normalized samples
///
/// Deliberately not `Clone`: once consumed it cannot be replayed.
#[derive(Debug)]
pub struct NormalizedSamples<'a> {
    raw: RawSource<'a>,
}

#[derive(Debug)]
enum RawSource<'a> {
    Samples(std::slice::Iter<'a, RawStylusSample>),
    Packed(PackedIter<'a>),
}

impl<'a> Iterator for NormalizedSamples<'a> {
    type Item = NormalizedSample;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.raw {
            RawSource::Samples(iter) => iter.next().map(NormalizedSample::from_raw),
            RawSource::Packed(iter) => iter.next().as_ref().map(NormalizedSample::from_raw),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.raw {
            RawSource::Samples(iter) => iter.size_hint(),
            RawSource::Packed(iter) => iter.size_hint(),
        }
    }
}

impl ExactSizeIterator for NormalizedSamples<'_> {}
impl FusedIterator for NormalizedSamples<'_> {}

/// Converts raw polar stylus samples into normalized vectors
#[derive(Debug, Clone, Copy, Default)]
pub struct StylusPreprocessor;

impl StylusPreprocessor {
    /// Create a preprocessor
    pub fn new() -> Self {
        Self
    }

    /// Bytes needed to hold `count` normalized samples
    pub fn required_capacity(count: usize) -> Option<usize> {
        count.checked_mul(NormalizedSample::STRIDE)
    }

    /// Lazily normalize `raw`
    pub fn normalize<'a>(&self, raw: &'a [RawStylusSample]) -> NormalizedSamples<'a> {
        NormalizedSamples {
            raw: RawSource::Samples(raw.iter()),
        }
    }

    /// Lazily decode and normalize a packed tensor
    pub fn normalize_packed<'a>(&self, packed: PackedSamples<'a>) -> NormalizedSamples<'a> {
        NormalizedSamples {
            raw: RawSource::Packed(packed.iter()),
        }
    }

    /// Normalize `raw` into `destination` at a fixed 20-byte stride
    ///
    /// Fails with `BufferTooSmall` before writing anything when the whole
    /// batch does not fit. Returns the number of samples written.
    pub fn transform(
        &self,
        raw: &[RawStylusSample],
        destination: &mut DeviceDestination<'_>,
    ) -> Result<usize> {
        self.write_all(self.normalize(raw), destination)
    }

    /// Same as [`transform`](Self::transform), reading packed records in place
    pub fn transform_packed(
        &self,
        packed: PackedSamples<'_>,
        destination: &mut DeviceDestination<'_>,
    ) -> Result<usize> {
        self.write_all(self.normalize_packed(packed), destination)
    }

    fn write_all(
        &self,
        samples: NormalizedSamples<'_>,
        destination: &mut DeviceDestination<'_>,
    ) -> Result<usize> {
        let required = Self::required_capacity(samples.len())
            .ok_or_else(|| IngestError::buffer_too_small(usize::MAX, destination.capacity()))?;
        if destination.capacity() < required {
            return Err(IngestError::buffer_too_small(required, destination.capacity()));
        }

        let mut written = 0;
        for (index, sample) in samples.enumerate() {
            destination.write_unaligned(index * NormalizedSample::STRIDE, sample)?;
            written += 1;
        }

        debug!(
            "normalized {} stylus samples into {}",
            written,
            destination.device_address()
        );
        Ok(written)
    }
}
