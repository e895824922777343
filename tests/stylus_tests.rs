//! Integration tests for stylus normalization

use spatial_ingest::{
    error::ErrorKind,
    stylus::{DeviceDestination, NormalizedSample, RawStylusSample, StylusPreprocessor},
};

const EPSILON: f32 = 1e-6;

fn read_samples(bytes: &[u8], count: usize) -> Vec<NormalizedSample> {
    (0..count)
        .map(|i| {
            let offset = i * NormalizedSample::STRIDE;
            let field = |n: usize| {
                let start = offset + n * 4;
                f32::from_ne_bytes(bytes[start..start + 4].try_into().unwrap())
            };
            NormalizedSample {
                x: field(0),
                y: field(1),
                vx: field(2),
                vy: field(3),
                pressure: field(4),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_values() {
        let sample = NormalizedSample::from_raw(&RawStylusSample::new(10, 20, 2048, 0, 255));
        assert_eq!(sample.x, 10.0);
        assert_eq!(sample.y, 20.0);
        assert!((sample.vx - 1.0).abs() < EPSILON);
        assert!(sample.vy.abs() < EPSILON);
        assert!((sample.pressure - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_tilt_quarter_turn() {
        let sample = NormalizedSample::from_raw(&RawStylusSample::new(0, 0, 0, 90, 255));
        assert!(sample.vx.abs() < 1e-5);
        assert!((sample.vy - 1.0).abs() < 1e-5);

        // Angles wrap at 360 degrees
        let wrapped = NormalizedSample::from_raw(&RawStylusSample::new(0, 0, 0, 450, 255));
        assert!((wrapped.vx - sample.vx).abs() < 1e-5);
        assert!((wrapped.vy - sample.vy).abs() < 1e-5);
    }

    #[test]
    fn test_tilt_scaled_by_magnitude() {
        for magnitude in [0u8, 51, 128, 255] {
            for angle in (0..360).step_by(15) {
                let sample =
                    NormalizedSample::from_raw(&RawStylusSample::new(0, 0, 0, angle, magnitude));
                let length = (sample.vx * sample.vx + sample.vy * sample.vy).sqrt();
                assert!((length - magnitude as f32 / 255.0).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_pressure_range_linear_and_monotonic() {
        let mut previous = -1.0f32;
        for pressure in 0..=u16::MAX {
            let value = NormalizedSample::from_raw(&RawStylusSample::new(0, 0, pressure, 0, 0)).pressure;
            assert!((0.0..=1.0).contains(&value));
            assert!(value >= previous);
            if pressure <= 4096 {
                assert!((value - pressure as f32 / 4096.0).abs() < EPSILON);
            } else {
                assert_eq!(value, 1.0);
            }
            previous = value;
        }
    }

    #[test]
    fn test_transform_is_pure() {
        let raw: Vec<_> = (0..32u16)
            .map(|i| RawStylusSample::new(i, i * 2, i * 128, i * 11, (i * 7) as u8))
            .collect();
        let preprocessor = StylusPreprocessor::new();

        let first: Vec<_> = preprocessor.normalize(&raw).collect();
        let second: Vec<_> = preprocessor.normalize(&raw).collect();
        assert_eq!(first, second);

        let expected: Vec<_> = raw.iter().map(NormalizedSample::from_raw).collect();
        assert_eq!(first, expected);
    }

    #[test]
    fn test_transform_writes_dense_layout() {
        let raw = vec![
            RawStylusSample::new(1, 2, 4096, 0, 255),
            RawStylusSample::new(3, 4, 0, 180, 255),
            RawStylusSample::new(5, 6, 1024, 270, 0),
        ];
        let mut output = vec![0u8; raw.len() * NormalizedSample::STRIDE];

        let written = {
            let mut destination = DeviceDestination::from_slice(&mut output);
            StylusPreprocessor::new().transform(&raw, &mut destination).unwrap()
        };
        assert_eq!(written, 3);

        let samples = read_samples(&output, 3);
        assert_eq!(samples[0].x, 1.0);
        assert_eq!(samples[0].pressure, 1.0);
        assert!((samples[1].vx + 1.0).abs() < 1e-5);
        assert_eq!(samples[1].y, 4.0);
        assert!((samples[2].pressure - 0.25).abs() < EPSILON);
        assert_eq!(samples[2].vx, 0.0);
    }

    #[test]
    fn test_transform_into_unaligned_destination() {
        let raw = vec![RawStylusSample::new(7, 8, 2048, 0, 255); 4];
        let mut backing = vec![0u8; 4 * NormalizedSample::STRIDE + 1];

        {
            let mut destination = DeviceDestination::from_slice(&mut backing[1..]);
            StylusPreprocessor::new().transform(&raw, &mut destination).unwrap();
        }

        let samples = read_samples(&backing[1..], 4);
        assert!(samples.iter().all(|s| s.x == 7.0 && (s.pressure - 0.5).abs() < EPSILON));
    }

    #[test]
    fn test_too_small_destination_is_untouched() {
        let raw = vec![RawStylusSample::new(1, 1, 1, 1, 1); 4];
        let mut output = vec![0xEEu8; 3 * NormalizedSample::STRIDE];

        let err = {
            let mut destination = DeviceDestination::from_slice(&mut output);
            StylusPreprocessor::new().transform(&raw, &mut destination).unwrap_err()
        };
        assert_eq!(err.kind(), ErrorKind::BufferTooSmall);
        assert!(output.iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn test_decode_packed_tensor() {
        let raw = vec![
            RawStylusSample::new(100, 200, 3000, 45, 17),
            RawStylusSample::new(u16::MAX, 0, 0, 359, 255),
        ];
        let bytes: Vec<u8> = raw.iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(bytes.len(), 2 * RawStylusSample::WIRE_SIZE);
        assert_eq!(RawStylusSample::decode_all(&bytes).unwrap(), raw);

        let err = RawStylusSample::decode_all(&bytes[..10]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }
}
