//! Luma frame type and motion scoring

use image::GrayImage;
use std::time::Instant;

/// Size in bytes of one YUV420 frame (full luma plane plus quarter-size U and V)
pub fn yuv420_frame_size(width: u32, height: u32) -> usize {
    let luma = width as usize * height as usize;
    luma + luma / 2
}

/// Single-channel brightness frame
#[derive(Debug, Clone)]
pub struct LumaFrame {
    /// Luma samples, row-major
    image: GrayImage,
    /// Time the frame was pulled from the source
    captured_at: Instant,
    /// Frame sequence number
    sequence: u64,
}

impl LumaFrame {
    /// Create a frame from raw luma samples (`width * height` bytes)
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        captured_at: Instant,
        sequence: u64,
    ) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let image = GrayImage::from_raw(width, height, data)?;
        Some(Self {
            image,
            captured_at,
            sequence,
        })
    }

    /// Extract the luma plane from a raw YUV420 buffer.
    ///
    /// Returns `None` when the buffer is shorter than one full frame.
    pub fn from_yuv420(
        buffer: &[u8],
        width: u32,
        height: u32,
        captured_at: Instant,
        sequence: u64,
    ) -> Option<Self> {
        if buffer.len() < yuv420_frame_size(width, height) {
            return None;
        }
        let luma = buffer.get(..width as usize * height as usize)?;
        Self::new(luma.to_vec(), width, height, captured_at, sequence)
    }

    /// Frame width
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Frame height
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Raw luma samples
    pub fn data(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Mean absolute pixel-wise difference against `previous`.
    ///
    /// Samples are widened to `i16` before subtracting so that `0 - 255`
    /// does not wrap. Returns `None` if the frames differ in size.
    pub fn mean_abs_diff(&self, previous: &LumaFrame) -> Option<f64> {
        if self.width() != previous.width() || self.height() != previous.height() {
            return None;
        }

        let total: u64 = self
            .data()
            .iter()
            .zip(previous.data())
            .map(|(&a, &b)| u64::from((i16::from(a) - i16::from(b)).unsigned_abs()))
            .sum();

        Some(total as f64 / self.data().len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn solid(value: u8, width: u32, height: u32) -> LumaFrame {
        LumaFrame::new(
            vec![value; (width * height) as usize],
            width,
            height,
            Instant::now(),
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_mismatched_buffer() {
        assert!(LumaFrame::new(vec![0; 10], 4, 4, Instant::now(), 0).is_none());
        assert!(LumaFrame::new(vec![], 0, 0, Instant::now(), 0).is_none());
    }

    #[test]
    fn test_from_yuv420_takes_luma_plane() {
        let mut buffer = vec![7u8; 4 * 2];
        buffer.extend_from_slice(&[200u8; 4]); // chroma
        let frame = LumaFrame::from_yuv420(&buffer, 4, 2, Instant::now(), 1).unwrap();
        assert_eq!(frame.data(), &[7u8; 8]);
        assert_eq!(frame.sequence(), 1);
    }

    #[test]
    fn test_from_yuv420_short_buffer() {
        let buffer = vec![0u8; yuv420_frame_size(4, 2) - 1];
        assert!(LumaFrame::from_yuv420(&buffer, 4, 2, Instant::now(), 0).is_none());
    }

    #[test]
    fn test_diff_does_not_wrap() {
        let dark = solid(0, 8, 8);
        let bright = solid(255, 8, 8);
        assert_eq!(dark.mean_abs_diff(&bright), Some(255.0));
        assert_eq!(bright.mean_abs_diff(&dark), Some(255.0));
    }

    #[test]
    fn test_diff_is_mean_over_all_samples() {
        let previous = LumaFrame::new(vec![10, 10, 10, 10], 2, 2, Instant::now(), 0).unwrap();
        let current = LumaFrame::new(vec![30, 10, 0, 10], 2, 2, Instant::now(), 1).unwrap();
        // (20 + 0 + 10 + 0) / 4
        assert_eq!(current.mean_abs_diff(&previous), Some(7.5));
    }

    #[test]
    fn test_diff_size_mismatch() {
        assert!(solid(0, 4, 4).mean_abs_diff(&solid(0, 2, 8)).is_none());
    }

    proptest! {
        #[test]
        fn prop_diff_symmetric_and_bounded(
            a in proptest::collection::vec(any::<u8>(), 16),
            b in proptest::collection::vec(any::<u8>(), 16),
        ) {
            let fa = LumaFrame::new(a, 4, 4, Instant::now(), 0).unwrap();
            let fb = LumaFrame::new(b, 4, 4, Instant::now(), 1).unwrap();
            let ab = fa.mean_abs_diff(&fb).unwrap();
            let ba = fb.mean_abs_diff(&fa).unwrap();
            prop_assert!((ab - ba).abs() < 1e-9);
            prop_assert!((0.0..=255.0).contains(&ab));
            prop_assert!(fa.mean_abs_diff(&fa).unwrap().abs() < 1e-9);
        }
    }
}
