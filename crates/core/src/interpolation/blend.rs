use anyhow::Result;

use super::{ensure_same_dimensions, FrameInterpolator};
use crate::types::Frame;

/// Per-channel 50/50 average, rounded half up. Never fails on equal-sized input.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlendInterpolator;

impl FrameInterpolator for BlendInterpolator {
    fn name(&self) -> &str {
        "blend"
    }

    fn midpoint(&self, a: &Frame, b: &Frame) -> Result<Frame> {
        ensure_same_dimensions(a, b)?;

        let data = a
            .data()
            .iter()
            .zip(b.data())
            .map(|(&x, &y)| ((x as u16 + y as u16 + 1) / 2) as u8)
            .collect();

        Frame::from_rgb(a.width(), a.height(), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_averages_channels() {
        let red = Frame::filled(4, 4, [255, 0, 0]);
        let blue = Frame::filled(4, 4, [0, 0, 255]);
        let mid = BlendInterpolator.midpoint(&red, &blue).unwrap();
        assert_eq!(mid.dimensions(), (4, 4));
        assert_eq!(mid.pixel(0, 0), [128, 0, 128]);
        assert_eq!(mid.pixel(3, 3), [128, 0, 128]);
    }

    #[test]
    fn test_blend_is_symmetric() {
        let a = Frame::from_rgb(2, 1, vec![1, 2, 3, 250, 251, 252]).unwrap();
        let b = Frame::from_rgb(2, 1, vec![9, 8, 7, 0, 1, 2]).unwrap();
        let ab = BlendInterpolator.midpoint(&a, &b).unwrap();
        let ba = BlendInterpolator.midpoint(&b, &a).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.data(), &[5, 5, 5, 125, 126, 127]);
    }

    #[test]
    fn test_blend_of_identical_frames_is_identity() {
        let frame = Frame::filled(3, 3, [42, 17, 99]);
        let mid = BlendInterpolator.midpoint(&frame, &frame).unwrap();
        assert_eq!(mid, frame);
    }

    #[test]
    fn test_blend_rejects_mismatched_sizes() {
        let a = Frame::filled(4, 4, [0, 0, 0]);
        let b = Frame::filled(4, 5, [0, 0, 0]);
        let err = BlendInterpolator.midpoint(&a, &b).unwrap_err();
        assert!(err.to_string().contains("Frame dimensions differ"));
    }
}
