use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{ensure, Result};
use image::RgbImage;

use crate::error::PipelineError;

/// Largest interpolation multiplier a single request may ask for.
pub const MAX_MULTIPLIER: u32 = 64;

/// Packed RGB24 frame (`width * height * 3` bytes, row-major).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

/// Frames are shared between the loader, segments and the assembled timeline.
pub type SharedFrame = Arc<Frame>;

impl Frame {
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        ensure!(
            data.len() == expected,
            "RGB data length mismatch: expected {expected} ({width}x{height}x3), got {}",
            data.len()
        );
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Solid-color frame.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self {
            data,
            width,
            height,
        }
    }

    pub fn from_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
        }
    }

    pub fn to_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }
}

/// Interpolation multiplier, always a power of two in `1..=MAX_MULTIPLIER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Multiplier(u32);

impl Multiplier {
    pub const NONE: Multiplier = Multiplier(1);

    /// Clamp to at least 1, then round to the nearest power of two in log space
    /// (`2^round(log2(m))`): 3 -> 4, 5 -> 4, 6 -> 8.
    pub fn normalize(requested: i64) -> Result<Self, PipelineError> {
        let clamped = requested.max(1);
        if clamped == 1 {
            return Ok(Self::NONE);
        }

        let exponent = (clamped as f64).log2().round() as u32;
        let normalized = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        if normalized > MAX_MULTIPLIER as u64 {
            return Err(PipelineError::UnsupportedMultiplier {
                requested,
                normalized,
                max: MAX_MULTIPLIER,
            });
        }

        Ok(Self(normalized as u32))
    }

    /// Returns `None` unless `value` is already a supported power of two.
    pub fn from_power_of_two(value: u32) -> Option<Self> {
        (value.is_power_of_two() && value <= MAX_MULTIPLIER).then_some(Self(value))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Number of doubling passes needed to reach this multiplier.
    pub fn passes(self) -> u32 {
        self.0.trailing_zeros()
    }
}

impl std::fmt::Display for Multiplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x", self.0)
    }
}

/// One invocation of the render pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimationRequest {
    /// Input images in the order they were supplied; sorted by the loader.
    pub inputs: Vec<PathBuf>,
    /// Requested multiplier, normalized by the pipeline.
    pub multiplier: i64,
    pub fps: u32,
    pub output: Option<PathBuf>,
}

impl AnimationRequest {
    pub fn new(inputs: Vec<PathBuf>) -> Self {
        Self {
            inputs,
            multiplier: 2,
            fps: 24,
            output: None,
        }
    }

    pub fn with_multiplier(mut self, multiplier: i64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }
}
