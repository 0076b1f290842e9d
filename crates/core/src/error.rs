//! Typed failures the render pipeline reports to its caller.
//!
//! Anything not listed here (I/O, PNG encoding, ONNX Runtime) travels as a plain
//! `anyhow::Error` with context attached at the failure site.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Need at least 2 images to animate (loaded {loaded} of {requested})")]
    NotEnoughImages { loaded: usize, requested: usize },

    #[error("Unsupported multiplier {requested}: normalizes to {normalized}, maximum is {max}")]
    UnsupportedMultiplier {
        requested: i64,
        normalized: u64,
        max: u32,
    },

    #[error("Frame rate must be positive, got {0}")]
    InvalidFrameRate(u32),

    #[error("Frame dimensions differ: {left_width}x{left_height} vs {right_width}x{right_height}")]
    DimensionMismatch {
        left_width: u32,
        left_height: u32,
        right_width: u32,
        right_height: u32,
    },

    #[error("Video encoder '{binary}' not found. Please install FFmpeg.")]
    EncoderUnavailable { binary: String },

    #[error("Video encoder exited with {status}: {stderr}")]
    EncoderFailed { status: ExitStatus, stderr: String },

    #[error("Failed to write placeholder artifact {path}")]
    Placeholder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Validation errors are raised before any work is done and nothing is written.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotEnoughImages { .. }
                | Self::UnsupportedMultiplier { .. }
                | Self::InvalidFrameRate(_)
        )
    }
}
