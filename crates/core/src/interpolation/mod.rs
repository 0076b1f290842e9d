//! Midpoint interpolation capability.
//!
//! The engine is chosen once per pipeline: a learned RIFE model when it can be
//! constructed, otherwise a plain 50/50 blend. A learned engine that fails on a
//! single pair falls back to the blend for that pair only.

pub mod blend;
pub mod rife;

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::types::Frame;

pub use blend::BlendInterpolator;
pub use rife::RifeInterpolator;

/// Produces the temporal halfway frame between two frames of equal size.
pub trait FrameInterpolator: Send + Sync {
    fn name(&self) -> &str;
    fn midpoint(&self, a: &Frame, b: &Frame) -> Result<Frame>;
}

/// Which engine the configuration asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Learned model when available, blend otherwise.
    #[default]
    Auto,
    Blend,
}

/// Which engine is actually running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    Learned,
    Blend,
}

impl std::fmt::Display for EngineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Learned => write!(f, "learned"),
            Self::Blend => write!(f, "blend"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub kind: EngineKind,
    pub model_path: PathBuf,
    pub device_id: i32,
}

pub enum InterpolationEngine {
    Learned(Box<dyn FrameInterpolator>),
    Blend(BlendInterpolator),
}

impl std::fmt::Debug for InterpolationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Learned(inner) => f.debug_tuple("Learned").field(&inner.name()).finish(),
            Self::Blend(_) => f.write_str("Blend"),
        }
    }
}

impl InterpolationEngine {
    /// Build the engine for a pipeline's lifetime. Degradation to blend mode is
    /// logged here, once.
    pub fn initialize(config: &EngineConfig) -> Self {
        match config.kind {
            EngineKind::Blend => {
                info!("Interpolation engine: blend (configured)");
                Self::blend()
            }
            EngineKind::Auto => match RifeInterpolator::load(&config.model_path, config.device_id)
            {
                Ok(rife) => {
                    info!(
                        model = %config.model_path.display(),
                        device_id = config.device_id,
                        format = ?rife.model_format(),
                        "Interpolation engine: RIFE"
                    );
                    Self::learned(Box::new(rife))
                }
                Err(error) => {
                    warn!(
                        model = %config.model_path.display(),
                        error = %format!("{error:#}"),
                        "RIFE unavailable, falling back to blend mode"
                    );
                    Self::blend()
                }
            },
        }
    }

    pub fn blend() -> Self {
        Self::Blend(BlendInterpolator)
    }

    pub fn learned(interpolator: Box<dyn FrameInterpolator>) -> Self {
        Self::Learned(interpolator)
    }

    pub fn mode(&self) -> EngineMode {
        match self {
            Self::Learned(_) => EngineMode::Learned,
            Self::Blend(_) => EngineMode::Blend,
        }
    }

    /// Midpoint of `a` and `b`. Only a dimension mismatch between the inputs is
    /// reported; learned-engine failures are absorbed by blending.
    pub fn midpoint(&self, a: &Frame, b: &Frame) -> Result<Frame> {
        match self {
            Self::Blend(blend) => blend.midpoint(a, b),
            Self::Learned(learned) => {
                ensure_same_dimensions(a, b)?;
                match learned.midpoint(a, b) {
                    Ok(frame) if frame.dimensions() == a.dimensions() => Ok(frame),
                    Ok(frame) => {
                        warn!(
                            engine = learned.name(),
                            expected = ?a.dimensions(),
                            got = ?frame.dimensions(),
                            "Learned midpoint has wrong size, blending this pair instead"
                        );
                        BlendInterpolator.midpoint(a, b)
                    }
                    Err(error) => {
                        warn!(
                            engine = learned.name(),
                            error = %format!("{error:#}"),
                            "Learned midpoint failed, blending this pair instead"
                        );
                        BlendInterpolator.midpoint(a, b)
                    }
                }
            }
        }
    }
}

pub(crate) fn ensure_same_dimensions(a: &Frame, b: &Frame) -> Result<(), PipelineError> {
    if a.dimensions() == b.dimensions() {
        return Ok(());
    }
    Err(PipelineError::DimensionMismatch {
        left_width: a.width(),
        left_height: a.height(),
        right_width: b.width(),
        right_height: b.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FailingInterpolator {
        calls: Arc<AtomicUsize>,
    }

    impl FrameInterpolator for FailingInterpolator {
        fn name(&self) -> &str {
            "failing"
        }

        fn midpoint(&self, _a: &Frame, _b: &Frame) -> Result<Frame> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            bail!("device lost")
        }
    }

    struct ConstantInterpolator;

    impl FrameInterpolator for ConstantInterpolator {
        fn name(&self) -> &str {
            "constant"
        }

        fn midpoint(&self, a: &Frame, _b: &Frame) -> Result<Frame> {
            Ok(Frame::filled(a.width(), a.height(), [7, 7, 7]))
        }
    }

    struct WrongSizeInterpolator;

    impl FrameInterpolator for WrongSizeInterpolator {
        fn name(&self) -> &str {
            "wrong-size"
        }

        fn midpoint(&self, _a: &Frame, _b: &Frame) -> Result<Frame> {
            Ok(Frame::filled(1, 1, [7, 7, 7]))
        }
    }

    #[test]
    fn test_blend_config_selects_blend_mode() {
        let engine = InterpolationEngine::initialize(&EngineConfig {
            kind: EngineKind::Blend,
            model_path: PathBuf::from("models/rife-v4.6.onnx"),
            device_id: 0,
        });
        assert_eq!(engine.mode(), EngineMode::Blend);
    }

    #[test]
    fn test_missing_model_degrades_to_blend() {
        let dir = tempfile::tempdir().unwrap();
        let engine = InterpolationEngine::initialize(&EngineConfig {
            kind: EngineKind::Auto,
            model_path: dir.path().join("missing.onnx"),
            device_id: 0,
        });
        assert_eq!(engine.mode(), EngineMode::Blend);
    }

    #[test]
    fn test_learned_failure_falls_back_per_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = InterpolationEngine::learned(Box::new(FailingInterpolator {
            calls: calls.clone(),
        }));
        assert_eq!(engine.mode(), EngineMode::Learned);

        let a = Frame::filled(2, 2, [0, 0, 0]);
        let b = Frame::filled(2, 2, [200, 100, 50]);
        let mid = engine.midpoint(&a, &b).expect("fallback blend");
        assert_eq!(mid.pixel(0, 0), [100, 50, 25]);

        engine.midpoint(&a, &b).expect("second fallback blend");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(engine.mode(), EngineMode::Learned);
    }

    #[test]
    fn test_learned_success_is_used() {
        let engine = InterpolationEngine::learned(Box::new(ConstantInterpolator));
        let a = Frame::filled(3, 3, [0, 0, 0]);
        let b = Frame::filled(3, 3, [255, 255, 255]);
        let mid = engine.midpoint(&a, &b).unwrap();
        assert_eq!(mid.pixel(1, 1), [7, 7, 7]);
    }

    #[test]
    fn test_learned_wrong_size_output_is_replaced_by_blend() {
        let engine = InterpolationEngine::learned(Box::new(WrongSizeInterpolator));
        let a = Frame::filled(3, 2, [0, 0, 0]);
        let b = Frame::filled(3, 2, [2, 4, 6]);
        let mid = engine.midpoint(&a, &b).unwrap();
        assert_eq!(mid.dimensions(), (3, 2));
        assert_eq!(mid.pixel(0, 0), [1, 2, 3]);
    }

    #[test]
    fn test_dimension_mismatch_is_reported() {
        let engine = InterpolationEngine::learned(Box::new(ConstantInterpolator));
        let a = Frame::filled(3, 2, [0, 0, 0]);
        let b = Frame::filled(2, 3, [0, 0, 0]);
        let err = engine.midpoint(&a, &b).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_engine_mode_display() {
        assert_eq!(EngineMode::Learned.to_string(), "learned");
        assert_eq!(EngineMode::Blend.to_string(), "blend");
    }
}
