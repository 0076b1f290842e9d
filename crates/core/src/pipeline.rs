//! Panels in, video out.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use tempfile::{TempDir, TempPath};
use tracing::{debug, info, warn};

use crate::assembler::assemble_timeline;
use crate::config::AppConfig;
use crate::encoder::{materialize_frames, write_placeholder, EncodeJob, VideoEncoder};
use crate::error::PipelineError;
use crate::interpolation::{EngineMode, InterpolationEngine};
use crate::loader::load_frames;
use crate::types::{AnimationRequest, Multiplier};

const OUTPUT_PREFIX: &str = "mangamotion-";
const OUTPUT_SUFFIX: &str = ".mp4";
const FRAMES_DIR_PREFIX: &str = "mangamotion-frames-";

/// Owns one interpolation engine for its lifetime. `render` takes `&self` and
/// keeps all per-request state local, so one pipeline can serve concurrent
/// requests.
#[derive(Debug)]
pub struct Pipeline {
    engine: InterpolationEngine,
    encoder: VideoEncoder,
    work_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
}

enum Destination {
    Explicit(PathBuf),
    /// Deleted on drop unless kept, so a failed request leaves nothing behind.
    Allocated(TempPath),
}

impl Destination {
    fn path(&self) -> &Path {
        match self {
            Self::Explicit(path) => path,
            Self::Allocated(temp) => temp,
        }
    }

    fn keep(self) -> Result<PathBuf> {
        match self {
            Self::Explicit(path) => Ok(path),
            Self::Allocated(temp) => temp.keep().context("failed to keep output file"),
        }
    }
}

impl Pipeline {
    pub fn new(engine: InterpolationEngine, encoder: VideoEncoder) -> Self {
        Self {
            engine,
            encoder,
            work_dir: None,
            output_dir: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let engine = InterpolationEngine::initialize(&config.engine_config());
        Self::new(engine, VideoEncoder::new(config.encoder.binary.clone()))
            .with_work_dir(config.paths.work_dir.clone())
            .with_output_dir(config.paths.output_dir.clone())
    }

    pub fn with_work_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.work_dir = dir;
        self
    }

    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.output_dir = dir;
        self
    }

    pub fn mode(&self) -> EngineMode {
        self.engine.mode()
    }

    pub fn encoder(&self) -> &VideoEncoder {
        &self.encoder
    }

    /// Render `request` to a video file and return its path.
    ///
    /// Validation failures return before anything is written. Frame images
    /// are materialized in a private temporary directory that is removed on
    /// every exit path.
    pub fn render(&self, request: &AnimationRequest) -> Result<PathBuf> {
        let started = Instant::now();

        let multiplier = Multiplier::normalize(request.multiplier)?;
        if request.fps == 0 {
            return Err(PipelineError::InvalidFrameRate(request.fps).into());
        }

        let frames = load_frames(&request.inputs);
        if frames.len() < 2 {
            return Err(PipelineError::NotEnoughImages {
                loaded: frames.len(),
                requested: request.inputs.len(),
            }
            .into());
        }

        info!(
            images = frames.len(),
            requested_multiplier = request.multiplier,
            multiplier = %multiplier,
            fps = request.fps,
            mode = %self.mode(),
            "Rendering animation"
        );

        let timeline = assemble_timeline(&self.engine, &frames, multiplier)?;
        drop(frames);

        let destination = self.prepare_destination(request.output.as_deref())?;
        let frames_dir = self.create_frames_dir()?;
        materialize_frames(&timeline, frames_dir.path())?;

        let job = EncodeJob {
            frames_dir: frames_dir.path().to_path_buf(),
            fps: request.fps,
            output_path: destination.path().to_path_buf(),
        };

        match self.encoder.encode(&job) {
            Ok(()) => {}
            Err(error) if self.mode() == EngineMode::Blend && is_encoder_unavailable(&error) => {
                warn!(
                    encoder = self.encoder.binary(),
                    output = %destination.path().display(),
                    "Video encoder not installed, writing placeholder artifact"
                );
                write_placeholder(destination.path())?;
            }
            Err(error) => return Err(error),
        }

        let output = destination.keep()?;
        info!(
            output = %output.display(),
            frames = timeline.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Render finished"
        );
        Ok(output)
    }

    fn prepare_destination(&self, requested: Option<&Path>) -> Result<Destination> {
        if let Some(path) = requested {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create output directory: {}", parent.display())
                })?;
            }
            return Ok(Destination::Explicit(path.to_path_buf()));
        }

        let dir = match &self.output_dir {
            Some(dir) => {
                fs::create_dir_all(dir).with_context(|| {
                    format!("failed to create output directory: {}", dir.display())
                })?;
                dir.clone()
            }
            None => std::env::temp_dir(),
        };

        let file = tempfile::Builder::new()
            .prefix(OUTPUT_PREFIX)
            .suffix(OUTPUT_SUFFIX)
            .tempfile_in(&dir)
            .with_context(|| format!("failed to allocate output file in {}", dir.display()))?;
        let path = file.into_temp_path();
        debug!(output = %path.display(), "Allocated output file");
        Ok(Destination::Allocated(path))
    }

    fn create_frames_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(FRAMES_DIR_PREFIX);
        match &self.work_dir {
            Some(root) => {
                fs::create_dir_all(root).with_context(|| {
                    format!("failed to create work directory: {}", root.display())
                })?;
                builder
                    .tempdir_in(root)
                    .with_context(|| format!("failed to create frames dir in {}", root.display()))
            }
            None => builder.tempdir().context("failed to create frames dir"),
        }
    }
}

fn is_encoder_unavailable(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<PipelineError>(),
        Some(PipelineError::EncoderUnavailable { .. })
    )
}
