//! FFmpeg encode of a numbered PNG sequence, plus the placeholder artifact used
//! when no encoder is installed and the pipeline is already degraded.

use std::collections::VecDeque;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::logging::ENCODER_STDERR_TARGET;
use crate::runtime;
use crate::types::SharedFrame;

pub const FRAME_PATTERN: &str = "frame_%06d.png";
pub const PLACEHOLDER_CONTENT: &[u8] = b"placeholder video content\n";

const CODEC: &str = "libx264";
const PIXEL_FORMAT: &str = "yuv420p";
const CRF: u32 = 17;
const PRESET: &str = "slow";
/// yuv420p needs even dimensions; odd panels get one padded row/column.
const EVEN_PAD_FILTER: &str = "pad=ceil(iw/2)*2:ceil(ih/2)*2";
const STDERR_TAIL_LINES: usize = 40;

pub fn frame_file_name(index: usize) -> String {
    format!("frame_{index:06}.png")
}

/// Write every frame as `frame_000000.png`, `frame_000001.png`, ... into `dir`.
pub fn materialize_frames(frames: &[SharedFrame], dir: &Path) -> Result<usize> {
    frames
        .par_iter()
        .enumerate()
        .try_for_each(|(index, frame)| {
            let path = dir.join(frame_file_name(index));
            let image = frame
                .to_image()
                .ok_or_else(|| anyhow!("frame {index} has an inconsistent pixel buffer"))?;
            image
                .save_with_format(&path, image::ImageFormat::Png)
                .with_context(|| format!("failed to write frame {}", path.display()))
        })?;

    debug!(dir = %dir.display(), frames = frames.len(), "Materialized frames");
    Ok(frames.len())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeJob {
    /// Directory holding the `frame_%06d.png` sequence.
    pub frames_dir: PathBuf,
    pub fps: u32,
    pub output_path: PathBuf,
}

impl EncodeJob {
    pub fn build_ffmpeg_args(&self) -> Vec<String> {
        vec![
            "-nostdin".into(),
            "-y".into(),
            "-framerate".into(),
            self.fps.to_string(),
            "-i".into(),
            self.frames_dir
                .join(FRAME_PATTERN)
                .to_string_lossy()
                .into_owned(),
            "-c:v".into(),
            CODEC.into(),
            "-pix_fmt".into(),
            PIXEL_FORMAT.into(),
            "-crf".into(),
            CRF.to_string(),
            "-preset".into(),
            PRESET.into(),
            "-vf".into(),
            EVEN_PAD_FILTER.into(),
            self.output_path.to_string_lossy().into_owned(),
        ]
    }
}

/// External video encoder, looked up by name or path on every use.
#[derive(Debug, Clone)]
pub struct VideoEncoder {
    binary: String,
}

impl Default for VideoEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl VideoEncoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn resolve(&self) -> Option<PathBuf> {
        runtime::resolve_binary(&self.binary)
    }

    pub fn is_available(&self) -> bool {
        self.resolve().is_some()
    }

    /// Run the encoder to completion. Stderr is streamed to the
    /// [`ENCODER_STDERR_TARGET`] log target; its tail is kept for the error.
    pub fn encode(&self, job: &EncodeJob) -> Result<()> {
        let program = self.resolve().ok_or_else(|| self.unavailable())?;
        let args = job.build_ffmpeg_args();
        debug!(program = %program.display(), ?args, "Starting video encoder");

        let mut child = match Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(self.unavailable().into());
            }
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to spawn {}", program.display()));
            }
        };

        let stderr = child
            .stderr
            .take()
            .context("encoder stderr was not captured")?;
        let stderr_thread = thread::spawn(move || {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(line) => {
                        debug!(target: ENCODER_STDERR_TARGET, "{}", line);
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                    Err(e) => {
                        debug!(target: ENCODER_STDERR_TARGET, "read error: {}", e);
                        break;
                    }
                }
            }
            Vec::from(tail).join("\n")
        });

        let status = child.wait().context("failed to wait for video encoder")?;
        let stderr = stderr_thread.join().unwrap_or_default();

        if !status.success() {
            return Err(PipelineError::EncoderFailed {
                status,
                stderr: stderr.trim().to_string(),
            }
            .into());
        }

        info!(
            output = %job.output_path.display(),
            fps = job.fps,
            "Video encoded"
        );
        Ok(())
    }

    fn unavailable(&self) -> PipelineError {
        PipelineError::EncoderUnavailable {
            binary: self.binary.clone(),
        }
    }
}

pub fn write_placeholder(path: &Path) -> Result<(), PipelineError> {
    fs::write(path, PLACEHOLDER_CONTENT).map_err(|source| PipelineError::Placeholder {
        path: path.to_path_buf(),
        source,
    })
}
