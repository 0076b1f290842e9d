//! RIFE midpoint synthesis on ONNX Runtime.
//!
//! Supports both common RIFE exports: three inputs (`img0`, `img1`, `timestep`)
//! and a single 7-channel `input` tensor (RGB, RGB, timestep plane). Frames are
//! padded to a multiple of 32 with mirrored edges and cropped after inference.

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{anyhow, bail, ensure, Context, Result};
use ndarray::{s, Array4, ArrayD, Ix4};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
    value::{Tensor, TensorRef},
};
use tracing::debug;

use super::{ensure_same_dimensions, FrameInterpolator};
use crate::runtime;
use crate::types::Frame;

const PAD_ALIGN: usize = 32;
const MIDPOINT_TIMESTEP: f32 = 0.5;

const INPUT_IMG0: &str = "img0";
const INPUT_IMG1: &str = "img1";
const INPUT_TIMESTEP: &str = "timestep";
const INPUT_CONCAT: &str = "input";
const OUTPUT_NAME: &str = "output";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// `img0` + `img1` + `timestep` as separate tensors.
    ThreeInput,
    /// One `[1, 7, H, W]` tensor.
    Concatenated,
}

pub struct RifeInterpolator {
    session: Mutex<Session>,
    format: ModelFormat,
}

impl RifeInterpolator {
    /// Load a RIFE model onto CUDA device `device_id`.
    ///
    /// Fails without touching ONNX Runtime when the model file or the runtime
    /// library is missing.
    pub fn load(model_path: &Path, device_id: i32) -> Result<Self> {
        if !model_path.is_file() {
            bail!("RIFE model not found at {}", model_path.display());
        }
        if runtime::ort_library_path().is_none() {
            bail!("ONNX Runtime library not found (set ORT_DYLIB_PATH or place it next to the executable)");
        }

        let started = Instant::now();
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers([CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build()])?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load RIFE model {}", model_path.display()))?;

        let format = detect_model_format(&session);
        debug!(
            model = %model_path.display(),
            device_id,
            ?format,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "RIFE session ready"
        );

        Ok(Self {
            session: Mutex::new(session),
            format,
        })
    }

    pub fn model_format(&self) -> ModelFormat {
        self.format
    }

    fn run(&self, img0: &Array4<f32>, img1: &Array4<f32>) -> Result<ArrayD<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("RIFE session lock poisoned"))?;

        match self.format {
            ModelFormat::ThreeInput => {
                let tensor0 = Tensor::from_array(img0.clone())?;
                let tensor1 = Tensor::from_array(img1.clone())?;
                let timestep =
                    Tensor::from_array(Array4::<f32>::from_elem((1, 1, 1, 1), MIDPOINT_TIMESTEP))?;
                let outputs = session.run(ort::inputs![
                    INPUT_IMG0 => &tensor0,
                    INPUT_IMG1 => &tensor1,
                    INPUT_TIMESTEP => &timestep
                ])?;
                let view = outputs[OUTPUT_NAME].try_extract_array::<f32>()?;
                Ok(view.to_owned())
            }
            ModelFormat::Concatenated => {
                let concat = concat_with_timestep(img0, img1, MIDPOINT_TIMESTEP);
                let tensor = TensorRef::from_array_view(concat.view())?;
                let outputs = session.run(ort::inputs![INPUT_CONCAT => tensor])?;
                let view = outputs[OUTPUT_NAME].try_extract_array::<f32>()?;
                Ok(view.to_owned())
            }
        }
    }
}

impl FrameInterpolator for RifeInterpolator {
    fn name(&self) -> &str {
        "rife"
    }

    fn midpoint(&self, a: &Frame, b: &Frame) -> Result<Frame> {
        ensure_same_dimensions(a, b)?;
        let (w, h) = (a.width() as usize, a.height() as usize);

        let started = Instant::now();
        let img0 = rgb_to_padded_nchw(a.data(), w, h)?;
        let img1 = rgb_to_padded_nchw(b.data(), w, h)?;
        let output = self.run(&img0, &img1)?;
        let cropped = crop_output(output, h, w)?;
        let data = nchw_to_rgb(&cropped, h, w);

        debug!(
            width = w,
            height = h,
            elapsed_ms = format!("{:.1}", started.elapsed().as_secs_f64() * 1000.0),
            "RIFE midpoint"
        );

        Frame::from_rgb(a.width(), a.height(), data)
    }
}

fn detect_model_format(session: &Session) -> ModelFormat {
    let inputs = session.inputs();
    if inputs.len() == 1 && inputs[0].name() == INPUT_CONCAT {
        ModelFormat::Concatenated
    } else {
        ModelFormat::ThreeInput
    }
}

fn pad_amount(dim: usize) -> usize {
    (PAD_ALIGN - (dim % PAD_ALIGN)) % PAD_ALIGN
}

/// Symmetric mirror of `i` into `0..n` (edge sample repeated), valid for any `i`.
fn mirror_index(i: usize, n: usize) -> usize {
    let period = 2 * n;
    let m = i % period;
    if m < n {
        m
    } else {
        period - 1 - m
    }
}

/// Packed RGB24 to normalized `[1, 3, H', W']`, with H' and W' rounded up to the
/// model alignment and the extra rows/columns mirrored from the image.
fn rgb_to_padded_nchw(data: &[u8], w: usize, h: usize) -> Result<Array4<f32>> {
    ensure!(w > 0 && h > 0, "Cannot interpolate an empty {w}x{h} frame");
    ensure!(
        data.len() == w * h * 3,
        "RGB buffer has {} bytes, expected {}",
        data.len(),
        w * h * 3
    );

    let padded_h = h + pad_amount(h);
    let padded_w = w + pad_amount(w);
    let mut nchw = Array4::<f32>::zeros((1, 3, padded_h, padded_w));

    for y in 0..padded_h {
        let src_y = mirror_index(y, h);
        for x in 0..padded_w {
            let src = (src_y * w + mirror_index(x, w)) * 3;
            for c in 0..3 {
                nchw[[0, c, y, x]] = data[src + c] as f32 / 255.0;
            }
        }
    }

    Ok(nchw)
}

fn concat_with_timestep(img0: &Array4<f32>, img1: &Array4<f32>, timestep: f32) -> Array4<f32> {
    let (h, w) = (img0.shape()[2], img0.shape()[3]);
    let mut concat = Array4::<f32>::from_elem((1, 7, h, w), timestep);
    concat.slice_mut(s![.., 0..3, .., ..]).assign(img0);
    concat.slice_mut(s![.., 3..6, .., ..]).assign(img1);
    concat
}

fn crop_output(output: ArrayD<f32>, h: usize, w: usize) -> Result<Array4<f32>> {
    let output = output
        .into_dimensionality::<Ix4>()
        .context("RIFE output is not a 4-D tensor")?;
    let shape = output.shape();
    ensure!(
        shape[1] >= 3 && shape[2] >= h && shape[3] >= w,
        "RIFE output shape {shape:?} too small for {w}x{h}"
    );
    Ok(output.slice(s![.., ..3, ..h, ..w]).to_owned())
}

fn nchw_to_rgb(arr: &Array4<f32>, h: usize, w: usize) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(h * w * 3);
    for y in 0..h {
        for x in 0..w {
            for c in 0..3 {
                rgb.push((arr[[0, c, y, x]] * 255.0 + 0.5).clamp(0.0, 255.0) as u8);
            }
        }
    }
    rgb
}
