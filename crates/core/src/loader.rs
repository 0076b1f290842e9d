//! Image loading: natural-order sort by file name, decode, skip what cannot be read.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::imageops::FilterType;
use tracing::{debug, warn};

use crate::natural_order::natural_cmp_file_names;
use crate::types::{Frame, SharedFrame};

/// Sort a copy of `paths` by natural order of their file names.
pub fn sort_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut sorted = paths.to_vec();
    sorted.sort_by(|a, b| natural_cmp_file_names(a, b));
    sorted
}

/// Decode every readable image in natural file-name order.
///
/// Unreadable entries are logged and skipped. Frames whose size differs from the
/// first decoded frame are resized to match it, so every frame of a run shares
/// one set of dimensions.
pub fn load_frames(paths: &[PathBuf]) -> Vec<SharedFrame> {
    let mut frames: Vec<SharedFrame> = Vec::with_capacity(paths.len());
    let mut target: Option<(u32, u32)> = None;

    for path in sort_paths(paths) {
        let Some(image) = decode(&path) else {
            continue;
        };

        let image = match target {
            None => {
                target = Some(image.dimensions());
                image
            }
            Some((width, height)) if image.dimensions() != (width, height) => {
                warn!(
                    path = %path.display(),
                    from = %format!("{}x{}", image.width(), image.height()),
                    to = %format!("{width}x{height}"),
                    "Resizing image to match the first frame"
                );
                image::imageops::resize(&image, width, height, FilterType::Triangle)
            }
            Some(_) => image,
        };

        debug!(path = %path.display(), index = frames.len(), "Loaded image");
        frames.push(Arc::new(Frame::from_image(image)));
    }

    frames
}

fn decode(path: &Path) -> Option<image::RgbImage> {
    match image::open(path) {
        Ok(image) => Some(image.to_rgb8()),
        Err(error) => {
            warn!(path = %path.display(), error = %error, "Could not read image, skipping");
            None
        }
    }
}
