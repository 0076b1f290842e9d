//! Stitches per-pair segments into one timeline.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::error::PipelineError;
use crate::interpolation::InterpolationEngine;
use crate::segment::interpolate_segment;
use crate::types::{Multiplier, SharedFrame};

/// Build the full frame sequence for `frames` at `multiplier`.
///
/// Segment `k` covers `frames[k]..=frames[k + 1]`; every segment after the first
/// drops its leading anchor so shared anchors appear once. The result holds
/// `1 + (n - 1) * m` frames and contains every input frame at index `k * m`.
pub fn assemble_timeline(
    engine: &InterpolationEngine,
    frames: &[SharedFrame],
    multiplier: Multiplier,
) -> Result<Vec<SharedFrame>> {
    if frames.len() < 2 {
        return Err(PipelineError::NotEnoughImages {
            loaded: frames.len(),
            requested: frames.len(),
        }
        .into());
    }

    let segments = frames.len() - 1;
    let mut timeline = Vec::with_capacity(1 + segments * multiplier.get() as usize);

    for (index, pair) in frames.windows(2).enumerate() {
        let segment = interpolate_segment(
            engine,
            Arc::clone(&pair[0]),
            Arc::clone(&pair[1]),
            multiplier,
        )?;
        let skip = if index == 0 { 0 } else { 1 };
        timeline.extend(segment.into_iter().skip(skip));

        info!(
            segment = index + 1,
            total = segments,
            frames = timeline.len(),
            "Interpolated segment"
        );
    }

    Ok(timeline)
}
