//! Recursive-doubling interpolation between two anchor frames.

use std::sync::Arc;

use anyhow::Result;
use rayon::prelude::*;
use tracing::trace;

use crate::interpolation::{ensure_same_dimensions, InterpolationEngine};
use crate::types::{Frame, Multiplier, SharedFrame};

/// Expand the pair `(left, right)` to `multiplier + 1` frames.
///
/// Each pass inserts a midpoint between every adjacent pair, so `log2(m)` passes
/// produce `m - 1` generated frames. The anchors are returned as the same
/// shared frames that were passed in. Midpoints of one pass are computed in
/// parallel; the output order is always temporal.
pub fn interpolate_segment(
    engine: &InterpolationEngine,
    left: SharedFrame,
    right: SharedFrame,
    multiplier: Multiplier,
) -> Result<Vec<SharedFrame>> {
    ensure_same_dimensions(&left, &right)?;

    let mut frames = vec![left, right];
    for pass in 0..multiplier.passes() {
        let midpoints = frames
            .par_windows(2)
            .map(|pair| engine.midpoint(&pair[0], &pair[1]))
            .collect::<Result<Vec<Frame>>>()?;

        let mut next = Vec::with_capacity(frames.len() + midpoints.len());
        for (frame, midpoint) in frames.iter().zip(midpoints) {
            next.push(Arc::clone(frame));
            next.push(Arc::new(midpoint));
        }
        if let Some(last) = frames.last() {
            next.push(Arc::clone(last));
        }

        trace!(pass = pass + 1, frames = next.len(), "Doubling pass done");
        frames = next;
    }

    Ok(frames)
}
