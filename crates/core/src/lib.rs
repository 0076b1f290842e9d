//! Core crate for mangamotion: turns an ordered set of still panels into a
//! smoothly interpolated video.

pub mod assembler;
pub mod config;
pub mod encoder;
pub mod error;
pub mod interpolation;
pub mod loader;
pub mod logging;
pub mod natural_order;
pub mod pipeline;
pub mod runtime;
pub mod segment;
pub mod server;
pub mod types;

pub use error::PipelineError;
pub use pipeline::Pipeline;
pub use types::{AnimationRequest, Frame, Multiplier, SharedFrame};
