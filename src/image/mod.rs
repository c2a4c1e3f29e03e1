//! Filesystem image building
//!
//! - `staleness`: decides whether the image on disk is still current
//! - `builder`: stages the data directory and runs the packing tool

pub mod builder;
pub mod staleness;

pub use builder::{ImageBuilder, ImagePacker, MkLittlefs, PackRequest};
pub use staleness::{ImageBuildDecision, RebuildReason, decide, needs_rebuild};
