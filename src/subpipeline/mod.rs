//! Child pipeline runs: forking, tracking, and lifecycle events.
//!
//! Forking itself lives on `PipelineContext::fork`; this module adds the
//! spawner that runs a graph in a child context with depth enforcement,
//! and the tracker that ties children to parents for cascading
//! cancellation.

mod result;
mod spawner;
mod tracker;

pub use result::SubpipelineResult;
pub use spawner::{SubpipelineSpawner, DEFAULT_MAX_DEPTH};
pub use tracker::ChildRunTracker;
