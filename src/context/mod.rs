//! The context model: immutable per-run snapshots, the conflict-detecting
//! shared bag, per-stage input views, and the mutable run handle.

mod bag;
mod execution;
mod identity;
mod inputs;
mod snapshot;

pub use bag::{ContextBag, FrozenView};
pub use execution::{ForkOptions, ParentLineage, PipelineContext, RunConfig, StageContext};
pub use identity::RunIdentity;
pub use inputs::StageInputs;
pub use snapshot::{ContextSnapshot, Message};
