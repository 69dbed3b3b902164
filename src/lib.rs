//! # Stageflow
//!
//! Composable DAG pipelines of asynchronous stages, with automatic
//! parallelism, cooperative cancellation, interceptor middleware, child
//! pipelines, conflict-detecting shared state, and a wide-event stream
//! for observability.
//!
//! - **Stage-based execution**: declare discrete stages with dependencies;
//!   each stage starts the moment its dependencies are usable
//! - **Context model**: an immutable per-run snapshot plus a
//!   single-writer-per-key shared store
//! - **Interceptors**: priority-ordered middleware around every stage,
//!   with timeout, retry, circuit-breaking, auth, and logging bundled
//! - **Subpipelines**: fork child runs that see frozen parent data and
//!   cancel together with their parent
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use stageflow::prelude::*;
//!
//! let graph = Pipeline::new("chat")
//!     .with_stage("enrich", enrich_stage, StageKind::Enrich)
//!     .with_dependent_stage("respond", respond_stage, StageKind::Agent, &["enrich"])
//!     .build()?;
//!
//! let ctx = Arc::new(PipelineContext::from_snapshot(snapshot));
//! let outcome = graph.run(ctx).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod auth;
pub mod cancellation;
pub mod context;
pub mod contracts;
pub mod core;
pub mod errors;
pub mod events;
pub mod interceptors;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod subpipeline;
pub mod testing;
pub mod tools;
pub mod utils;

/// Convenience imports for the common surface.
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::{
        ContextBag, ContextSnapshot, ForkOptions, FrozenView, Message, PipelineContext,
        RunConfig, RunIdentity, StageContext, StageInputs,
    };
    pub use crate::core::{
        PipelineTimer, StageArtifact, StageEvent, StageKind, StageOutput, StageStatus,
    };
    pub use crate::errors::{
        ContractErrorInfo, DataConflictError, PipelineValidationError, StageflowError,
    };
    pub use crate::events::{
        get_event_sink, set_event_sink, EventSink, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::interceptors::{
        BeforeAction, ErrorAction, Interceptor, InterceptorChain, InterceptorContext,
    };
    pub use crate::pipeline::{
        global_registry, Pipeline, PipelineRegistry, RunOutcome, StageGraph, StageSpec,
    };
    pub use crate::stages::{Stage, StagePorts, StageRunner};
    pub use crate::subpipeline::{SubpipelineResult, SubpipelineSpawner};
}
