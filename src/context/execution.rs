//! Mutable run handle and the per-stage execution view.

use super::{ContextBag, ContextSnapshot, FrozenView, RunIdentity, StageInputs};
use crate::cancellation::CancellationToken;
use crate::core::{PipelineTimer, StageKind};
use crate::events::{get_event_sink, EventSink};
use crate::stages::StagePorts;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Per-run engine configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Upper bound on concurrently running stages. `None` is unbounded.
    pub max_concurrency: Option<usize>,
    /// How long running stages get to finish after cancellation before
    /// they are abandoned.
    pub cancel_grace: Duration,
    /// Mirror successful stage outputs into the shared [`ContextBag`].
    pub flatten_outputs: bool,
    /// Free-form configuration values forwarded to stages.
    pub values: HashMap<String, serde_json::Value>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            cancel_grace: Duration::from_secs(1),
            flatten_outputs: true,
            values: HashMap::new(),
        }
    }
}

impl RunConfig {
    /// A configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps concurrent stage execution.
    #[must_use]
    pub fn with_max_concurrency(mut self, cap: usize) -> Self {
        self.max_concurrency = Some(cap);
        self
    }

    /// Sets the cancellation grace period.
    #[must_use]
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    /// Disables mirroring of outputs into the shared bag.
    #[must_use]
    pub fn without_flattening(mut self) -> Self {
        self.flatten_outputs = false;
        self
    }

    /// Adds one free-form configuration value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

/// Identity of the parent run, present on forked child contexts.
#[derive(Debug, Clone)]
pub struct ParentLineage {
    /// The parent's run id.
    pub parent_run_id: Option<Uuid>,
    /// The parent stage that spawned this run.
    pub parent_stage_id: String,
    /// Correlates the child with the triggering action.
    pub correlation_id: Option<Uuid>,
    /// Frozen view of the parent's flattened data.
    pub parent_data: FrozenView,
}

/// Options for deriving a child run from a parent context.
#[derive(Debug, Clone, Default)]
pub struct ForkOptions {
    /// Run id for the child; generated when absent.
    pub child_run_id: Option<Uuid>,
    /// The stage spawning the child.
    pub parent_stage_id: String,
    /// Correlation id, typically the triggering action id.
    pub correlation_id: Option<Uuid>,
    /// Topology override; inherits the parent's when absent.
    pub topology: Option<String>,
    /// Execution-mode override; inherits the parent's when absent.
    pub execution_mode: Option<String>,
}

impl ForkOptions {
    /// Options naming the spawning stage.
    #[must_use]
    pub fn new(parent_stage_id: impl Into<String>) -> Self {
        Self {
            parent_stage_id: parent_stage_id.into(),
            ..Self::default()
        }
    }

    /// Pins the child run id.
    #[must_use]
    pub fn with_child_run_id(mut self, id: Uuid) -> Self {
        self.child_run_id = Some(id);
        self
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Overrides the child's topology label.
    #[must_use]
    pub fn with_topology(mut self, topology: impl Into<String>) -> Self {
        self.topology = Some(topology.into());
        self
    }

    /// Overrides the child's execution mode.
    #[must_use]
    pub fn with_execution_mode(mut self, mode: impl Into<String>) -> Self {
        self.execution_mode = Some(mode.into());
        self
    }
}

/// The mutable handle for one pipeline run.
///
/// Owns the shared bag, the event sink, the cancellation token, and the
/// run timer. Shared across stage tasks behind an `Arc`.
pub struct PipelineContext {
    snapshot: Arc<ContextSnapshot>,
    /// Shared conflict-detecting store for flattened stage outputs.
    pub data: ContextBag,
    event_sink: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
    timer: PipelineTimer,
    ports: StagePorts,
    config: RunConfig,
    lineage: Option<ParentLineage>,
}

impl PipelineContext {
    /// A run handle over a snapshot, using the ambient event sink.
    #[must_use]
    pub fn from_snapshot(snapshot: ContextSnapshot) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            data: ContextBag::new(),
            event_sink: get_event_sink(),
            cancel: Arc::new(CancellationToken::new()),
            timer: PipelineTimer::start(),
            ports: StagePorts::default(),
            config: RunConfig::default(),
            lineage: None,
        }
    }

    /// Replaces the event sink for this run.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Injects capability ports forwarded to stages.
    #[must_use]
    pub fn with_ports(mut self, ports: StagePorts) -> Self {
        self.ports = ports;
        self
    }

    /// Replaces the run configuration.
    #[must_use]
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// The immutable run snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &Arc<ContextSnapshot> {
        &self.snapshot
    }

    /// The run's correlation identity.
    #[must_use]
    pub fn identity(&self) -> &RunIdentity {
        &self.snapshot.identity
    }

    /// The run id, when present.
    #[must_use]
    pub fn pipeline_run_id(&self) -> Option<Uuid> {
        self.snapshot.identity.pipeline_run_id
    }

    /// The run's event sink.
    #[must_use]
    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.event_sink
    }

    /// The run's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// True once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Requests cooperative cancellation of the run.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.cancel.cancel(reason);
    }

    /// The shared run timer.
    #[must_use]
    pub fn timer(&self) -> &PipelineTimer {
        &self.timer
    }

    /// The injected capability ports.
    #[must_use]
    pub fn ports(&self) -> &StagePorts {
        &self.ports
    }

    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Parent lineage, present on forked child runs.
    #[must_use]
    pub fn lineage(&self) -> Option<&ParentLineage> {
        self.lineage.as_ref()
    }

    /// Frozen parent data, present on forked child runs.
    #[must_use]
    pub fn parent_data(&self) -> Option<&FrozenView> {
        self.lineage.as_ref().map(|l| &l.parent_data)
    }

    /// Emits an event enriched with run identity, without blocking.
    pub fn try_emit_event(&self, event_type: &str, data: serde_json::Value) {
        self.event_sink.try_emit(event_type, self.enrich(data));
    }

    /// Emits an event enriched with run identity and awaits the sink.
    pub async fn emit_event(&self, event_type: &str, data: serde_json::Value) {
        self.event_sink.emit(event_type, self.enrich(data)).await;
    }

    fn enrich(&self, data: serde_json::Value) -> serde_json::Value {
        let mut map = match data {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };

        if let Some(id) = self.snapshot.identity.pipeline_run_id {
            map.insert("pipeline_run_id".to_string(), serde_json::json!(id.to_string()));
        }
        if let Some(id) = self.snapshot.identity.request_id {
            map.insert("request_id".to_string(), serde_json::json!(id.to_string()));
        }
        if let Some(ref topology) = self.snapshot.topology {
            map.insert("topology".to_string(), serde_json::json!(topology));
        }
        if let Some(ref mode) = self.snapshot.execution_mode {
            map.insert("execution_mode".to_string(), serde_json::json!(mode));
        }
        if let Some(parent) = self.lineage.as_ref().and_then(|l| l.parent_run_id) {
            map.insert("parent_run_id".to_string(), serde_json::json!(parent.to_string()));
        }

        serde_json::Value::Object(map)
    }

    /// Derives a child run context for a subpipeline.
    ///
    /// The child gets a fresh bag and timer, inherits user/org/session
    /// identity and the event sink, sees the parent's flattened data as a
    /// frozen read-only view, and carries a cancellation token linked to
    /// the parent's.
    #[must_use]
    pub fn fork(self: &Arc<Self>, options: ForkOptions) -> Arc<Self> {
        let child_run_id = options.child_run_id.unwrap_or_else(Uuid::new_v4);

        let mut identity = RunIdentity::for_run(child_run_id);
        identity.session_id = self.snapshot.identity.session_id;
        identity.user_id = self.snapshot.identity.user_id;
        identity.org_id = self.snapshot.identity.org_id;

        let mut snapshot = (*self.snapshot.as_ref()).clone().with_identity(identity);
        if let Some(topology) = options.topology {
            snapshot.topology = Some(topology);
        }
        if let Some(mode) = options.execution_mode {
            snapshot.execution_mode = Some(mode);
        }
        snapshot.created_at = crate::utils::now();

        Arc::new(Self {
            snapshot: Arc::new(snapshot),
            data: ContextBag::new(),
            event_sink: self.event_sink.clone(),
            cancel: self.cancel.child(),
            timer: PipelineTimer::start(),
            ports: self.ports.clone(),
            config: self.config.clone(),
            lineage: Some(ParentLineage {
                parent_run_id: self.pipeline_run_id(),
                parent_stage_id: options.parent_stage_id,
                correlation_id: options.correlation_id,
                parent_data: self.data.freeze(),
            }),
        })
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("pipeline_run_id", &self.pipeline_run_id())
            .field("cancelled", &self.is_cancelled())
            .field("is_subrun", &self.lineage.is_some())
            .finish_non_exhaustive()
    }
}

/// The view handed to one stage's `execute`.
///
/// Wraps the run handle with the stage's name, kind, and input view.
pub struct StageContext {
    pipeline: Arc<PipelineContext>,
    stage_name: String,
    kind: StageKind,
    inputs: StageInputs,
}

impl StageContext {
    /// Builds the per-stage view.
    #[must_use]
    pub fn new(
        pipeline: Arc<PipelineContext>,
        stage_name: impl Into<String>,
        kind: StageKind,
        inputs: StageInputs,
    ) -> Self {
        Self {
            pipeline,
            stage_name: stage_name.into(),
            kind,
            inputs,
        }
    }

    /// The executing stage's name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// The executing stage's kind.
    #[must_use]
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// The stage's input view.
    #[must_use]
    pub fn inputs(&self) -> &StageInputs {
        &self.inputs
    }

    /// The run handle.
    #[must_use]
    pub fn pipeline(&self) -> &Arc<PipelineContext> {
        &self.pipeline
    }

    /// The immutable run snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &ContextSnapshot {
        self.pipeline.snapshot()
    }

    /// The shared conflict-detecting store.
    #[must_use]
    pub fn data(&self) -> &ContextBag {
        &self.pipeline.data
    }

    /// The shared run timer.
    #[must_use]
    pub fn timer(&self) -> &PipelineTimer {
        self.pipeline.timer()
    }

    /// The injected capability ports.
    #[must_use]
    pub fn ports(&self) -> &StagePorts {
        self.pipeline.ports()
    }

    /// True once run cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.pipeline.is_cancelled()
    }

    /// The run's cancellation token, for stages that await suspension
    /// points.
    #[must_use]
    pub fn cancel_token(&self) -> &Arc<CancellationToken> {
        self.pipeline.cancel_token()
    }

    /// Frozen parent data when this run is a subrun.
    #[must_use]
    pub fn parent_data(&self) -> Option<&FrozenView> {
        self.pipeline.parent_data()
    }

    /// Reads a value from the parent's frozen data, when forked.
    #[must_use]
    pub fn get_parent_data(&self, key: &str) -> Option<&serde_json::Value> {
        self.parent_data().and_then(|view| view.get(key))
    }

    /// Emits an event enriched with run identity and this stage's name.
    pub fn try_emit_event(&self, event_type: &str, data: serde_json::Value) {
        let mut map = match data {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        map.insert("stage".to_string(), serde_json::json!(self.stage_name));
        self.pipeline
            .try_emit_event(event_type, serde_json::Value::Object(map));
    }
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("stage", &self.stage_name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;

    fn ctx() -> Arc<PipelineContext> {
        Arc::new(PipelineContext::from_snapshot(ContextSnapshot::new()))
    }

    #[test]
    fn context_exposes_identity() {
        let ctx = ctx();
        assert!(ctx.pipeline_run_id().is_some());
        assert!(!ctx.is_cancelled());
        assert!(ctx.lineage().is_none());
    }

    #[test]
    fn cancellation_flows_through_the_token() {
        let ctx = ctx();
        ctx.cancel("user request");
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.cancel_token().reason().as_deref(), Some("user request"));
    }

    #[test]
    fn events_are_enriched_with_identity() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = PipelineContext::from_snapshot(
            ContextSnapshot::new().with_topology("fast"),
        )
        .with_event_sink(sink.clone());

        ctx.try_emit_event("pipeline.started", serde_json::json!({"stages": 3}));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        let payload = &events[0].1;
        assert_eq!(payload["stages"], 3);
        assert_eq!(payload["topology"], "fast");
        assert!(payload["pipeline_run_id"].is_string());
    }

    #[test]
    fn fork_creates_an_isolated_child() {
        let parent = ctx();
        parent
            .data
            .write("summary", serde_json::json!("done"), "summarize")
            .unwrap();

        let child = parent.fork(
            ForkOptions::new("spawner")
                .with_correlation_id(Uuid::new_v4())
                .with_topology("child-topo"),
        );

        assert_ne!(child.pipeline_run_id(), parent.pipeline_run_id());
        assert_eq!(child.snapshot().topology.as_deref(), Some("child-topo"));
        assert!(child.data.is_empty());

        let lineage = child.lineage().unwrap();
        assert_eq!(lineage.parent_run_id, parent.pipeline_run_id());
        assert_eq!(lineage.parent_stage_id, "spawner");
        assert_eq!(
            lineage.parent_data.get("summary"),
            Some(&serde_json::json!("done"))
        );
        assert!(lineage.parent_data.write("summary", serde_json::json!(1)).is_err());
    }

    #[test]
    fn fork_inherits_user_and_org() {
        let user = Uuid::new_v4();
        let org = Uuid::new_v4();
        let parent = Arc::new(PipelineContext::from_snapshot(
            ContextSnapshot::new()
                .with_identity(RunIdentity::new().with_user_id(user).with_org_id(org)),
        ));

        let child = parent.fork(ForkOptions::new("spawner"));
        assert_eq!(child.identity().user_id, Some(user));
        assert_eq!(child.identity().org_id, Some(org));
    }

    #[test]
    fn parent_cancellation_reaches_children() {
        let parent = ctx();
        let child = parent.fork(ForkOptions::new("spawner"));

        parent.cancel("shutdown");
        assert!(child.is_cancelled());
        // The reverse does not hold.
        let parent2 = ctx();
        let child2 = parent2.fork(ForkOptions::new("spawner"));
        child2.cancel("child failed");
        assert!(!parent2.is_cancelled());
    }

    #[test]
    fn child_events_carry_both_run_ids() {
        let sink = Arc::new(CollectingEventSink::new());
        let parent = Arc::new(
            PipelineContext::from_snapshot(ContextSnapshot::new())
                .with_event_sink(sink.clone()),
        );
        let child = parent.fork(ForkOptions::new("spawner"));

        child.try_emit_event("stage.x.started", serde_json::json!({}));
        let payload = &sink.events()[0].1;
        assert!(payload["pipeline_run_id"].is_string());
        assert_eq!(
            payload["parent_run_id"],
            serde_json::json!(parent.pipeline_run_id().unwrap().to_string())
        );
    }

    #[test]
    fn stage_context_scopes_events_to_the_stage() {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = Arc::new(
            PipelineContext::from_snapshot(ContextSnapshot::new())
                .with_event_sink(sink.clone()),
        );
        let stage_ctx = StageContext::new(
            pipeline,
            "echo",
            StageKind::Transform,
            StageInputs::default(),
        );

        stage_ctx.try_emit_event("stage.echo.progress", serde_json::json!({"pct": 50}));
        let payload = &sink.events()[0].1;
        assert_eq!(payload["stage"], "echo");
        assert_eq!(payload["pct"], 50);
    }
}
