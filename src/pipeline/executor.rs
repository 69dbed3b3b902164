//! Dependency-driven concurrent execution of a compiled graph.
//!
//! Stages launch as soon as every dependency has a usable outcome, run as
//! independent tasks, and report back through a `JoinSet`. The scheduler
//! owns all bookkeeping (in-degrees, completed outputs, suppression) and
//! is the only place that decides the run's fate.

use super::{StageGraph, StageSpec};
use crate::context::{PipelineContext, StageContext, StageInputs};
use crate::core::{StageOutput, StageStatus};
use crate::errors::{codes, DataConflictError, StageflowError};
use crate::interceptors::{
    BeforeAction, ErrorAction, Interceptor, InterceptorChain, InterceptorContext,
};
use crate::observability::WideEvent;
use crate::stages::Stage;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// How a run ended, short of a propagated failure.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every reachable stage reached a usable terminal state.
    Completed {
        /// Output per stage, including synthetic skips.
        outputs: HashMap<String, StageOutput>,
        /// Total run time on the shared timer.
        duration_ms: u64,
    },
    /// The run stopped early: a stage returned `Cancel`, or the caller's
    /// token fired. Not an error; partial results are preserved.
    Cancelled {
        /// Why the run stopped.
        reason: String,
        /// The stage that requested cancellation, when one did.
        stage: Option<String>,
        /// Outputs collected before the run stopped.
        outputs: HashMap<String, StageOutput>,
        /// Total run time on the shared timer.
        duration_ms: u64,
    },
}

impl RunOutcome {
    /// True when every stage finished.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// True when the run stopped early.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The collected outputs, complete or partial.
    #[must_use]
    pub fn outputs(&self) -> &HashMap<String, StageOutput> {
        match self {
            Self::Completed { outputs, .. } | Self::Cancelled { outputs, .. } => outputs,
        }
    }

    /// Consumes the outcome, keeping the outputs.
    #[must_use]
    pub fn into_outputs(self) -> HashMap<String, StageOutput> {
        match self {
            Self::Completed { outputs, .. } | Self::Cancelled { outputs, .. } => outputs,
        }
    }
}

type TaskResult = (String, StageOutput);

pub(crate) async fn execute(
    graph: &StageGraph,
    ctx: Arc<PipelineContext>,
    interceptor_override: Option<Vec<Arc<dyn Interceptor>>>,
) -> Result<RunOutcome, StageflowError> {
    let chain = Arc::new(InterceptorChain::from_interceptors(
        interceptor_override.unwrap_or_else(|| graph.interceptors().to_vec()),
    ));
    let limiter = ctx
        .config()
        .max_concurrency
        .map(|cap| Arc::new(Semaphore::new(cap)));
    let total = graph.stage_count();

    WideEvent::for_run("pipeline.started", &ctx)
        .with_data("pipeline", json!(graph.name()))
        .with_data("stage_count", json!(total))
        .emit(&ctx);

    let mut in_degree: HashMap<String, usize> = graph
        .specs()
        .iter()
        .map(|s| (s.name.clone(), s.dependencies.len()))
        .collect();
    let mut done: HashMap<String, StageOutput> = HashMap::with_capacity(total);
    let mut tasks: JoinSet<TaskResult> = JoinSet::new();
    let mut task_names: HashMap<tokio::task::Id, String> = HashMap::new();

    for spec in graph.specs() {
        if spec.dependencies.is_empty() {
            launch(spec, &ctx, &chain, &limiter, &done, &mut tasks, &mut task_names);
        }
    }

    while done.len() < total {
        if tasks.is_empty() {
            let mut pending: Vec<String> = graph
                .specs()
                .iter()
                .map(|s| s.name.clone())
                .filter(|name| !done.contains_key(name))
                .collect();
            pending.sort();
            warn!(?pending, "stage graph deadlocked");
            WideEvent::for_run("pipeline.failed", &ctx)
                .with_data("code", json!(codes::DEADLOCK))
                .with_data("pending", json!(pending))
                .emit(&ctx);
            return Err(StageflowError::Deadlock { pending });
        }

        let next = tokio::select! {
            biased;
            () = ctx.cancel_token().cancelled() => None,
            joined = tasks.join_next_with_id() => joined,
        };

        let Some(joined) = next else {
            return Ok(drain_after_cancel(&ctx, tasks, done).await);
        };

        let (name, output) = match joined {
            Ok((id, result)) => {
                task_names.remove(&id);
                result
            }
            Err(join_err) => {
                let stage = task_names
                    .remove(&join_err.id())
                    .unwrap_or_else(|| "<unknown>".to_string());
                abort_remaining(&mut tasks).await;
                let original = format!("stage task did not finish: {join_err}");
                WideEvent::for_run("pipeline.failed", &ctx)
                    .with_stage(stage.clone())
                    .with_data("code", json!(codes::STAGE_EXECUTION_FAILED))
                    .with_data("error", json!(&original))
                    .emit(&ctx);
                return Err(StageflowError::StageExecution { stage, original });
            }
        };

        // Terminal outputs to record; suppressed dependents join the list.
        let mut worklist: Vec<TaskResult> = vec![(name, output)];
        while let Some((name, output)) = worklist.pop() {
            match output.status {
                StageStatus::Fail => {
                    let original = output
                        .error
                        .clone()
                        .unwrap_or_else(|| "stage failed".to_string());
                    abort_remaining(&mut tasks).await;
                    WideEvent::for_run("pipeline.failed", &ctx)
                        .with_stage(name.clone())
                        .with_status(StageStatus::Fail)
                        .with_duration_ms(ctx.timer().elapsed_ms())
                        .with_data("code", json!(codes::STAGE_EXECUTION_FAILED))
                        .with_data("error", json!(&original))
                        .emit(&ctx);
                    return Err(StageflowError::StageExecution { stage: name, original });
                }

                StageStatus::Cancel => {
                    let reason = output
                        .reason
                        .clone()
                        .unwrap_or_else(|| "stage requested cancellation".to_string());
                    done.insert(name.clone(), output);
                    abort_remaining(&mut tasks).await;
                    // Linked child runs stop with us.
                    ctx.cancel(reason.clone());
                    WideEvent::for_run("pipeline.cancelled", &ctx)
                        .with_stage(name.clone())
                        .with_duration_ms(ctx.timer().elapsed_ms())
                        .with_data("reason", json!(&reason))
                        .emit(&ctx);
                    return Ok(RunOutcome::Cancelled {
                        reason,
                        stage: Some(name),
                        outputs: done,
                        duration_ms: ctx.timer().elapsed_ms(),
                    });
                }

                StageStatus::Ok | StageStatus::Skip => {
                    done.insert(name.clone(), output);
                    for dependent in graph.dependents_of(&name) {
                        let Some(degree) = in_degree.get_mut(dependent) else {
                            continue;
                        };
                        *degree = degree.saturating_sub(1);
                        if *degree > 0 {
                            continue;
                        }
                        let Some(spec) = graph.spec(dependent) else {
                            continue;
                        };
                        if upstreams_usable(spec, &done) {
                            launch(spec, &ctx, &chain, &limiter, &done, &mut tasks, &mut task_names);
                        } else {
                            debug!(stage = %dependent, "suppressed: upstream unavailable");
                            WideEvent::for_run(
                                format!("stage.{dependent}.skipped"),
                                &ctx,
                            )
                            .with_stage(dependent.clone())
                            .with_status(StageStatus::Skip)
                            .with_data("reason", json!("upstream_unavailable"))
                            .emit(&ctx);
                            worklist.push((
                                dependent.clone(),
                                StageOutput::skip("upstream_unavailable"),
                            ));
                        }
                    }
                }
            }
        }
    }

    let duration_ms = ctx.timer().elapsed_ms();
    WideEvent::for_run("pipeline.completed", &ctx)
        .with_duration_ms(duration_ms)
        .with_data("stage_count", json!(done.len()))
        .emit(&ctx);
    Ok(RunOutcome::Completed {
        outputs: done,
        duration_ms,
    })
}

/// A dependency is usable when it completed Ok, or skipped and the
/// dependent declared tolerance for skipped upstreams.
fn upstreams_usable(spec: &StageSpec, done: &HashMap<String, StageOutput>) -> bool {
    spec.dependencies.iter().all(|dep| match done.get(dep) {
        Some(output) => match output.status {
            StageStatus::Ok => true,
            StageStatus::Skip => spec.conditional,
            _ => false,
        },
        None => false,
    })
}

fn resolve_inputs(
    spec: &StageSpec,
    ctx: &Arc<PipelineContext>,
    done: &HashMap<String, StageOutput>,
) -> StageInputs {
    let prior = spec
        .dependencies
        .iter()
        .filter_map(|dep| done.get(dep).map(|output| (dep.clone(), output.clone())))
        .collect();
    StageInputs::new(ctx.snapshot().clone(), prior, ctx.ports().clone())
}

#[allow(clippy::too_many_arguments)]
fn launch(
    spec: &StageSpec,
    ctx: &Arc<PipelineContext>,
    chain: &Arc<InterceptorChain>,
    limiter: &Option<Arc<Semaphore>>,
    done: &HashMap<String, StageOutput>,
    tasks: &mut JoinSet<TaskResult>,
    task_names: &mut HashMap<tokio::task::Id, String>,
) {
    let task = StageTask {
        spec: spec.clone(),
        ctx: ctx.clone(),
        chain: chain.clone(),
        limiter: limiter.clone(),
        inputs: resolve_inputs(spec, ctx, done),
    };
    let name = spec.name.clone();
    let handle = tasks.spawn(async move {
        let output = task.run().await;
        (name, output)
    });
    task_names.insert(handle.id(), spec.name.clone());
}

async fn abort_remaining(tasks: &mut JoinSet<TaskResult>) {
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
}

/// External cancellation: launch nothing new, give running stages the
/// grace period, abandon the rest.
async fn drain_after_cancel(
    ctx: &Arc<PipelineContext>,
    mut tasks: JoinSet<TaskResult>,
    mut done: HashMap<String, StageOutput>,
) -> RunOutcome {
    let grace = ctx.config().cancel_grace;
    let graceful = tokio::time::timeout(grace, async {
        while let Some(result) = tasks.join_next().await {
            if let Ok((name, output)) = result {
                done.insert(name, output);
            }
        }
    })
    .await;

    if graceful.is_err() {
        warn!(
            grace_ms = grace.as_millis() as u64,
            "abandoning stages still running after cancellation grace period"
        );
        abort_remaining(&mut tasks).await;
    }

    let reason = ctx
        .cancel_token()
        .reason()
        .unwrap_or_else(|| "cancelled".to_string());
    let duration_ms = ctx.timer().elapsed_ms();
    WideEvent::for_run("pipeline.cancelled", ctx)
        .with_duration_ms(duration_ms)
        .with_data("reason", json!(&reason))
        .emit(ctx);

    RunOutcome::Cancelled {
        reason,
        stage: None,
        outputs: done,
        duration_ms,
    }
}

/// One spawned task per launched stage: interceptors, deadline, retries,
/// flattening, and the stage's lifecycle events.
struct StageTask {
    spec: StageSpec,
    ctx: Arc<PipelineContext>,
    chain: Arc<InterceptorChain>,
    limiter: Option<Arc<Semaphore>>,
    inputs: StageInputs,
}

impl StageTask {
    async fn run(self) -> StageOutput {
        let _permit = match &self.limiter {
            Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
            None => None,
        };

        // Past this point cancellation forbids new work entirely, so the
        // stage produces no started event.
        if self.ctx.is_cancelled() {
            return StageOutput::cancel("pipeline cancelled");
        }

        let stage = self.spec.runner.instantiate();
        let sctx = StageContext::new(
            self.ctx.clone(),
            self.spec.name.as_str(),
            self.spec.kind,
            self.inputs.clone(),
        );
        let started_ms = self.ctx.timer().elapsed_ms();

        WideEvent::for_run(format!("stage.{}.started", self.spec.name), &self.ctx)
            .with_stage(self.spec.name.as_str())
            .with_data("kind", json!(self.spec.kind.to_string()))
            .emit(&self.ctx);

        let ictx = InterceptorContext::new(&sctx);

        let output = match self.chain.run_before(&ictx).await {
            BeforeAction::Continue => self.execute_body(stage.as_ref(), &sctx, &ictx).await,
            BeforeAction::Skip(reason) => StageOutput::skip(reason),
            BeforeAction::Fail(error) => StageOutput::fail(error),
            BeforeAction::Replace(output) => output,
        };

        let mut output = self.chain.run_after(&ictx, output).await;

        if self.ctx.config().flatten_outputs && output.status == StageStatus::Ok {
            if let Err(conflict) = self.flatten(&output) {
                output = StageOutput::fail_coded("contract_conflict", conflict.to_string());
            }
        }

        let duration_ms = self.ctx.timer().elapsed_ms().saturating_sub(started_ms);
        self.emit_terminal(&output, duration_ms);
        output
    }

    async fn execute_body(
        &self,
        stage: &dyn Stage,
        sctx: &StageContext,
        ictx: &InterceptorContext<'_>,
    ) -> StageOutput {
        let deadline = self.chain.deadline(ictx);
        let mut attempt: u32 = 0;

        loop {
            let result = match deadline {
                Some(limit) => match tokio::time::timeout(limit, stage.execute(sctx)).await {
                    Ok(output) => output,
                    Err(_) => StageOutput::fail_coded(
                        "timeout",
                        format!("exceeded {}ms deadline", limit.as_millis()),
                    ),
                },
                None => stage.execute(sctx).await,
            };

            if result.status != StageStatus::Fail {
                return result;
            }

            let error = result.error.clone().unwrap_or_default();
            match self.chain.handle_error(ictx, &error, attempt).await {
                ErrorAction::Propagate => return result,
                ErrorAction::Replace(output) => return output,
                ErrorAction::Retry { delay } => {
                    attempt += 1;
                    WideEvent::for_run(
                        format!("stage.{}.retried", self.spec.name),
                        &self.ctx,
                    )
                    .with_stage(self.spec.name.as_str())
                    .with_data("attempt", json!(attempt))
                    .with_data("delay_ms", json!(delay.as_millis() as u64))
                    .emit(&self.ctx);
                    tokio::time::sleep(delay).await;
                    if self.ctx.is_cancelled() {
                        return StageOutput::cancel("pipeline cancelled");
                    }
                }
            }
        }
    }

    fn flatten(&self, output: &StageOutput) -> Result<(), DataConflictError> {
        for (key, value) in &output.data {
            self.ctx
                .data
                .write(key.as_str(), value.clone(), self.spec.name.as_str())?;
        }
        Ok(())
    }

    fn emit_terminal(&self, output: &StageOutput, duration_ms: u64) {
        let verb = match output.status {
            StageStatus::Ok => "completed",
            StageStatus::Skip => "skipped",
            StageStatus::Cancel => "cancelled",
            StageStatus::Fail => "failed",
        };

        let mut data_keys: Vec<&str> = output.data.keys().map(String::as_str).collect();
        data_keys.sort_unstable();

        let mut event = WideEvent::for_run(
            format!("stage.{}.{verb}", self.spec.name),
            &self.ctx,
        )
        .with_stage(self.spec.name.as_str())
        .with_status(output.status)
        .with_duration_ms(duration_ms)
        .with_data("data_keys", json!(data_keys));

        if let Some(error) = &output.error {
            event = event.with_data("error", json!(error));
        }
        if let Some(reason) = &output.reason {
            event = event.with_data("reason", json!(reason));
        }
        event.emit(&self.ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextSnapshot;
    use crate::core::StageKind;
    use crate::pipeline::Pipeline;
    use crate::stages::{FnStage, NoOpStage, Stage};

    fn noop(name: &str) -> Arc<dyn Stage> {
        Arc::new(NoOpStage::new(name))
    }

    fn ctx() -> Arc<PipelineContext> {
        Arc::new(PipelineContext::from_snapshot(ContextSnapshot::new()))
    }

    #[tokio::test]
    async fn single_stage_completes() {
        let graph = Pipeline::new("one")
            .with_stage("only", noop("only"), StageKind::Work)
            .build()
            .unwrap();

        let outcome = graph.run(ctx()).await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(outcome.outputs().len(), 1);
        assert!(outcome.outputs()["only"].is_success());
    }

    #[tokio::test]
    async fn failure_propagates_with_stage_name() {
        let boom: Arc<dyn Stage> = Arc::new(FnStage::new("boom", |_ctx| async {
            StageOutput::fail("exploded")
        }));
        let graph = Pipeline::new("failing")
            .with_stage("boom", boom, StageKind::Work)
            .build()
            .unwrap();

        let err = graph.run(ctx()).await.unwrap_err();
        match err {
            StageflowError::StageExecution { stage, original } => {
                assert_eq!(stage, "boom");
                assert_eq!(original, "exploded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn skip_does_not_fail_the_run() {
        let skipper: Arc<dyn Stage> = Arc::new(FnStage::new("skipper", |_ctx| async {
            StageOutput::skip("nothing to do")
        }));
        let graph = Pipeline::new("skippy")
            .with_stage("skipper", skipper, StageKind::Guard)
            .build()
            .unwrap();

        let outcome = graph.run(ctx()).await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(outcome.outputs()["skipper"].status, StageStatus::Skip);
    }

    #[tokio::test]
    async fn non_conditional_downstream_of_skip_is_suppressed() {
        let skipper: Arc<dyn Stage> = Arc::new(FnStage::new("gate", |_ctx| async {
            StageOutput::skip("gated off")
        }));
        let graph = Pipeline::new("suppress")
            .with_stage("gate", skipper, StageKind::Guard)
            .with_dependent_stage("work", noop("work"), StageKind::Work, &["gate"])
            .with_dependent_stage("after", noop("after"), StageKind::Work, &["work"])
            .build()
            .unwrap();

        let outcome = graph.run(ctx()).await.unwrap();
        let outputs = outcome.outputs();
        assert_eq!(outputs["work"].status, StageStatus::Skip);
        assert_eq!(outputs["work"].reason.as_deref(), Some("upstream_unavailable"));
        // Suppression cascades.
        assert_eq!(outputs["after"].reason.as_deref(), Some("upstream_unavailable"));
    }

    #[tokio::test]
    async fn conditional_downstream_of_skip_still_runs() {
        let skipper: Arc<dyn Stage> = Arc::new(FnStage::new("gate", |_ctx| async {
            StageOutput::skip("gated off")
        }));
        let graph = Pipeline::new("tolerant")
            .with_stage("gate", skipper, StageKind::Guard)
            .with_conditional_stage("work", noop("work"), StageKind::Work, &["gate"])
            .build()
            .unwrap();

        let outcome = graph.run(ctx()).await.unwrap();
        assert_eq!(outcome.outputs()["work"].status, StageStatus::Ok);
    }

    #[tokio::test]
    async fn flattening_mirrors_data_into_the_bag() {
        let producer: Arc<dyn Stage> = Arc::new(FnStage::new("producer", |_ctx| async {
            StageOutput::ok_value("summary", serde_json::json!("done"))
        }));
        let graph = Pipeline::new("flatten")
            .with_stage("producer", producer, StageKind::Work)
            .build()
            .unwrap();

        let run_ctx = ctx();
        graph.run(run_ctx.clone()).await.unwrap();
        assert_eq!(run_ctx.data.read("summary"), Some(serde_json::json!("done")));
        assert_eq!(run_ctx.data.writer_of("summary").as_deref(), Some("producer"));
    }

    #[tokio::test]
    async fn concurrency_cap_limits_parallelism() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        static RUNNING: AtomicUsize = AtomicUsize::new(0);
        static PEAK: AtomicUsize = AtomicUsize::new(0);

        fn tracked(name: &str) -> Arc<dyn Stage> {
            Arc::new(FnStage::new(name, |_ctx| async {
                let now = RUNNING.fetch_add(1, Ordering::SeqCst) + 1;
                PEAK.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                RUNNING.fetch_sub(1, Ordering::SeqCst);
                StageOutput::ok_empty()
            }))
        }

        let mut pipeline = Pipeline::new("capped");
        for name in ["a", "b", "c", "d"] {
            pipeline = pipeline.with_stage(name, tracked(name), StageKind::Work);
        }
        let graph = pipeline.build().unwrap();

        let run_ctx = Arc::new(
            PipelineContext::from_snapshot(ContextSnapshot::new()).with_config(
                crate::context::RunConfig::new().with_max_concurrency(2),
            ),
        );
        graph.run(run_ctx).await.unwrap();
        assert!(PEAK.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn stage_panic_surfaces_as_execution_error() {
        let panicking: Arc<dyn Stage> = Arc::new(FnStage::new("panicking", |_ctx| async {
            panic!("stage blew up");
        }));
        let graph = Pipeline::new("panic")
            .with_stage("panicking", panicking, StageKind::Work)
            .build()
            .unwrap();

        let err = graph.run(ctx()).await.unwrap_err();
        match err {
            StageflowError::StageExecution { stage, .. } => assert_eq!(stage, "panicking"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
