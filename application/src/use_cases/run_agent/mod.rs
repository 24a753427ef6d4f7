//! Run Agent use case
//!
//! Drives one goal through the agent state machine. Each loop iteration runs
//! exactly one phase handler, chosen by the current state:
//!
//! | State                 | Handler  | Next state                              |
//! |-----------------------|----------|-----------------------------------------|
//! | Idle                  | perceive | Analyzing                               |
//! | Analyzing             | plan     | Planning                                |
//! | Planning / Executing  | act      | Executing; Reviewing when nothing ready |
//! | Reviewing             | review   | Reflecting; Planning on reject          |
//! | Reflecting            | reflect  | Complete, or Planning after a re-plan   |
//!
//! The loop stops on a terminal state, on cancellation, on the iteration cap
//! or on a phase error. Whatever the outcome, an [`ExecutionResult`] is built
//! and kept as [`AgentEngine::last_result`].

mod phases;
pub mod runtime;
mod types;

pub use phases::{BASELINE_CONFIDENCE, HIGH_CONFIDENCE};
pub use runtime::{AgentRuntime, SharedRuntime};
pub use types::{ExecutionResult, PhaseError, RunAgentError};

use crate::config::{ExecutionParams, RetryConfig};
use crate::ports::agent_progress::{AgentProgressNotifier, NoAgentProgress};
use crate::ports::checkpoint_store::{CheckpointError, CheckpointStore};
use crate::ports::memory::MemoryPort;
use crate::ports::planner::PlannerPort;
use crate::ports::project_analyzer::ProjectAnalyzerPort;
use crate::ports::reviewer::ReviewerPort;
use crate::ports::tool_registry::ToolRegistryPort;
use crate::resilience::{CircuitBreaker, RateLimiter, RetryError, RetryStrategy};
use crate::telemetry::Metrics;
use crate::use_cases::checkpoint::CheckpointManager;
use crate::use_cases::shared::{CollaboratorGuard, RunningGuard, check_cancelled};
use conductor_domain::{
    AgentState, Checkpoint, CheckpointId, ConstraintValidator, Decision, DecisionType, Goal,
    Progress, TaskStatus,
};
use phases::RunContext;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Autonomous execution engine for one goal at a time.
///
/// Collaborators are optional except for the tool registry: without a
/// planner a single-task plan is used, without a reviewer changes are
/// approved, without memory or an analyzer those steps are skipped.
pub struct AgentEngine {
    params: ExecutionParams,
    runtime: SharedRuntime,
    tools: Arc<dyn ToolRegistryPort>,
    planner: Option<Arc<dyn PlannerPort>>,
    reviewer: Option<Arc<dyn ReviewerPort>>,
    memory: Option<Arc<dyn MemoryPort>>,
    analyzer: Option<Arc<dyn ProjectAnalyzerPort>>,
    phase_retry: Option<RetryStrategy>,
    tool_retry: Option<RetryStrategy>,
    guard: CollaboratorGuard,
    checkpoints: Option<Arc<CheckpointManager>>,
    metrics: Arc<Metrics>,
    extra_constraints: Mutex<Vec<String>>,
    cancellation: Mutex<CancellationToken>,
    parent_token: Option<CancellationToken>,
    running: Arc<AtomicBool>,
    last_result: Mutex<Option<ExecutionResult>>,
}

impl AgentEngine {
    pub fn new(
        tools: Arc<dyn ToolRegistryPort>,
        params: ExecutionParams,
    ) -> Result<Self, RunAgentError> {
        params.validate().map_err(RunAgentError::InvalidConfig)?;
        Ok(Self {
            params,
            runtime: AgentRuntime::default().shared(),
            tools,
            planner: None,
            reviewer: None,
            memory: None,
            analyzer: None,
            phase_retry: None,
            tool_retry: None,
            guard: CollaboratorGuard::new(),
            checkpoints: None,
            metrics: Arc::new(Metrics::new()),
            extra_constraints: Mutex::new(Vec::new()),
            cancellation: Mutex::new(CancellationToken::new()),
            parent_token: None,
            running: Arc::new(AtomicBool::new(false)),
            last_result: Mutex::new(None),
        })
    }

    pub fn with_planner(mut self, planner: Arc<dyn PlannerPort>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn with_reviewer(mut self, reviewer: Arc<dyn ReviewerPort>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryPort>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn ProjectAnalyzerPort>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Retry whole phases whose error message matches a retryable pattern.
    pub fn with_phase_retry(mut self, config: RetryConfig) -> Self {
        self.phase_retry = Some(RetryStrategy::new(config));
        self
    }

    /// Retry individual tool calls. Off by default: tools are not assumed
    /// idempotent.
    pub fn with_tool_retry(mut self, config: RetryConfig) -> Self {
        self.tool_retry = Some(RetryStrategy::new(config));
        self
    }

    /// Rate-limit planner and reviewer calls.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.guard = self.guard.with_limiter(limiter);
        self
    }

    /// Put planner and reviewer calls behind a circuit breaker.
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.guard = self.guard.with_breaker(breaker);
        self
    }

    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        let manager = CheckpointManager::new(store, self.runtime.clone(), self.running.clone())
            .with_instance_id(self.params.instance_id.clone());
        self.checkpoints = Some(Arc::new(manager));
        self
    }

    /// Set a parent cancellation token; every run uses a child of it.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.parent_token = Some(token);
        self
    }

    /// Share a telemetry sink with other engines.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    // ==================== Execution ====================

    /// Execute a goal without progress reporting
    pub async fn execute(&self, goal: Goal) -> Result<ExecutionResult, RunAgentError> {
        self.execute_with_progress(goal, &NoAgentProgress).await
    }

    /// Execute a goal from a fresh runtime, with progress callbacks.
    ///
    /// An invalid goal is rejected before anything is touched.
    pub async fn execute_with_progress(
        &self,
        goal: Goal,
        progress: &dyn AgentProgressNotifier,
    ) -> Result<ExecutionResult, RunAgentError> {
        goal.validate().map_err(|e| RunAgentError::InvalidGoal(e.to_string()))?;
        let _running = self.begin_run()?;

        info!(
            goal = %goal.description,
            priority = goal.priority.as_str(),
            constraints = goal.constraints.len(),
            "Starting agent"
        );
        *self.runtime.write().await = AgentRuntime::for_goal(goal);
        self.run_loop(progress).await
    }

    /// Continue from the current runtime (typically after a restore)
    pub async fn resume(&self) -> Result<ExecutionResult, RunAgentError> {
        self.resume_with_progress(&NoAgentProgress).await
    }

    /// Continue from the current runtime, with progress callbacks.
    ///
    /// A runtime that ended `Failed` is moved back to `Planning` with its
    /// failed and interrupted tasks re-queued. A `Complete` runtime yields
    /// its result without running any phase.
    pub async fn resume_with_progress(
        &self,
        progress: &dyn AgentProgressNotifier,
    ) -> Result<ExecutionResult, RunAgentError> {
        let _running = self.begin_run()?;
        {
            let mut runtime = self.runtime.write().await;
            if runtime.goal.is_none() {
                return Err(RunAgentError::NoGoal);
            }
            if runtime.state == AgentState::Failed {
                let requeued = runtime.plan.reset_failed() + runtime.plan.reset_in_progress();
                runtime.state = AgentState::Planning;
                info!(requeued, "Resuming failed run from planning");
            } else {
                info!(state = %runtime.state, iteration = runtime.iteration, "Resuming agent");
            }
        }
        self.run_loop(progress).await
    }

    fn begin_run(&self) -> Result<RunningGuard, RunAgentError> {
        RunningGuard::claim(&self.running).ok_or(RunAgentError::AlreadyRunning)
    }

    fn fresh_token(&self) -> CancellationToken {
        let token = match &self.parent_token {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        *self
            .cancellation
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = token.clone();
        token
    }

    async fn build_validator(&self) -> ConstraintValidator {
        let mut constraints = self
            .runtime
            .read()
            .await
            .goal
            .as_ref()
            .map(|g| g.constraints.clone())
            .unwrap_or_default();
        constraints.extend(
            self.extra_constraints
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .cloned(),
        );

        let validator = ConstraintValidator::from_constraints(&constraints);
        for text in validator.unrecognized() {
            warn!(constraint = %text, "Constraint not recognized, it will not be checked");
        }
        validator
    }

    async fn run_loop(
        &self,
        progress: &dyn AgentProgressNotifier,
    ) -> Result<ExecutionResult, RunAgentError> {
        let started = Instant::now();
        let cancel = self.fresh_token();
        let ctx = RunContext {
            cancel: cancel.clone(),
            progress,
            validator: self.build_validator().await,
        };

        let auto_save = match (&self.checkpoints, self.params.auto_save_interval) {
            (Some(manager), Some(interval)) => {
                let token = cancel.child_token();
                let handle = manager.start_auto_save(interval, token.clone());
                Some((token, handle))
            }
            _ => None,
        };

        let max = self.params.max_iterations;
        let outcome = loop {
            let (state, iteration) = {
                let runtime = self.runtime.read().await;
                (runtime.state, runtime.iteration)
            };
            if state.is_terminal() {
                break Ok(());
            }
            if iteration >= max {
                warn!(max, "Iteration cap reached");
                break Err(RunAgentError::MaxIterationsExceeded(max));
            }
            if let Err(e) = check_cancelled(&cancel) {
                info!(state = %state, "Agent cancelled");
                break Err(e);
            }

            let iteration = iteration + 1;
            self.runtime.write().await.iteration = iteration;
            debug!(iteration, state = %state, "Running phase");

            if let Err(e) = self.run_phase_with_retry(state, &ctx).await {
                break Err(e);
            }
            self.maybe_checkpoint(iteration, &ctx).await;
        };

        if let Some((token, handle)) = auto_save {
            token.cancel();
            if let Err(e) = handle.await {
                warn!("Auto-save task ended abnormally: {}", e);
            }
        }

        if let Err(e) = &outcome {
            self.mark_failed(e, &ctx).await;
        }

        let result = self.build_result(started, outcome.as_ref().err()).await;
        self.metrics.record_execution(result.success, started.elapsed());
        info!(
            state = %result.state,
            iterations = result.iterations,
            duration_ms = result.duration_ms,
            "{}",
            result.summary
        );
        progress.on_complete(result.state, &result.summary);
        *self
            .last_result
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(result.clone());

        outcome.map(|()| result)
    }

    async fn run_phase_with_retry(
        &self,
        state: AgentState,
        ctx: &RunContext<'_>,
    ) -> Result<(), RunAgentError> {
        let Some(retry) = &self.phase_retry else {
            return self
                .run_phase(state, ctx)
                .await
                .map_err(|e| RunAgentError::from_phase(state, e));
        };

        retry
            .execute(state.as_str(), Some(&ctx.cancel), |attempt| {
                if attempt > 0 {
                    debug!(state = %state, attempt, "Retrying phase");
                }
                self.run_phase(state, ctx)
            })
            .await
            .map_err(|e| match e {
                RetryError::Cancelled { .. } => RunAgentError::Cancelled,
                RetryError::NonRetryable { source, .. } => {
                    RunAgentError::from_phase(state, source)
                }
                RetryError::Exhausted {
                    attempts, source, ..
                } => match source {
                    PhaseError::Cancelled => RunAgentError::Cancelled,
                    source => RunAgentError::RetriesExhausted {
                        phase: state,
                        attempts,
                        source,
                    },
                },
            })
    }

    async fn maybe_checkpoint(&self, iteration: usize, ctx: &RunContext<'_>) {
        let every = self.params.checkpoint_every;
        if every == 0 || iteration % every != 0 {
            return;
        }
        let Some(manager) = &self.checkpoints else {
            return;
        };
        match manager.save().await {
            Ok(checkpoint) => {
                self.metrics.record_checkpoint();
                ctx.progress.on_checkpoint(&checkpoint.id);
            }
            Err(e) => warn!(iteration, "Checkpoint failed: {}", e),
        }
    }

    async fn mark_failed(&self, error: &RunAgentError, ctx: &RunContext<'_>) {
        let from = self.runtime.read().await.state;
        self.record(
            ctx,
            Decision::new(from, DecisionType::Fail, error.to_string(), 1.0),
        )
        .await;
        self.transition(ctx, AgentState::Failed).await;
    }

    async fn build_result(
        &self,
        started: Instant,
        error: Option<&RunAgentError>,
    ) -> ExecutionResult {
        let runtime = self.runtime.read().await;
        let tasks_total = runtime.plan.len();
        let tasks_completed = runtime.plan.count(TaskStatus::Complete);
        let tasks_failed = runtime.plan.count(TaskStatus::Failed);
        let success = error.is_none() && runtime.state == AgentState::Complete;

        let summary = match error {
            None => format!(
                "Goal {} after {} iterations: {}/{} tasks completed",
                if success { "completed" } else { "stopped" },
                runtime.iteration,
                tasks_completed,
                tasks_total
            ),
            Some(e) => format!(
                "Agent failed after {} iterations ({}/{} tasks completed): {}",
                runtime.iteration, tasks_completed, tasks_total, e
            ),
        };

        ExecutionResult {
            success,
            state: runtime.state,
            goal: runtime.goal.clone(),
            summary,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            iterations: runtime.iteration,
            tasks_total,
            tasks_completed,
            tasks_failed,
            results: runtime.completed.clone(),
            decisions: runtime.decisions.clone(),
            learnings: runtime.learnings.clone(),
            error: error.map(ToString::to_string),
        }
    }

    // ==================== Inspection & control ====================

    pub async fn state(&self) -> AgentState {
        self.runtime.read().await.state
    }

    /// Decisions of the current (or last) run, oldest first.
    pub async fn history(&self) -> Vec<Decision> {
        self.runtime.read().await.decisions.clone()
    }

    pub async fn progress(&self) -> Progress {
        self.runtime.read().await.progress()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request the in-flight run to stop at the next cancellation point.
    pub fn stop(&self) {
        info!("Stop requested");
        self.cancellation
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
    }

    /// Constraints checked in addition to the goal's own, from the next run on.
    pub fn set_constraints(&self, constraints: Vec<String>) {
        *self
            .extra_constraints
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = constraints;
    }

    pub fn checkpoint_manager(&self) -> Option<&Arc<CheckpointManager>> {
        self.checkpoints.as_ref()
    }

    fn manager(&self) -> Result<&Arc<CheckpointManager>, CheckpointError> {
        self.checkpoints.as_ref().ok_or(CheckpointError::NotConfigured)
    }

    pub async fn save_checkpoint(&self) -> Result<Checkpoint, CheckpointError> {
        let checkpoint = self.manager()?.save().await?;
        self.metrics.record_checkpoint();
        Ok(checkpoint)
    }

    pub async fn checkpoints(&self) -> Result<Vec<Checkpoint>, CheckpointError> {
        self.manager()?.list().await
    }

    /// Overwrite the runtime with a stored checkpoint. Refused while running.
    pub async fn restore_from_checkpoint(
        &self,
        id: &CheckpointId,
    ) -> Result<Checkpoint, CheckpointError> {
        self.manager()?.restore(id).await
    }

    pub async fn delete_checkpoint(&self, id: &CheckpointId) -> Result<(), CheckpointError> {
        self.manager()?.delete(id).await
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub fn telemetry_summary(&self) -> BTreeMap<String, Value> {
        self.metrics.summary()
    }

    pub fn last_result(&self) -> Option<ExecutionResult> {
        self.last_result
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
