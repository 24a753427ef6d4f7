//! Phase handlers for the agent state machine.
//!
//! Each handler runs one phase for the current state and performs its own
//! transition. Handlers are safe to re-run from the top: `act` re-queues a
//! task left `InProgress`, the others only read settled data before writing.

use super::AgentEngine;
use super::types::PhaseError;
use crate::ports::agent_progress::AgentProgressNotifier;
use crate::ports::tool_registry::{Tool, ToolParams};
use crate::use_cases::shared::GuardError;
use conductor_domain::{
    AgentState, Change, ConstraintValidator, Decision, DecisionType, Goal, Learning, Plan,
    ReviewResult, ReviewVerdict, Task, TaskResult, TaskStatus,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Learning confidence when every task of a non-empty plan succeeded
pub const HIGH_CONFIDENCE: f64 = 0.9;
/// Learning confidence otherwise
pub const BASELINE_CONFIDENCE: f64 = 0.5;

/// Per-run inputs shared by every handler
pub(super) struct RunContext<'a> {
    pub cancel: CancellationToken,
    pub progress: &'a dyn AgentProgressNotifier,
    pub validator: ConstraintValidator,
}

enum ToolChoice {
    DryRun,
    Tool(Arc<dyn Tool>),
    Missing,
}

fn guard_to_phase<E: Into<PhaseError>>(error: GuardError<E>) -> PhaseError {
    match error {
        GuardError::Cancelled => PhaseError::Cancelled,
        GuardError::Open(name) => {
            PhaseError::Unavailable(format!("circuit breaker '{name}' is open"))
        }
        GuardError::Call(e) => e.into(),
    }
}

impl AgentEngine {
    /// Handler table: one handler per non-terminal state.
    pub(super) async fn run_phase(
        &self,
        state: AgentState,
        ctx: &RunContext<'_>,
    ) -> Result<(), PhaseError> {
        match state {
            AgentState::Idle => self.perceive(state, ctx).await,
            AgentState::Analyzing => self.plan(state, ctx).await,
            AgentState::Planning | AgentState::Executing => self.act(state, ctx).await,
            AgentState::Reviewing => self.review(state, ctx).await,
            AgentState::Reflecting => self.reflect(state, ctx).await,
            AgentState::Complete | AgentState::Failed => Ok(()),
        }
    }

    // ==================== Bookkeeping ====================

    /// Appends a decision and forwards it to telemetry, progress and memory.
    pub(super) async fn record(&self, ctx: &RunContext<'_>, decision: Decision) {
        self.metrics.record_decision(decision.decision_type);
        ctx.progress.on_decision(&decision);
        self.runtime.write().await.decisions.push(decision.clone());

        if let Some(memory) = &self.memory
            && let Err(e) = memory.record_decision(&decision).await
        {
            warn!("Failed to record decision in memory: {}", e);
        }
    }

    pub(super) async fn transition(&self, ctx: &RunContext<'_>, to: AgentState) {
        let from = std::mem::replace(&mut self.runtime.write().await.state, to);
        if from != to {
            debug!(from = %from, to = %to, "State transition");
            ctx.progress.on_state_change(from, to);
        }
    }

    async fn current_goal(&self) -> Result<Goal, PhaseError> {
        self.runtime
            .read()
            .await
            .goal
            .clone()
            .ok_or(PhaseError::NoGoal)
    }

    // ==================== Perceive ====================

    async fn perceive(&self, state: AgentState, ctx: &RunContext<'_>) -> Result<(), PhaseError> {
        let goal = self.current_goal().await?;
        if goal.is_overdue(chrono::Utc::now()) {
            warn!(goal = %goal.description, "Goal deadline has already passed");
        }

        let project_path = goal
            .context
            .clone()
            .or_else(|| self.params.working_dir.clone());
        let context = match (&self.analyzer, project_path) {
            (Some(analyzer), Some(path)) => match analyzer.analyze(Path::new(&path)).await {
                Ok(context) => Some(context),
                Err(e) => {
                    warn!("Project analysis failed, continuing without context: {}", e);
                    None
                }
            },
            _ => None,
        };

        let recalled = match &self.memory {
            Some(memory) => match memory.recall(&goal.description).await {
                Ok(learnings) => learnings,
                Err(e) => {
                    warn!("Memory recall failed, continuing without learnings: {}", e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let project = context
            .as_ref()
            .and_then(|c| c.project_type.as_deref())
            .map(|t| format!(" in a {t} project"))
            .unwrap_or_default();
        let reasoning = format!(
            "Goal '{}' ({} priority){}; recalled {} prior learnings",
            goal.description,
            goal.priority.as_str(),
            project,
            recalled.len()
        );
        let confidence = if context.is_some() { 0.9 } else { 0.7 };

        {
            let mut runtime = self.runtime.write().await;
            runtime.project_context = context;
            runtime.recalled = recalled;
        }

        self.record(
            ctx,
            Decision::new(state, DecisionType::Perceive, reasoning, confidence)
                .with_action("analyze_project"),
        )
        .await;
        self.transition(ctx, AgentState::Analyzing).await;
        Ok(())
    }

    // ==================== Plan ====================

    fn fallback_task(&self, goal: &Goal) -> Task {
        Task::new(
            "1",
            "Complete goal",
            goal.description.clone(),
            self.params.default_tool.clone(),
        )
        .with_description("Single-task plan forwarding the goal to the default tool")
        .with_priority(goal.priority)
    }

    async fn plan(&self, state: AgentState, ctx: &RunContext<'_>) -> Result<(), PhaseError> {
        let goal = self.current_goal().await?;
        let context = self.runtime.read().await.project_context.clone();

        let generated = match &self.planner {
            Some(planner) => match self
                .guard
                .call("planner", &ctx.cancel, || {
                    planner.generate_plan(&goal, context.as_ref())
                })
                .await
            {
                Ok(generated) => Some(generated),
                Err(GuardError::Cancelled) => return Err(PhaseError::Cancelled),
                Err(e) => {
                    warn!("Planner failed, falling back to a single-task plan: {}", e);
                    None
                }
            },
            None => None,
        };

        let (plan, decision) = match generated {
            Some(generated) => {
                let count = generated.tasks.len();
                let decision = Decision::new(
                    state,
                    DecisionType::Plan,
                    format!("Planner produced {count} tasks: {}", generated.reasoning),
                    0.8,
                )
                .with_action("generate_plan");
                (Plan::new(generated.tasks), decision)
            }
            None => {
                let decision = Decision::new(
                    state,
                    DecisionType::Plan,
                    format!(
                        "Fallback plan: 1 task forwarding the goal to '{}'",
                        self.params.default_tool
                    ),
                    0.5,
                )
                .with_action("fallback_plan");
                (Plan::new(vec![self.fallback_task(&goal)]), decision)
            }
        };

        info!(tasks = plan.len(), "Plan ready");
        ctx.progress.on_plan(&plan);
        self.runtime.write().await.plan = plan;
        self.record(ctx, decision).await;
        self.transition(ctx, AgentState::Planning).await;
        Ok(())
    }

    // ==================== Act ====================

    fn choose_tool(&self, task: &Task) -> ToolChoice {
        if self.params.dry_run {
            return ToolChoice::DryRun;
        }
        match self.tools.find_for_task(task).into_iter().next() {
            Some(tool) => ToolChoice::Tool(tool),
            None => ToolChoice::Missing,
        }
    }

    async fn act(&self, state: AgentState, ctx: &RunContext<'_>) -> Result<(), PhaseError> {
        let next = {
            let mut runtime = self.runtime.write().await;
            let interrupted = runtime.plan.reset_in_progress();
            if interrupted > 0 {
                debug!(interrupted, "Re-queued interrupted tasks");
            }
            runtime.plan.next_ready().map(|index| {
                runtime.plan.tasks[index].mark_in_progress();
                runtime.plan.tasks[index].clone()
            })
        };

        let Some(task) = next else {
            let (settled, total) = self.runtime.read().await.plan.progress();
            self.record(
                ctx,
                Decision::new(
                    state,
                    DecisionType::Advance,
                    format!("No ready task left ({settled}/{total} settled), moving to review"),
                    1.0,
                ),
            )
            .await;
            self.transition(ctx, AgentState::Reviewing).await;
            return Ok(());
        };

        ctx.progress.on_task_start(&task);
        info!(task = %task.id, name = %task.name, tool = %task.tool, "Executing task");

        let choice = self.choose_tool(&task);
        let decision = match &choice {
            ToolChoice::DryRun => Decision::new(
                state,
                DecisionType::SelectTool,
                format!("Dry run: synthesizing a result for task '{}'", task.name),
                1.0,
            )
            .with_action("dry_run"),
            ToolChoice::Tool(tool) => {
                let exact = tool.name() == task.tool;
                Decision::new(
                    state,
                    DecisionType::SelectTool,
                    format!("Task '{}' -> tool '{}'", task.name, tool.name()),
                    if exact { 0.9 } else { 0.7 },
                )
                .with_action(format!("execute:{}", tool.name()))
            }
            ToolChoice::Missing => Decision::new(
                state,
                DecisionType::SelectTool,
                format!("No tool registered for '{}'", task.tool),
                0.0,
            ),
        };
        self.record(ctx, decision).await;

        let result = match choice {
            ToolChoice::DryRun => TaskResult::success(task.id.clone(), task.tool.clone(), 0),
            ToolChoice::Tool(tool) => self.run_tool(&task, &tool, ctx).await,
            ToolChoice::Missing => {
                warn!(task = %task.id, tool = %task.tool, "No tool available for task");
                TaskResult::failure(
                    task.id.clone(),
                    task.tool.clone(),
                    0,
                    format!("no tool available for '{}'", task.tool),
                )
            }
        };

        let settled = {
            let mut runtime = self.runtime.write().await;
            runtime.record_result(result.clone());
            match runtime.plan.get_mut(&task.id) {
                Some(t) => {
                    t.settle(result.clone());
                    t.clone()
                }
                None => task.clone(),
            }
        };

        self.metrics.record_task(result.success);
        if !result.success {
            warn!(
                task = %task.id,
                error = result.error.as_deref().unwrap_or_default(),
                "Task failed"
            );
        }
        ctx.progress.on_task_complete(&settled, &result);
        self.transition(ctx, AgentState::Executing).await;
        Ok(())
    }

    async fn run_tool(
        &self,
        task: &Task,
        tool: &Arc<dyn Tool>,
        ctx: &RunContext<'_>,
    ) -> TaskResult {
        let started = Instant::now();
        let params = ToolParams::for_task(task).with_working_dir(self.params.working_dir.clone());

        let outcome = match &self.tool_retry {
            Some(retry) => retry
                .execute_with_result(tool.name(), Some(&ctx.cancel), |_| {
                    tool.execute(params.clone(), &ctx.cancel)
                })
                .await
                .map_err(|e| e.to_string()),
            None => tool
                .execute(params, &ctx.cancel)
                .await
                .map_err(|e| e.to_string()),
        };

        let elapsed = started.elapsed();
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let name = tool.name().to_string();

        match outcome {
            Ok(output) if output.success => {
                self.metrics.record_tool_call(&name, true, elapsed);
                let violations = self.check_constraints(task, &output.changes, ctx);
                TaskResult::success(task.id.clone(), name, duration_ms)
                    .with_changes(output.changes)
                    .with_violations(violations)
            }
            Ok(output) => {
                self.metrics.record_tool_call(&name, false, elapsed);
                let error = output
                    .error
                    .unwrap_or_else(|| "tool reported failure".to_string());
                TaskResult::failure(task.id.clone(), name, duration_ms, error)
                    .with_changes(output.changes)
            }
            Err(error) => {
                self.metrics.record_tool_call(&name, false, elapsed);
                TaskResult::failure(task.id.clone(), name, duration_ms, error)
            }
        }
    }

    /// Violations are advisory: logged and returned, never blocking.
    fn check_constraints(
        &self,
        task: &Task,
        changes: &[Change],
        ctx: &RunContext<'_>,
    ) -> Vec<String> {
        let violations = ctx.validator.validate(changes);
        for violation in &violations {
            warn!(task = %task.id, violation = %violation, "Constraint violation");
            ctx.progress.on_violation(task, violation);
        }
        self.metrics.record_violations(violations.len());
        violations.iter().map(ToString::to_string).collect()
    }

    // ==================== Review ====================

    async fn review(&self, state: AgentState, ctx: &RunContext<'_>) -> Result<(), PhaseError> {
        let changes: Vec<Change> = self
            .runtime
            .read()
            .await
            .plan
            .tasks
            .iter()
            .filter_map(|t| t.result.as_ref())
            .flat_map(|r| r.changes.iter().cloned())
            .collect();

        if changes.is_empty() {
            self.record(
                ctx,
                Decision::new(state, DecisionType::Approve, "No changes to review", 1.0)
                    .with_action("skip_review"),
            )
            .await;
            self.transition(ctx, AgentState::Reflecting).await;
            return Ok(());
        }

        let review = match &self.reviewer {
            Some(reviewer) => {
                let started = Instant::now();
                let outcome = self
                    .guard
                    .call("reviewer", &ctx.cancel, || reviewer.review(&changes))
                    .await;
                let elapsed = started.elapsed();
                match outcome {
                    Ok(review) => {
                        self.metrics.record_review(Some(review.verdict), elapsed);
                        review
                    }
                    Err(e) => {
                        self.metrics.record_review(None, elapsed);
                        return Err(guard_to_phase(e));
                    }
                }
            }
            None => ReviewResult::approve(100.0).with_comment("No reviewer configured"),
        };

        ctx.progress.on_review(&review);
        let reset = {
            let mut guard = self.runtime.write().await;
            let runtime = &mut *guard;
            for result in runtime
                .plan
                .tasks
                .iter_mut()
                .filter_map(|t| t.result.as_mut())
                .chain(runtime.completed.iter_mut())
                .filter(|r| !r.changes.is_empty())
            {
                result.review = Some(review.clone());
            }
            runtime.last_review = Some(review.clone());
            if review.verdict == ReviewVerdict::Reject {
                runtime.plan.reset_non_failed()
            } else {
                0
            }
        };

        let confidence = review.score / 100.0;
        let comments = review.comments.join("; ");
        match review.verdict {
            ReviewVerdict::Approve => {
                self.record(
                    ctx,
                    Decision::new(
                        state,
                        DecisionType::Approve,
                        format!(
                            "Reviewer approved {} changes (score {:.0})",
                            changes.len(),
                            review.score
                        ),
                        confidence,
                    ),
                )
                .await;
                self.transition(ctx, AgentState::Reflecting).await;
            }
            ReviewVerdict::RequestChanges => {
                warn!(comments = %comments, "Reviewer requested changes; accepting with warning");
                self.record(
                    ctx,
                    Decision::new(
                        state,
                        DecisionType::RequestChanges,
                        format!("Changes requested, accepted with warning: {comments}"),
                        confidence,
                    ),
                )
                .await;
                self.transition(ctx, AgentState::Reflecting).await;
            }
            ReviewVerdict::Reject => {
                info!(reset, "Reviewer rejected changes, re-queuing tasks");
                self.record(
                    ctx,
                    Decision::new(
                        state,
                        DecisionType::Reject,
                        format!("Reviewer rejected changes; {reset} tasks re-queued: {comments}"),
                        confidence,
                    )
                    .with_action("requeue"),
                )
                .await;
                self.transition(ctx, AgentState::Planning).await;
            }
        }
        Ok(())
    }

    // ==================== Reflect ====================

    async fn reflect(&self, state: AgentState, ctx: &RunContext<'_>) -> Result<(), PhaseError> {
        let goal = self.current_goal().await?;
        let (plan, last_review) = {
            let runtime = self.runtime.read().await;
            (runtime.plan.clone(), runtime.last_review.clone())
        };

        let total = plan.len();
        let succeeded = plan.count(TaskStatus::Complete);
        let failed: Vec<&Task> = plan
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .collect();
        let all_succeeded = total > 0 && succeeded == total;
        let confidence = if all_succeeded {
            HIGH_CONFIDENCE
        } else {
            BASELINE_CONFIDENCE
        };
        let success_rate = if total == 0 {
            0.0
        } else {
            succeeded as f64 / total as f64
        };

        let lesson = if total == 0 {
            "Plan had no tasks".to_string()
        } else if all_succeeded {
            format!("All {total} tasks succeeded")
        } else if failed.is_empty() {
            format!("{succeeded}/{total} tasks succeeded")
        } else {
            let names: Vec<&str> = failed.iter().map(|t| t.name.as_str()).collect();
            format!(
                "{succeeded}/{total} tasks succeeded; failed: {}",
                names.join(", ")
            )
        };

        let tools: BTreeSet<&str> = plan
            .tasks
            .iter()
            .filter_map(|t| t.result.as_ref())
            .map(|r| r.tool.as_str())
            .collect();
        let mut learning = Learning::new(goal.description.clone(), lesson.clone(), confidence)
            .with_success_rate(success_rate)
            .with_tag(goal.priority.as_str());
        for tool in tools {
            learning = learning.with_tag(tool);
        }

        if let Some(memory) = &self.memory {
            match memory.store(&learning).await {
                Ok(()) => self.metrics.record_learning(),
                Err(e) => warn!("Failed to store learning: {}", e),
            }
        }
        self.runtime.write().await.learnings.push(learning);

        if plan.needs_more_work() {
            let pending = plan.count(TaskStatus::Pending);
            let reason = format!("{pending} pending, {} failed", failed.len());
            let mut feedback: Vec<String> = failed
                .iter()
                .filter_map(|t| {
                    t.result
                        .as_ref()
                        .and_then(|r| r.error.as_ref())
                        .map(|e| format!("{}: {}", t.name, e))
                })
                .collect();
            if let Some(review) = last_review {
                feedback.extend(review.comments);
            }

            let how = self.replan(&plan, &reason, &feedback, ctx).await?;
            self.record(
                ctx,
                Decision::new(
                    state,
                    DecisionType::Reflect,
                    format!("{lesson}; re-planning ({reason}): {how}"),
                    confidence,
                )
                .with_action("replan"),
            )
            .await;
            self.transition(ctx, AgentState::Planning).await;
        } else {
            self.record(
                ctx,
                Decision::new(
                    state,
                    DecisionType::Complete,
                    format!("{lesson}; goal complete"),
                    confidence,
                )
                .with_action("complete"),
            )
            .await;
            self.transition(ctx, AgentState::Complete).await;
        }
        Ok(())
    }

    /// Asks the planner for a revised plan; re-queues failed tasks when
    /// there is no planner or it cannot help.
    async fn replan(
        &self,
        plan: &Plan,
        reason: &str,
        feedback: &[String],
        ctx: &RunContext<'_>,
    ) -> Result<String, PhaseError> {
        if let Some(planner) = &self.planner {
            match self
                .guard
                .call("planner", &ctx.cancel, || {
                    planner.adapt_plan(plan, reason, feedback)
                })
                .await
            {
                Ok(tasks) if !tasks.is_empty() => {
                    let revised = Plan::new(tasks);
                    let count = revised.len();
                    ctx.progress.on_plan(&revised);
                    self.runtime.write().await.plan = revised;
                    return Ok(format!("planner revised the plan to {count} tasks"));
                }
                Ok(_) => warn!("Planner returned an empty revision, re-queuing failed tasks"),
                Err(GuardError::Cancelled) => return Err(PhaseError::Cancelled),
                Err(e) => warn!("Plan adaptation failed, re-queuing failed tasks: {}", e),
            }
        }
        let reset = self.runtime.write().await.plan.reset_failed();
        Ok(format!("re-queued {reset} failed tasks"))
    }
}
