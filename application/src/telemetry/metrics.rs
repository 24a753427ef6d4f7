//! Execution telemetry.
//!
//! [`Metrics`] accumulates counters and latency totals across executions,
//! decisions, tool calls, tasks, reviews and learnings. One instance is
//! usually shared (`Arc<Metrics>`) by an engine for its whole lifetime;
//! [`Metrics::summary`] renders a flat key/value view for operators.

use conductor_domain::{DecisionType, ReviewVerdict};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct ToolStats {
    calls: u64,
    errors: u64,
    latency_ms: u64,
}

#[derive(Debug, Default)]
struct MetricsInner {
    executions_total: u64,
    executions_succeeded: u64,
    execution_ms_total: u64,
    decisions: BTreeMap<String, u64>,
    tools: BTreeMap<String, ToolStats>,
    tasks_completed: u64,
    tasks_failed: u64,
    reviews: BTreeMap<String, u64>,
    review_errors: u64,
    review_ms_total: u64,
    learnings_stored: u64,
    constraint_violations: u64,
    checkpoints_saved: u64,
}

#[derive(Debug)]
pub struct Metrics {
    started: Instant,
    inner: Mutex<MetricsInner>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            inner: Mutex::new(MetricsInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricsInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_execution(&self, success: bool, duration: Duration) {
        let mut inner = self.lock();
        inner.executions_total += 1;
        if success {
            inner.executions_succeeded += 1;
        }
        inner.execution_ms_total += ms(duration);
    }

    pub fn record_decision(&self, decision_type: DecisionType) {
        *self
            .lock()
            .decisions
            .entry(decision_type.as_str().to_string())
            .or_default() += 1;
    }

    pub fn record_tool_call(&self, tool: &str, success: bool, latency: Duration) {
        let mut inner = self.lock();
        let stats = inner.tools.entry(tool.to_string()).or_default();
        stats.calls += 1;
        if !success {
            stats.errors += 1;
        }
        stats.latency_ms += ms(latency);
    }

    pub fn record_task(&self, success: bool) {
        let mut inner = self.lock();
        if success {
            inner.tasks_completed += 1;
        } else {
            inner.tasks_failed += 1;
        }
    }

    /// `verdict` is `None` when the reviewer call itself failed; the
    /// latency is recorded either way.
    pub fn record_review(&self, verdict: Option<ReviewVerdict>, latency: Duration) {
        let mut inner = self.lock();
        match verdict {
            Some(v) => *inner.reviews.entry(v.as_str().to_string()).or_default() += 1,
            None => inner.review_errors += 1,
        }
        inner.review_ms_total += ms(latency);
    }

    pub fn record_learning(&self) {
        self.lock().learnings_stored += 1;
    }

    pub fn record_violations(&self, count: usize) {
        self.lock().constraint_violations += count as u64;
    }

    pub fn record_checkpoint(&self) {
        self.lock().checkpoints_saved += 1;
    }

    pub fn decision_count(&self, decision_type: DecisionType) -> u64 {
        self.lock()
            .decisions
            .get(decision_type.as_str())
            .copied()
            .unwrap_or(0)
    }

    /// Flat, sorted key/value view of every counter and derived rate.
    pub fn summary(&self) -> BTreeMap<String, Value> {
        let inner = self.lock();
        let mut out = BTreeMap::new();

        out.insert("executions_total".into(), json!(inner.executions_total));
        out.insert(
            "execution_success_rate".into(),
            json!(ratio(inner.executions_succeeded, inner.executions_total)),
        );
        out.insert(
            "avg_execution_ms".into(),
            json!(ratio(inner.execution_ms_total, inner.executions_total)),
        );

        let decisions_total: u64 = inner.decisions.values().sum();
        out.insert("decisions_total".into(), json!(decisions_total));
        for (kind, count) in &inner.decisions {
            out.insert(format!("decisions.{kind}"), json!(count));
        }

        let (calls, errors, latency) = inner.tools.values().fold((0, 0, 0), |acc, s| {
            (acc.0 + s.calls, acc.1 + s.errors, acc.2 + s.latency_ms)
        });
        out.insert("tool_calls_total".into(), json!(calls));
        out.insert("tool_error_rate".into(), json!(ratio(errors, calls)));
        out.insert("avg_tool_latency_ms".into(), json!(ratio(latency, calls)));
        for (tool, stats) in &inner.tools {
            out.insert(format!("tools.{tool}.calls"), json!(stats.calls));
            out.insert(format!("tools.{tool}.errors"), json!(stats.errors));
        }

        out.insert("tasks_completed".into(), json!(inner.tasks_completed));
        out.insert("tasks_failed".into(), json!(inner.tasks_failed));
        out.insert(
            "task_success_rate".into(),
            json!(ratio(
                inner.tasks_completed,
                inner.tasks_completed + inner.tasks_failed
            )),
        );

        let reviews_total: u64 = inner.reviews.values().sum::<u64>() + inner.review_errors;
        out.insert("reviews_total".into(), json!(reviews_total));
        out.insert("review_errors".into(), json!(inner.review_errors));
        for (verdict, count) in &inner.reviews {
            out.insert(format!("reviews.{verdict}"), json!(count));
        }
        out.insert(
            "avg_review_ms".into(),
            json!(ratio(inner.review_ms_total, reviews_total)),
        );

        out.insert("learnings_stored".into(), json!(inner.learnings_stored));
        out.insert(
            "constraint_violations".into(),
            json!(inner.constraint_violations),
        );
        out.insert("checkpoints_saved".into(), json!(inner.checkpoints_saved));
        out.insert(
            "uptime_secs".into(),
            json!(self.started.elapsed().as_secs()),
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary_has_zero_rates() {
        let summary = Metrics::new().summary();
        assert_eq!(summary["executions_total"], json!(0));
        assert_eq!(summary["execution_success_rate"], json!(0.0));
        assert_eq!(summary["tool_error_rate"], json!(0.0));
        assert!(summary.contains_key("uptime_secs"));
    }

    #[test]
    fn test_execution_and_tool_rates() {
        let metrics = Metrics::new();
        metrics.record_execution(true, Duration::from_millis(100));
        metrics.record_execution(false, Duration::from_millis(300));
        metrics.record_tool_call("run_command", true, Duration::from_millis(10));
        metrics.record_tool_call("run_command", false, Duration::from_millis(30));
        metrics.record_tool_call("editor", true, Duration::from_millis(20));

        let summary = metrics.summary();
        assert_eq!(summary["executions_total"], json!(2));
        assert_eq!(summary["execution_success_rate"], json!(0.5));
        assert_eq!(summary["avg_execution_ms"], json!(200.0));
        assert_eq!(summary["tool_calls_total"], json!(3));
        assert_eq!(summary["avg_tool_latency_ms"], json!(20.0));
        assert_eq!(summary["tools.run_command.errors"], json!(1));
        assert_eq!(summary["tools.editor.calls"], json!(1));
    }

    #[test]
    fn test_decisions_reviews_and_counters() {
        let metrics = Metrics::new();
        metrics.record_decision(DecisionType::Plan);
        metrics.record_decision(DecisionType::SelectTool);
        metrics.record_decision(DecisionType::SelectTool);
        metrics.record_review(Some(ReviewVerdict::Approve), Duration::from_millis(40));
        metrics.record_review(None, Duration::from_millis(20));
        metrics.record_task(true);
        metrics.record_task(false);
        metrics.record_learning();
        metrics.record_violations(2);
        metrics.record_checkpoint();

        assert_eq!(metrics.decision_count(DecisionType::SelectTool), 2);
        assert_eq!(metrics.decision_count(DecisionType::Reject), 0);

        let summary = metrics.summary();
        assert_eq!(summary["decisions_total"], json!(3));
        assert_eq!(summary["decisions.select_tool"], json!(2));
        assert_eq!(summary["reviews_total"], json!(2));
        assert_eq!(summary["reviews.approve"], json!(1));
        assert_eq!(summary["review_errors"], json!(1));
        assert_eq!(summary["avg_review_ms"], json!(30.0));
        assert_eq!(summary["task_success_rate"], json!(0.5));
        assert_eq!(summary["learnings_stored"], json!(1));
        assert_eq!(summary["constraint_violations"], json!(2));
        assert_eq!(summary["checkpoints_saved"], json!(1));
    }
}
