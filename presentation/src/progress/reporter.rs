//! Progress reporting for engine execution

use colored::Colorize;
use conductor_application::AgentProgressNotifier;
use conductor_domain::{
    AgentState, CheckpointId, Decision, Plan, ReviewResult, ReviewVerdict, Task, TaskResult,
    Violation,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Reports progress with a state spinner and a task bar
pub struct ProgressReporter {
    multi: MultiProgress,
    state_bar: Mutex<Option<ProgressBar>>,
    task_bar: Mutex<Option<ProgressBar>>,
    verbose: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state_bar: Mutex::new(None),
            task_bar: Mutex::new(None),
            verbose: false,
        }
    }

    /// Also prints every decision
    pub fn verbose() -> Self {
        Self {
            verbose: true,
            ..Self::new()
        }
    }

    fn state_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {prefix:.bold.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn task_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("  {prefix:.bold} [{bar:30.blue/dim}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }

    fn state_icon(state: AgentState) -> &'static str {
        match state {
            AgentState::Idle => "·",
            AgentState::Analyzing => "🔍",
            AgentState::Planning => "📝",
            AgentState::Executing => "⚡",
            AgentState::Reviewing => "🔎",
            AgentState::Reflecting => "💭",
            AgentState::Complete => "🎉",
            AgentState::Failed => "❌",
        }
    }

    /// Print above the bars without tearing them
    fn print(&self, line: String) {
        if self.multi.println(&line).is_err() {
            println!("{}", line);
        }
    }

    fn finish_bars(&self) {
        if let Some(pb) = lock(&self.state_bar).take() {
            pb.finish_and_clear();
        }
        if let Some(pb) = lock(&self.task_bar).take() {
            pb.finish_and_clear();
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentProgressNotifier for ProgressReporter {
    fn on_state_change(&self, _from: AgentState, to: AgentState) {
        if to.is_terminal() {
            return;
        }
        let mut state_bar = lock(&self.state_bar);
        let pb = state_bar.get_or_insert_with(|| {
            let pb = self.multi.insert(0, ProgressBar::new_spinner());
            pb.set_style(Self::state_style());
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });
        pb.set_prefix(format!("{} {}", Self::state_icon(to), to.display_name()));
        pb.set_message("...");
    }

    fn on_decision(&self, decision: &Decision) {
        if let Some(pb) = lock(&self.state_bar).as_ref() {
            pb.set_message(truncate(&decision.reasoning, 60));
        }
        if self.verbose {
            self.print(format!(
                "    {} {} ({:.2}): {}",
                "•".dimmed(),
                decision.decision_type.to_string().dimmed(),
                decision.confidence,
                decision.reasoning.dimmed()
            ));
        }
    }

    fn on_plan(&self, plan: &Plan) {
        let mut task_bar = lock(&self.task_bar);
        let pb = task_bar.get_or_insert_with(|| {
            let pb = self.multi.add(ProgressBar::new(0));
            pb.set_style(Self::task_style());
            pb.set_prefix("Tasks");
            pb
        });
        let (settled, total) = plan.progress();
        pb.set_length(total as u64);
        pb.set_position(settled as u64);

        if self.verbose {
            for task in &plan.tasks {
                self.print(format!(
                    "    {} [{}] {} ({})",
                    "→".blue(),
                    task.id,
                    task.name,
                    task.tool.cyan()
                ));
            }
        }
    }

    fn on_task_start(&self, task: &Task) {
        if let Some(pb) = lock(&self.task_bar).as_ref() {
            pb.set_message(truncate(&task.name, 40));
        }
    }

    fn on_task_complete(&self, task: &Task, result: &TaskResult) {
        if let Some(pb) = lock(&self.task_bar).as_ref() {
            pb.inc(1);
        }
        if result.success {
            if self.verbose {
                self.print(format!("    {} {}", "✓".green(), task.name.green()));
            }
        } else {
            self.print(format!(
                "    {} {}: {}",
                "✗".red(),
                task.name.red(),
                result.error.as_deref().unwrap_or("failed")
            ));
        }
    }

    fn on_violation(&self, task: &Task, violation: &Violation) {
        self.print(format!(
            "    {} {} [{}] {}",
            "⚠".yellow(),
            task.name,
            violation.constraint.yellow(),
            violation.message
        ));
    }

    fn on_review(&self, review: &ReviewResult) {
        let verdict = match review.verdict {
            ReviewVerdict::Approve => "approved".green(),
            ReviewVerdict::RequestChanges => "changes requested".yellow(),
            ReviewVerdict::Reject => "rejected".red(),
        };
        self.print(format!(
            "    {} Review {} (score {:.0})",
            "🔎".dimmed(),
            verdict,
            review.score
        ));
        for comment in &review.comments {
            self.print(format!("      {}", comment.dimmed()));
        }
    }

    fn on_checkpoint(&self, id: &CheckpointId) {
        if self.verbose {
            self.print(format!("    {} {}", "💾".dimmed(), id.as_str().dimmed()));
        }
    }

    fn on_complete(&self, state: AgentState, summary: &str) {
        self.finish_bars();
        let icon = Self::state_icon(state);
        if state == AgentState::Complete {
            println!("{} {} {}", icon, state.display_name().green().bold(), summary);
        } else {
            println!("{} {} {}", icon, state.display_name().red().bold(), summary);
        }
    }
}

/// Simple text-based progress (no fancy UI)
pub struct SimpleProgress;

impl AgentProgressNotifier for SimpleProgress {
    fn on_state_change(&self, _from: AgentState, to: AgentState) {
        if !to.is_terminal() {
            println!("{} {}", "->".cyan(), to.display_name().bold());
        }
    }

    fn on_task_complete(&self, task: &Task, result: &TaskResult) {
        if result.success {
            println!("  {} {}", "v".green(), task.name);
        } else {
            println!("  {} {} (failed)", "x".red(), task.name);
        }
    }

    fn on_violation(&self, task: &Task, violation: &Violation) {
        println!("  {} {}: {}", "!".yellow(), task.name, violation.message);
    }

    fn on_complete(&self, state: AgentState, summary: &str) {
        println!("{} {}", state.display_name().bold(), summary);
    }
}
