//! Task file planner.
//!
//! Reads a hand-written plan from a TOML (or `.json`) file:
//!
//! ```toml
//! reasoning = "Build before test"
//!
//! [[tasks]]
//! id = "build"
//! name = "Build"
//! prompt = "cargo build"
//! tool = "run_command"
//!
//! [[tasks]]
//! id = "test"
//! name = "Test"
//! prompt = "cargo test"
//! tool = "run_command"
//! depends_on = ["build"]
//! ```
//!
//! The file is re-read on every call, so edits made while a run is in
//! progress are picked up when the engine replans.

use async_trait::async_trait;
use conductor_application::ports::planner::{GeneratedPlan, PlannerError, PlannerPort};
use conductor_domain::{Goal, Plan, ProjectContext, Task, TaskId, TaskStatus};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct TaskFile {
    #[serde(default)]
    reasoning: Option<String>,
    tasks: Vec<Task>,
}

/// Planner backed by a task file on disk
#[derive(Debug, Clone)]
pub struct TaskFilePlanner {
    path: PathBuf,
}

impl TaskFilePlanner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<TaskFile, PlannerError> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            PlannerError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;

        let mut file: TaskFile = if self.path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents).map_err(|e| PlannerError::Failed(e.to_string()))?
        } else {
            toml::from_str(&contents).map_err(|e| PlannerError::Failed(e.to_string()))?
        };

        validate_tasks(&file.tasks)?;
        for task in &mut file.tasks {
            task.reset();
        }
        Ok(file)
    }
}

/// Ids must be unique, prompts non-blank and dependencies resolvable.
fn validate_tasks(tasks: &[Task]) -> Result<(), PlannerError> {
    let mut seen: HashSet<&TaskId> = HashSet::new();
    for task in tasks {
        if !seen.insert(&task.id) {
            return Err(PlannerError::Failed(format!("duplicate task id '{}'", task.id)));
        }
        if task.prompt.trim().is_empty() {
            return Err(PlannerError::Failed(format!(
                "task '{}' has an empty prompt",
                task.id
            )));
        }
    }
    for task in tasks {
        if let Some(missing) = task.depends_on.iter().find(|dep| !seen.contains(dep)) {
            return Err(PlannerError::Failed(format!(
                "task '{}' depends on unknown task '{}'",
                task.id, missing
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl PlannerPort for TaskFilePlanner {
    async fn generate_plan(
        &self,
        goal: &Goal,
        _context: Option<&ProjectContext>,
    ) -> Result<GeneratedPlan, PlannerError> {
        if goal.description.trim().is_empty() {
            return Err(PlannerError::InvalidGoal(
                "goal description is empty".to_string(),
            ));
        }
        let file = self.load().await?;
        info!(path = %self.path.display(), tasks = file.tasks.len(), "Loaded task file");
        let reasoning = file
            .reasoning
            .unwrap_or_else(|| format!("Tasks loaded from {}", self.path.display()));
        Ok(GeneratedPlan::new(file.tasks, reasoning))
    }

    /// Keeps completed tasks, requeues the rest and appends tasks that
    /// were added to the file since the plan was generated.
    async fn adapt_plan(
        &self,
        plan: &Plan,
        reason: &str,
        feedback: &[String],
    ) -> Result<Vec<Task>, PlannerError> {
        let file = self.load().await?;
        let known: HashSet<&TaskId> = plan.tasks.iter().map(|t| &t.id).collect();

        let mut tasks: Vec<Task> = plan
            .tasks
            .iter()
            .cloned()
            .map(|mut task| {
                if task.status != TaskStatus::Complete {
                    task.reset();
                }
                task
            })
            .collect();
        let added: Vec<Task> = file
            .tasks
            .into_iter()
            .filter(|t| !known.contains(&t.id))
            .collect();

        debug!(reason, feedback = feedback.len(), added = added.len(), "Adapted plan");
        tasks.extend(added);
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_domain::{Priority, TaskResult};
    use std::fs;
    use tempfile::tempdir;

    const PLAN: &str = r#"
reasoning = "Build before test"

[[tasks]]
id = "build"
name = "Build"
prompt = "cargo build"
tool = "run_command"
priority = "high"

[[tasks]]
id = "test"
name = "Test"
prompt = "cargo test"
tool = "run_command"
depends_on = ["build"]
"#;

    #[tokio::test]
    async fn test_generate_from_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plan.toml");
        fs::write(&path, PLAN).unwrap();

        let plan = TaskFilePlanner::new(&path)
            .generate_plan(&Goal::new("ship it"), None)
            .await
            .unwrap();

        assert_eq!(plan.reasoning, "Build before test");
        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[0].priority, Priority::High);
        assert_eq!(plan.tasks[1].depends_on, vec![TaskId::from("build")]);
        assert!(plan.tasks.iter().all(|t| t.status == TaskStatus::Pending));
    }

    #[tokio::test]
    async fn test_generate_from_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plan.json");
        fs::write(
            &path,
            r#"{"tasks":[{"id":"1","name":"lint","prompt":"cargo clippy","tool":"run_command"}]}"#,
        )
        .unwrap();

        let plan = TaskFilePlanner::new(&path)
            .generate_plan(&Goal::new("lint"), None)
            .await
            .unwrap();
        assert_eq!(plan.tasks.len(), 1);
        assert!(plan.reasoning.contains("plan.json"));
    }

    #[tokio::test]
    async fn test_errors() {
        let dir = tempdir().unwrap();
        let missing = TaskFilePlanner::new(dir.path().join("missing.toml"));
        assert!(matches!(
            missing.generate_plan(&Goal::new("x"), None).await,
            Err(PlannerError::Unavailable(_))
        ));

        let path = dir.path().join("plan.toml");
        fs::write(&path, PLAN).unwrap();
        assert!(matches!(
            TaskFilePlanner::new(&path)
                .generate_plan(&Goal::new("  "), None)
                .await,
            Err(PlannerError::InvalidGoal(_))
        ));

        fs::write(&path, PLAN.replace("depends_on = [\"build\"]", "depends_on = [\"deploy\"]"))
            .unwrap();
        let result = TaskFilePlanner::new(&path)
            .generate_plan(&Goal::new("x"), None)
            .await;
        assert!(matches!(result, Err(PlannerError::Failed(msg)) if msg.contains("deploy")));
    }

    #[tokio::test]
    async fn test_adapt_keeps_completed_and_appends_new_tasks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plan.toml");
        fs::write(&path, PLAN).unwrap();
        let planner = TaskFilePlanner::new(&path);

        let generated = planner.generate_plan(&Goal::new("x"), None).await.unwrap();
        let mut plan = Plan::new(generated.tasks);
        plan.tasks[0].settle(TaskResult::success("build", "run_command", 5));
        plan.tasks[1].settle(TaskResult::failure("test", "run_command", 5, "1 failed"));

        fs::write(
            &path,
            format!(
                "{PLAN}\n[[tasks]]\nid = \"fix\"\nname = \"Fix\"\nprompt = \"cargo fix\"\ntool = \"run_command\"\n"
            ),
        )
        .unwrap();

        let tasks = planner
            .adapt_plan(&plan, "1 task failed", &[])
            .await
            .unwrap();
        let summary: Vec<(&str, TaskStatus)> =
            tasks.iter().map(|t| (t.id.as_str(), t.status)).collect();
        assert_eq!(
            summary,
            vec![
                ("build", TaskStatus::Complete),
                ("test", TaskStatus::Pending),
                ("fix", TaskStatus::Pending),
            ]
        );
    }
}
