//! Checkpoint entity - a durable point-in-time snapshot of a run.

use super::entities::{AgentState, Goal, Plan};
use super::value_objects::{Decision, TaskResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// File/record name prefix shared by every checkpoint identifier
pub const CHECKPOINT_PREFIX: &str = "checkpoint_";

/// Identifier of a checkpoint, derived from its creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(String);

impl CheckpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `checkpoint_[<instance>_]<unix-millis>_<seq>`.
    ///
    /// `seq` disambiguates checkpoints taken within the same millisecond;
    /// `instance` keeps engines sharing one directory from colliding.
    pub fn generate(at: DateTime<Utc>, seq: u64, instance: Option<&str>) -> Self {
        let millis = at.timestamp_millis();
        match instance {
            Some(instance) => Self(format!(
                "{CHECKPOINT_PREFIX}{instance}_{millis}_{seq:04}"
            )),
            None => Self(format!("{CHECKPOINT_PREFIX}{millis}_{seq:04}")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a record name follows the checkpoint naming convention.
    pub fn is_checkpoint_name(name: &str) -> bool {
        name.starts_with(CHECKPOINT_PREFIX) && name.len() > CHECKPOINT_PREFIX.len()
    }
}

impl<T: Into<String>> From<T> for CheckpointId {
    fn from(s: T) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable snapshot of the engine's mutable fields.
///
/// A checkpoint owns deep copies of everything it holds; mutating it never
/// affects the live agent and vice versa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub timestamp: DateTime<Utc>,
    pub state: AgentState,
    pub goal: Option<Goal>,
    pub plan: Plan,
    pub decisions: Vec<Decision>,
    pub completed: Vec<TaskResult>,
    pub iteration: usize,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Checkpoint {
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// One-line human description, used by listings.
    pub fn describe(&self) -> String {
        let (settled, total) = self.plan.progress();
        let goal = self
            .goal
            .as_ref()
            .map(|g| g.description.as_str())
            .unwrap_or("<no goal>");
        format!(
            "{} [{}] iteration {} tasks {}/{} - {}",
            self.id,
            self.state.as_str(),
            self.iteration,
            settled,
            total,
            goal
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_checkpoint_id_generate() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let id = CheckpointId::generate(at, 7, None);
        assert_eq!(id.as_str(), "checkpoint_1700000000123_0007");

        let scoped = CheckpointId::generate(at, 0, Some("worker-a"));
        assert_eq!(scoped.as_str(), "checkpoint_worker-a_1700000000123_0000");
    }

    #[test]
    fn test_checkpoint_name_convention() {
        assert!(CheckpointId::is_checkpoint_name("checkpoint_1_0001"));
        assert!(!CheckpointId::is_checkpoint_name("checkpoint_"));
        assert!(!CheckpointId::is_checkpoint_name("notes.json"));
    }

    #[test]
    fn test_checkpoint_is_a_deep_copy() {
        let plan = Plan::new(vec![super::super::entities::Task::new(
            "1", "build", "cargo build", "coder",
        )]);
        let checkpoint = Checkpoint {
            id: CheckpointId::new("checkpoint_1_0000"),
            timestamp: Utc::now(),
            state: AgentState::Executing,
            goal: Some(Goal::new("build it")),
            plan: plan.clone(),
            decisions: Vec::new(),
            completed: Vec::new(),
            iteration: 3,
            metadata: BTreeMap::new(),
        };

        let mut copy = checkpoint.clone();
        copy.plan.tasks[0].mark_in_progress();
        assert_ne!(copy.plan, checkpoint.plan);
        assert_eq!(checkpoint.plan, plan);
    }
}
