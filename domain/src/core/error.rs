//! Domain error types

use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Goal description cannot be empty")]
    EmptyGoal,

    #[error("Task '{0}' has an empty prompt")]
    EmptyTaskPrompt(String),

    #[error("Unknown priority: {0}")]
    UnknownPriority(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl DomainError {
    /// Check if this error represents a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DomainError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_goal_display() {
        assert_eq!(
            DomainError::EmptyGoal.to_string(),
            "Goal description cannot be empty"
        );
    }

    #[test]
    fn test_is_cancelled_check() {
        assert!(DomainError::Cancelled.is_cancelled());
        assert!(!DomainError::EmptyGoal.is_cancelled());
        assert!(!DomainError::UnknownPriority("urgent".to_string()).is_cancelled());
    }
}
