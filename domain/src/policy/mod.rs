//! Policy checks applied to tool output.

pub mod constraint;

pub use constraint::{
    Constraint, ConstraintValidator, DEFAULT_SMALL_CHANGE_LINES, PolicyRule, Violation,
};
