//! Planning adapters
//!
//! Provides [`TaskFilePlanner`], which serves a hand-written task list from
//! disk through the [`PlannerPort`](conductor_application::PlannerPort).

mod task_file;

pub use task_file::TaskFilePlanner;
