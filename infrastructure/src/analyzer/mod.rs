//! Project analysis
//!
//! Provides [`LocalProjectAnalyzer`], which inspects a project directory on
//! the local file system and implements the
//! [`ProjectAnalyzerPort`](conductor_application::ProjectAnalyzerPort).

mod local;

pub use local::LocalProjectAnalyzer;
