//! Local file system project analyzer
//!
//! Detects the project type from build manifests, collects the key files
//! a planner would want to look at, and lifts a one-paragraph summary out
//! of the README.
//!
//! # Detection
//!
//! Markers are checked in order; the first hit decides the project type:
//!
//! | Marker                              | Type     |
//! |-------------------------------------|----------|
//! | `Cargo.toml`                        | `rust`   |
//! | `package.json`                      | `node`   |
//! | `pyproject.toml`, `setup.py`        | `python` |
//! | `go.mod`                            | `go`     |
//! | `pom.xml`, `build.gradle(.kts)`     | `java`   |

use async_trait::async_trait;
use conductor_application::ports::project_analyzer::{AnalyzerError, ProjectAnalyzerPort};
use conductor_domain::ProjectContext;
use glob::glob;
use std::fs;
use std::path::Path;
use tracing::debug;

const MARKERS: &[(&str, &str)] = &[
    ("Cargo.toml", "rust"),
    ("package.json", "node"),
    ("pyproject.toml", "python"),
    ("setup.py", "python"),
    ("go.mod", "go"),
    ("pom.xml", "java"),
    ("build.gradle", "java"),
    ("build.gradle.kts", "java"),
];

const DOC_FILES: &[&str] = &["README.md", "CLAUDE.md", "CONTRIBUTING.md", "CHANGELOG.md"];

/// Maximum number of `docs/**/*.md` files listed as key files
const MAX_DOCS: usize = 20;

/// Maximum summary length in characters
const MAX_SUMMARY_CHARS: usize = 500;

#[derive(Debug, Clone, Default)]
pub struct LocalProjectAnalyzer;

impl LocalProjectAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn analyze_sync(&self, root: &Path) -> Result<ProjectContext, AnalyzerError> {
        if !root.is_dir() {
            return Err(AnalyzerError::NotFound(root.display().to_string()));
        }

        let mut context = ProjectContext::new().with_root(root.display().to_string());

        for (marker, project_type) in MARKERS {
            if root.join(marker).is_file() {
                if context.project_type.is_none() {
                    context = context.with_project_type(*project_type);
                }
                context.add_key_file(*marker);
            }
        }

        for doc in DOC_FILES {
            if root.join(doc).is_file() {
                context.add_key_file(*doc);
            }
        }

        for doc in Self::docs_markdown(root) {
            context.add_key_file(doc);
        }

        context.summary = Self::readme_summary(root);
        if root.join(".git").exists() {
            context
                .additional
                .insert("vcs".to_string(), "git".to_string());
        }

        debug!(
            root = %root.display(),
            project_type = context.project_type.as_deref().unwrap_or("unknown"),
            key_files = context.key_files.len(),
            "Project analyzed"
        );
        Ok(context)
    }

    /// Relative paths of markdown files under `docs/`, sorted.
    fn docs_markdown(root: &Path) -> Vec<String> {
        let pattern = format!("{}/docs/**/*.md", root.display());
        let Ok(entries) = glob(&pattern) else {
            return Vec::new();
        };
        let mut docs: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|path| {
                path.strip_prefix(root)
                    .ok()
                    .map(|p| p.display().to_string())
            })
            .collect();
        docs.sort();
        docs.truncate(MAX_DOCS);
        docs
    }

    /// First prose paragraph of the README, skipping headings and badges.
    fn readme_summary(root: &Path) -> Option<String> {
        let content = fs::read_to_string(root.join("README.md")).ok()?;
        let paragraph: Vec<&str> = content
            .lines()
            .map(str::trim)
            .skip_while(|line| {
                line.is_empty() || line.starts_with('#') || line.starts_with("[![")
            })
            .take_while(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();
        if paragraph.is_empty() {
            return None;
        }
        let summary = paragraph.join(" ");
        Some(summary.chars().take(MAX_SUMMARY_CHARS).collect())
    }
}

#[async_trait]
impl ProjectAnalyzerPort for LocalProjectAnalyzer {
    async fn analyze(&self, path: &Path) -> Result<ProjectContext, AnalyzerError> {
        let analyzer = self.clone();
        let root = path.to_path_buf();
        tokio::task::spawn_blocking(move || analyzer.analyze_sync(&root))
            .await
            .map_err(|e| AnalyzerError::Failed(e.to_string()))?
    }
}
