//! Change detection through `git status`.
//!
//! A snapshot maps each dirty path (relative to the repository root) to
//! its two-letter porcelain status. Paths whose status differs between two
//! snapshots are the changes a command made.

use conductor_domain::{Change, ChangeKind};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Largest untracked file turned into a synthetic diff
const MAX_NEW_FILE_BYTES: u64 = 256 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StatusSnapshot {
    root: PathBuf,
    entries: BTreeMap<String, String>,
}

async fn git(dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `None` when `dir` is not inside a git work tree or git is unavailable.
pub(crate) async fn snapshot(dir: &Path) -> Option<StatusSnapshot> {
    let root = git(dir, &["rev-parse", "--show-toplevel"]).await?;
    let root = PathBuf::from(root.trim());
    let status = git(&root, &["status", "--porcelain=v1", "--untracked-files=all"]).await?;
    Some(StatusSnapshot {
        root,
        entries: parse_porcelain(&status),
    })
}

fn parse_porcelain(status: &str) -> BTreeMap<String, String> {
    status
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| {
            let (code, path) = line.split_at(2);
            let path = path.trim_start();
            // Renames are reported as "old -> new"
            let path = path.rsplit(" -> ").next().unwrap_or(path);
            (path.trim_matches('"').to_string(), code.to_string())
        })
        .collect()
}

fn kind_for(code: &str) -> ChangeKind {
    if code.contains('D') {
        ChangeKind::Delete
    } else if code == "??" || code.contains('A') {
        ChangeKind::Create
    } else {
        ChangeKind::Modify
    }
}

/// Changes between two snapshots, with diffs where git can produce them.
pub(crate) async fn diff(before: &StatusSnapshot, after: &StatusSnapshot) -> Vec<Change> {
    let mut changes = Vec::new();

    for (path, code) in &after.entries {
        if before.entries.get(path) == Some(code) {
            continue;
        }
        let kind = kind_for(code);
        let text = if code == "??" {
            new_file_diff(&after.root.join(path)).await
        } else {
            git(&after.root, &["diff", "--no-color", "--", path]).await
        };
        changes.push(with_optional_diff(Change::new(path, kind), text));
    }

    // Dirty before, clean after: the command reverted the path
    for path in before.entries.keys() {
        if !after.entries.contains_key(path) {
            changes.push(Change::new(path, ChangeKind::Modify));
        }
    }

    debug!(count = changes.len(), "Detected working tree changes");
    changes
}

fn with_optional_diff(change: Change, diff: Option<String>) -> Change {
    match diff {
        Some(diff) if !diff.is_empty() => change.with_diff(diff),
        _ => change,
    }
}

async fn new_file_diff(path: &Path) -> Option<String> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    if !meta.is_file() || meta.len() > MAX_NEW_FILE_BYTES {
        return None;
    }
    let content = tokio::fs::read_to_string(path).await.ok()?;
    Some(content.lines().map(|line| format!("+{line}\n")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_of(entries: &[(&str, &str)]) -> StatusSnapshot {
        StatusSnapshot {
            root: PathBuf::from("/nonexistent"),
            entries: entries
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_parse_porcelain() {
        let parsed =
            parse_porcelain(" M src/lib.rs\n?? notes.txt\nR  old.rs -> new.rs\n D gone.rs\n");
        assert_eq!(parsed.get("src/lib.rs").map(String::as_str), Some(" M"));
        assert_eq!(parsed.get("notes.txt").map(String::as_str), Some("??"));
        assert_eq!(parsed.get("new.rs").map(String::as_str), Some("R "));
        assert_eq!(parsed.get("gone.rs").map(String::as_str), Some(" D"));
    }

    #[test]
    fn test_kind_for() {
        assert_eq!(kind_for("??"), ChangeKind::Create);
        assert_eq!(kind_for("A "), ChangeKind::Create);
        assert_eq!(kind_for(" D"), ChangeKind::Delete);
        assert_eq!(kind_for(" M"), ChangeKind::Modify);
        assert_eq!(kind_for("R "), ChangeKind::Modify);
    }

    #[tokio::test]
    async fn test_diff_ignores_preexisting_dirt() {
        let before = snapshot_of(&[("a.rs", " M"), ("b.rs", " M")]);
        let after = snapshot_of(&[("a.rs", " M"), ("c.rs", " D")]);

        let changes = diff(&before, &after).await;
        let summary: Vec<(&str, ChangeKind)> =
            changes.iter().map(|c| (c.path.as_str(), c.kind)).collect();
        assert_eq!(
            summary,
            vec![("c.rs", ChangeKind::Delete), ("b.rs", ChangeKind::Modify)]
        );
    }
}
