//! JSONL-backed memory store.
//!
//! Learnings and decisions are appended to one file as JSON lines, each
//! tagged with a `type` field:
//!
//! ```text
//! {"type":"learning","pattern":"fix bug","lesson":"All 1 tasks succeeded",...}
//! {"type":"decision","state":"idle","decision_type":"perceive",...}
//! ```
//!
//! Recall scans the file and returns the learnings whose pattern shares
//! words with the query, best matches first.

use async_trait::async_trait;
use conductor_application::ports::memory::{MemoryError, MemoryPort};
use conductor_domain::{Decision, Learning};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Default number of learnings returned by one recall
pub const DEFAULT_RECALL_LIMIT: usize = 10;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record {
    Learning(Learning),
    Decision(Decision),
}

/// Append-only memory store.
///
/// Thread-safe via `Mutex<BufWriter<File>>`; every record is flushed as
/// soon as it is written.
pub struct JsonlMemoryStore {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
    recall_limit: usize,
    record_decisions: bool,
}

impl JsonlMemoryStore {
    /// Opens (or creates) the store, creating parent directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Storage(format!("create {}: {}", parent.display(), e))
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| MemoryError::Storage(format!("open {}: {}", path.display(), e)))?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
            recall_limit: DEFAULT_RECALL_LIMIT,
            record_decisions: true,
        })
    }

    pub fn with_recall_limit(mut self, limit: usize) -> Self {
        self.recall_limit = limit;
        self
    }

    /// Skip the decision audit trail and keep learnings only.
    pub fn with_decisions(mut self, record: bool) -> Self {
        self.record_decisions = record;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &Record) -> Result<(), MemoryError> {
        let line =
            serde_json::to_string(record).map_err(|e| MemoryError::Serialization(e.to_string()))?;
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(writer, "{}", line)
            .and_then(|()| writer.flush())
            .map_err(|e| MemoryError::Storage(e.to_string()))
    }

    fn read_learnings(&self) -> Result<Vec<Learning>, MemoryError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MemoryError::Storage(e.to_string())),
        };

        let mut learnings = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| MemoryError::Storage(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(&line) {
                Ok(Record::Learning(learning)) => learnings.push(learning),
                Ok(Record::Decision(_)) => {}
                Err(e) => warn!(line = index + 1, "Skipping malformed memory record: {}", e),
            }
        }
        Ok(learnings)
    }
}

fn words(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

/// Shared-word count between a stored pattern and the query.
fn relevance(pattern: &str, query: &BTreeSet<String>) -> usize {
    words(pattern).intersection(query).count()
}

#[async_trait]
impl MemoryPort for JsonlMemoryStore {
    async fn recall(&self, pattern: &str) -> Result<Vec<Learning>, MemoryError> {
        let query = words(pattern);
        let exact = pattern.trim().to_lowercase();

        let mut scored: Vec<(usize, Learning)> = self
            .read_learnings()?
            .into_iter()
            .filter_map(|learning| {
                let score = if learning.pattern.trim().to_lowercase() == exact {
                    usize::MAX
                } else {
                    relevance(&learning.pattern, &query)
                };
                (score > 0).then_some((score, learning))
            })
            .collect();

        scored.sort_by(|(a_score, a), (b_score, b)| {
            b_score
                .cmp(a_score)
                .then(b.timestamp.cmp(&a.timestamp))
        });
        let recalled: Vec<Learning> = scored
            .into_iter()
            .take(self.recall_limit)
            .map(|(_, learning)| learning)
            .collect();

        debug!(pattern, recalled = recalled.len(), "Recalled learnings");
        Ok(recalled)
    }

    async fn store(&self, learning: &Learning) -> Result<(), MemoryError> {
        self.append(&Record::Learning(learning.clone()))
    }

    async fn record_decision(&self, decision: &Decision) -> Result<(), MemoryError> {
        if !self.record_decisions {
            return Ok(());
        }
        self.append(&Record::Decision(decision.clone()))
    }
}

impl Drop for JsonlMemoryStore {
    fn drop(&mut self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}
