//! File-backed checkpoint store.
//!
//! One pretty-printed JSON file per checkpoint, named `<id>.json`, in a
//! single directory. Writes go to a temp file first and are renamed into
//! place, so a crash never leaves a half-written record behind.

use async_trait::async_trait;
use conductor_application::ports::checkpoint_store::{CheckpointError, CheckpointStore};
use conductor_domain::{Checkpoint, CheckpointId};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &CheckpointId) -> Result<PathBuf, CheckpointError> {
        let name = id.as_str();
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(CheckpointError::Storage(format!(
                "invalid checkpoint id '{name}'"
            )));
        }
        Ok(self.dir.join(format!("{name}.{EXTENSION}")))
    }

    async fn write_atomic(&self, path: &Path, contents: &str) -> Result<(), CheckpointError> {
        fs::create_dir_all(&self.dir).await?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, contents).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o644)).await?;
        }
        fs::rename(&tmp_path, path).await?;
        Ok(())
    }

    async fn read_path(path: &Path) -> Result<Checkpoint, CheckpointError> {
        let contents = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&contents)?)
    }
}

fn not_found_as(id: &CheckpointId, error: std::io::Error) -> CheckpointError {
    if error.kind() == ErrorKind::NotFound {
        CheckpointError::NotFound(id.clone())
    } else {
        CheckpointError::Io(error)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn write(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let path = self.path_for(&checkpoint.id)?;
        let mut json = serde_json::to_string_pretty(checkpoint)?;
        json.push('\n');
        self.write_atomic(&path, &json).await?;
        debug!(path = %path.display(), "Checkpoint written");
        Ok(())
    }

    async fn read(&self, id: &CheckpointId) -> Result<Checkpoint, CheckpointError> {
        let path = self.path_for(id)?;
        let contents = fs::read_to_string(&path)
            .await
            .map_err(|e| not_found_as(id, e))?;
        Ok(serde_json::from_str(&contents)?)
    }

    async fn list(&self) -> Result<Vec<Checkpoint>, CheckpointError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut checkpoints = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_record = path.extension().is_some_and(|ext| ext == EXTENSION)
                && path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .is_some_and(CheckpointId::is_checkpoint_name);
            if !is_record {
                continue;
            }
            match Self::read_path(&path).await {
                Ok(checkpoint) => checkpoints.push(checkpoint),
                Err(e) => warn!(path = %path.display(), "Skipping unreadable checkpoint: {}", e),
            }
        }

        checkpoints.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(checkpoints)
    }

    async fn delete(&self, id: &CheckpointId) -> Result<(), CheckpointError> {
        let path = self.path_for(id)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| not_found_as(id, e))?;
        debug!(path = %path.display(), "Checkpoint deleted");
        Ok(())
    }
}
