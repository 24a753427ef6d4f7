//! Persistence configuration from TOML (`[checkpoint]` and `[memory]`)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const APP_DIR: &str = "conductor";

/// `$XDG_DATA_HOME/conductor` (or the platform equivalent), falling back
/// to `./.conductor` when no data directory is known.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".conductor"))
}

/// Raw checkpoint configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCheckpointConfig {
    pub enabled: bool,
    /// Directory holding `<id>.json` files; defaults under the data dir
    pub dir: Option<String>,
    /// Save every N loop iterations (0 disables)
    pub every: usize,
    /// Background auto-save interval in seconds
    pub auto_save_secs: Option<u64>,
}

impl Default for FileCheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            every: 1,
            auto_save_secs: None,
        }
    }
}

impl FileCheckpointConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir().join("checkpoints"))
    }

    pub fn auto_save_interval(&self) -> Option<Duration> {
        self.auto_save_secs.map(Duration::from_secs)
    }
}

/// Raw memory configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileMemoryConfig {
    pub enabled: bool,
    /// JSONL file; defaults under the data dir
    pub path: Option<String>,
    pub recall_limit: usize,
    /// Also append every decision to the file
    pub record_decisions: bool,
}

impl Default for FileMemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            recall_limit: crate::memory::DEFAULT_RECALL_LIMIT,
            record_decisions: true,
        }
    }
}

impl FileMemoryConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir().join("memory.jsonl"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_locations() {
        let checkpoint = FileCheckpointConfig::default();
        assert!(checkpoint.resolved_dir().ends_with("conductor/checkpoints"));
        assert!(checkpoint.auto_save_interval().is_none());

        let memory = FileMemoryConfig::default();
        assert!(memory.resolved_path().ends_with("conductor/memory.jsonl"));
    }

    #[test]
    fn test_explicit_locations() {
        let toml_str = r#"
[checkpoint]
dir = "/var/lib/conductor/cp"
auto_save_secs = 15

[memory]
enabled = false
path = "mem.jsonl"
"#;
        let config: super::super::FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.checkpoint.resolved_dir(),
            PathBuf::from("/var/lib/conductor/cp")
        );
        assert_eq!(
            config.checkpoint.auto_save_interval(),
            Some(Duration::from_secs(15))
        );
        assert!(!config.memory.enabled);
        assert_eq!(config.memory.resolved_path(), PathBuf::from("mem.jsonl"));
    }
}
