//! Configuration file loader with multi-source merging

use super::file_config::FileConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

/// Project-level config file names, checked in order
const PROJECT_FILES: &[&str] = &["conductor.toml", ".conductor.toml"];

/// Prefix of environment overrides (`CONDUCTOR_ENGINE__MAX_ITERATIONS=10`)
pub const ENV_PREFIX: &str = "CONDUCTOR_";

/// One place configuration may come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub label: &'static str,
    pub path: PathBuf,
    pub found: bool,
}

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. `CONDUCTOR_*` environment variables (`__` separates sections)
    /// 2. Explicit config path (if provided)
    /// 3. Project root: `./conductor.toml` or `./.conductor.toml`
    /// 4. Global: `$XDG_CONFIG_HOME/conductor/config.toml`
    /// 5. Default values
    pub fn load(config_path: Option<&Path>) -> Result<FileConfig, Box<figment::Error>> {
        Self::figment(
            Self::global_config_path().as_deref(),
            Path::new("."),
            config_path,
        )
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(Box::new)
    }

    /// Load only default configuration (for --no-config)
    pub fn load_defaults() -> FileConfig {
        FileConfig::default()
    }

    /// File layers without the environment, rooted at `project_dir`.
    pub fn figment(
        global_path: Option<&Path>,
        project_dir: &Path,
        config_path: Option<&Path>,
    ) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        if let Some(global) = global_path
            && global.exists()
        {
            figment = figment.merge(Toml::file(global));
        }

        if let Some(project) = Self::project_config_path(project_dir) {
            figment = figment.merge(Toml::file(project));
        }

        // A missing explicit file is an error rather than silently skipped
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file_exact(path));
        }

        figment
    }

    /// Get the global config file path
    ///
    /// Returns XDG_CONFIG_HOME/conductor/config.toml if set,
    /// otherwise falls back to ~/.config/conductor/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("conductor").join("config.toml"))
    }

    /// Get the project-level config file path (if it exists)
    pub fn project_config_path(project_dir: &Path) -> Option<PathBuf> {
        PROJECT_FILES
            .iter()
            .map(|name| project_dir.join(name))
            .find(|path| path.exists())
    }

    /// Config file locations in priority order, for `conductor config`.
    pub fn sources(config_path: Option<&Path>) -> Vec<ConfigSource> {
        let mut sources = Vec::new();
        if let Some(path) = config_path {
            sources.push(ConfigSource {
                label: "Explicit",
                path: path.to_path_buf(),
                found: path.exists(),
            });
        }
        let project = Self::project_config_path(Path::new("."));
        sources.push(ConfigSource {
            label: "Project",
            found: project.is_some(),
            path: project.unwrap_or_else(|| PathBuf::from(PROJECT_FILES[0])),
        });
        if let Some(global) = Self::global_config_path() {
            sources.push(ConfigSource {
                label: "Global",
                found: global.exists(),
                path: global,
            });
        }
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_defaults() {
        let config = ConfigLoader::load_defaults();
        assert_eq!(config, FileConfig::default());
    }

    #[test]
    fn test_global_config_path_returns_some() {
        let path = ConfigLoader::global_config_path().unwrap();
        assert!(path.ends_with("conductor/config.toml"));
    }

    #[test]
    fn test_layers_merge_in_priority_order() {
        let dir = tempdir().unwrap();
        let global = dir.path().join("global.toml");
        fs::write(
            &global,
            "[engine]\nmax_iterations = 10\ndry_run = true\n\n[output]\ncolor = false\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(".conductor.toml"),
            "[engine]\nmax_iterations = 20\n",
        )
        .unwrap();
        let explicit = dir.path().join("explicit.toml");
        fs::write(&explicit, "[retry]\nmax_retries = 7\n").unwrap();

        let config: FileConfig = ConfigLoader::figment(Some(&global), dir.path(), Some(&explicit))
            .extract()
            .unwrap();

        assert_eq!(config.engine.max_iterations, 20);
        assert!(config.engine.dry_run);
        assert!(!config.output.color);
        assert_eq!(config.retry.max_retries, 7);
        assert_eq!(config.rate_limit, Default::default());
    }

    #[test]
    fn test_project_file_name_preference() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("conductor.toml"), "").unwrap();
        fs::write(dir.path().join(".conductor.toml"), "").unwrap();
        assert_eq!(
            ConfigLoader::project_config_path(dir.path()),
            Some(dir.path().join("conductor.toml"))
        );
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempdir().unwrap();
        let result: Result<FileConfig, _> = ConfigLoader::figment(
            None,
            dir.path(),
            Some(&dir.path().join("nope.toml")),
        )
        .extract();
        assert!(result.is_err());
    }

    #[test]
    fn test_type_errors_are_reported() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("conductor.toml"),
            "[engine]\nmax_iterations = \"many\"\n",
        )
        .unwrap();
        let result: Result<FileConfig, _> =
            ConfigLoader::figment(None, dir.path(), None).extract();
        assert!(result.is_err());
    }
}
