//! Project configuration (`config.yaml`).
//!
//! ```yaml
//! schema_dir: ./schema
//! relations_path: ./relations.yaml
//! output_path: ./output/report.json
//! fallback_encoding: shift_jis
//! relation_skip_policy: any_table_failure
//! max_concurrency: 4
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use crate::relations::RelationSkipPolicy;
use crate::sources::EncodingFallback;
use crate::{Result, TvalError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Locations tried, in order, when no config path is given.
pub const CONFIG_CANDIDATES: [&str; 2] = ["./tval/config.yaml", "./config.yaml"];

fn default_output_path() -> PathBuf {
    PathBuf::from("output/report.json")
}

fn default_true() -> bool {
    true
}

/// Settings for one validation project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Directory with one YAML file per table
    pub schema_dir: PathBuf,
    #[serde(default)]
    pub relations_path: Option<PathBuf>,
    /// JSON report file
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
    /// Parquet export root; defaults to `parquet/` next to the report
    #[serde(default)]
    pub export_dir: Option<PathBuf>,
    /// Decoding for CSV files that are not UTF-8: a WHATWG label, or
    /// `auto` to guess from the file contents
    #[serde(default)]
    pub fallback_encoding: Option<String>,
    #[serde(default)]
    pub relation_skip_policy: RelationSkipPolicy,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default = "default_true")]
    pub verify_keys_after_load: bool,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl ProjectConfig {
    /// Minimal configuration rooted at `project_root`.
    pub fn new(project_root: impl Into<PathBuf>, schema_dir: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let mut config = Self {
            schema_dir: schema_dir.into(),
            relations_path: None,
            output_path: default_output_path(),
            export_dir: None,
            fallback_encoding: None,
            relation_skip_policy: RelationSkipPolicy::default(),
            max_concurrency: None,
            verify_keys_after_load: true,
            project_root: project_root.clone(),
        };
        config.resolve_paths(&project_root);
        config
    }

    /// Reads, resolves and validates a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            TvalError::Configuration(format!("Cannot read config '{}': {e}", path.display()))
        })?;
        let mut config: ProjectConfig =
            serde_yaml::from_str(&text).map_err(|source| TvalError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;

        let root = path
            .canonicalize()?
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                TvalError::Configuration(format!(
                    "Config '{}' has no parent directory",
                    path.display()
                ))
            })?;
        config.resolve_paths(&root);
        config.project_root = root;
        config.validate()?;
        debug!(config = ?config, "Configuration loaded");
        Ok(config)
    }

    fn resolve_paths(&mut self, root: &Path) {
        let resolve = |p: &Path| if p.is_absolute() { p.to_path_buf() } else { root.join(p) };
        self.schema_dir = resolve(&self.schema_dir);
        self.output_path = resolve(&self.output_path);
        self.relations_path = self.relations_path.as_deref().map(resolve);
        self.export_dir = self.export_dir.as_deref().map(resolve);
    }

    /// Checks values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        self.fallback_encoding()?;
        if self.max_concurrency == Some(0) {
            return Err(TvalError::Configuration(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.output_path.file_name().is_none() {
            return Err(TvalError::Configuration(format!(
                "output_path '{}' does not name a file",
                self.output_path.display()
            )));
        }
        Ok(())
    }

    /// The configured fallback decoding, or an error for an unknown label.
    pub fn fallback_encoding(&self) -> Result<EncodingFallback> {
        match &self.fallback_encoding {
            None => Ok(EncodingFallback::Disabled),
            Some(label) => EncodingFallback::from_label(label).ok_or_else(|| {
                TvalError::Configuration(format!("Unknown fallback_encoding '{label}'"))
            }),
        }
    }

    pub fn export_dir(&self) -> PathBuf {
        self.export_dir.clone().unwrap_or_else(|| {
            self.output_path
                .parent()
                .unwrap_or(&self.project_root)
                .join("parquet")
        })
    }

    /// Concurrency for checks; defaults to the available parallelism.
    pub fn concurrency(&self) -> usize {
        self.max_concurrency.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Picks the config file: the explicit path, else the first existing
/// candidate under `cwd`.
pub fn discover_config(explicit: Option<&Path>, cwd: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    CONFIG_CANDIDATES
        .iter()
        .map(|candidate| cwd.join(candidate))
        .find(|path| path.is_file())
        .ok_or_else(|| {
            TvalError::Configuration(
                "config.yaml not found. Specify with --config or create ./tval/config.yaml."
                    .to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults_and_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "config.yaml", "schema_dir: ./schema\n");
        let config = ProjectConfig::from_file(&path).unwrap();
        let root = dir.path().canonicalize().unwrap();

        assert_eq!(config.project_root, root);
        assert_eq!(config.schema_dir, root.join("./schema"));
        assert_eq!(config.output_path, root.join("output/report.json"));
        assert_eq!(config.export_dir(), root.join("output").join("parquet"));
        assert_eq!(config.relation_skip_policy, RelationSkipPolicy::AnyTableFailure);
        assert!(config.verify_keys_after_load);
        assert!(config.relations_path.is_none());
        assert!(config.concurrency() >= 1);
    }

    #[test]
    fn test_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "config.yaml",
            "schema_dir: schema\n\
             relations_path: relations.yaml\n\
             output_path: out/r.json\n\
             export_dir: /tmp/exported\n\
             fallback_encoding: shift_jis\n\
             relation_skip_policy: load_failure_only\n\
             max_concurrency: 3\n\
             verify_keys_after_load: false\n\
             database_path: ./tval/work.duckdb\n",
        );
        let config = ProjectConfig::from_file(&path).unwrap();
        assert_eq!(config.relation_skip_policy, RelationSkipPolicy::LoadFailureOnly);
        assert_eq!(config.concurrency(), 3);
        assert_eq!(config.export_dir(), PathBuf::from("/tmp/exported"));
        assert!(config.relations_path.as_deref().unwrap().ends_with("relations.yaml"));
        assert_eq!(
            config.fallback_encoding().unwrap(),
            EncodingFallback::Fixed(encoding_rs::SHIFT_JIS)
        );
        assert!(!config.verify_keys_after_load);
    }

    #[test]
    fn test_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let bad_encoding = write(dir.path(), "a.yaml", "schema_dir: s\nfallback_encoding: klingon\n");
        assert!(matches!(
            ProjectConfig::from_file(&bad_encoding),
            Err(TvalError::Configuration(msg)) if msg.contains("klingon")
        ));

        let zero = write(dir.path(), "b.yaml", "schema_dir: s\nmax_concurrency: 0\n");
        assert!(ProjectConfig::from_file(&zero).is_err());

        let missing = write(dir.path(), "c.yaml", "relations_path: r.yaml\n");
        assert!(matches!(
            ProjectConfig::from_file(&missing),
            Err(TvalError::Yaml { .. })
        ));
    }

    #[test]
    fn test_discovery_order() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_config(None, dir.path()).is_err());

        write(dir.path(), "config.yaml", "schema_dir: s\n");
        assert_eq!(
            discover_config(None, dir.path()).unwrap(),
            dir.path().join("./config.yaml")
        );

        std::fs::create_dir(dir.path().join("tval")).unwrap();
        write(&dir.path().join("tval"), "config.yaml", "schema_dir: s\n");
        assert_eq!(
            discover_config(None, dir.path()).unwrap(),
            dir.path().join("./tval/config.yaml")
        );

        let explicit = Path::new("elsewhere.yaml");
        assert_eq!(discover_config(Some(explicit), dir.path()).unwrap(), explicit);
    }
}
