//! The `init` operation: a fresh project skeleton.

use crate::{Result, TvalError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default `config.yaml` of a new project. Paths are relative to it.
pub const CONFIG_TEMPLATE: &str = "\
schema_dir: ./schema
# relations_path: ./relations.yaml
output_path: ./output/report.json
# fallback_encoding: auto  # or a label such as shift_jis
relation_skip_policy: any_table_failure
verify_keys_after_load: true
";

/// Lines appended to `.gitignore`.
pub const GITIGNORE_ENTRIES: [&str; 3] = ["# tval", "tval/data/", "tval/output/"];

const SUBDIRS: [&str; 3] = ["schema", "data", "output"];

/// What [`init`] created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldSummary {
    pub root: PathBuf,
    pub config_path: PathBuf,
    /// Entries newly written to `.gitignore`
    pub gitignore_added: Vec<String>,
}

/// Creates `target` with `schema/`, `data/` and `output/` plus a default
/// config, then updates the `.gitignore` in `workdir`.
///
/// Refuses to touch an existing `target`.
pub fn init(target: &Path, workdir: &Path) -> Result<ScaffoldSummary> {
    if target.exists() {
        return Err(TvalError::Configuration(format!(
            "{} already exists. Will not overwrite.",
            target.display()
        )));
    }

    std::fs::create_dir_all(target)?;
    for dir in SUBDIRS {
        let sub = target.join(dir);
        std::fs::create_dir(&sub)?;
        std::fs::File::create(sub.join(".gitkeep"))?;
    }
    let config_path = target.join("config.yaml");
    std::fs::write(&config_path, CONFIG_TEMPLATE)?;
    info!(path = %target.display(), "Project skeleton created");

    let gitignore_added = append_gitignore(&workdir.join(".gitignore"))?;
    Ok(ScaffoldSummary {
        root: target.to_path_buf(),
        config_path,
        gitignore_added,
    })
}

/// Appends the entries missing from `path`, creating it if needed.
fn append_gitignore(path: &Path) -> Result<Vec<String>> {
    let existing = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    let present: Vec<&str> = existing.lines().map(str::trim_end).collect();
    let missing: Vec<String> = GITIGNORE_ENTRIES
        .iter()
        .filter(|entry| !present.contains(entry))
        .map(|entry| entry.to_string())
        .collect();

    if !missing.is_empty() {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        write!(file, "\n{}\n", missing.join("\n"))?;
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;

    #[test]
    fn test_init_creates_layout() {
        let work = tempfile::tempdir().unwrap();
        let target = work.path().join("tval");
        let summary = init(&target, work.path()).unwrap();

        for dir in SUBDIRS {
            assert!(target.join(dir).join(".gitkeep").is_file());
        }
        let config = ProjectConfig::from_file(&summary.config_path).unwrap();
        assert!(config.schema_dir.ends_with("schema"));
        assert_eq!(summary.gitignore_added.len(), 3);

        let gitignore = std::fs::read_to_string(work.path().join(".gitignore")).unwrap();
        assert!(gitignore.contains("tval/data/"));
    }

    #[test]
    fn test_existing_target_is_refused() {
        let work = tempfile::tempdir().unwrap();
        let err = init(work.path(), work.path()).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_gitignore_entries_not_duplicated() {
        let work = tempfile::tempdir().unwrap();
        std::fs::write(work.path().join(".gitignore"), "target/\ntval/data/\n").unwrap();

        let summary = init(&work.path().join("one"), work.path()).unwrap();
        assert_eq!(summary.gitignore_added, vec!["# tval", "tval/output/"]);

        let summary = init(&work.path().join("two"), work.path()).unwrap();
        assert!(summary.gitignore_added.is_empty());

        let gitignore = std::fs::read_to_string(work.path().join(".gitignore")).unwrap();
        assert_eq!(gitignore.matches("tval/data/").count(), 1);
        assert!(gitignore.starts_with("target/\n"));
    }
}
