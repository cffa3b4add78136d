//! Task files: an ordered list of `[[task]]` tables in TOML, or a JSON document
//! with the same shape.
//!
//! ```toml
//! [[task]]
//! name = "hosts"
//! kind = "block_in_file"
//! path = "/etc/hosts"
//! marker = "prod storage nodes"
//! entries = [{ ip = "10.0.0.1", shortname = "cephadmin", fqdn = "cephadmin.prod" }]
//! ```

use anyhow::{Context, Result};
use converge::TaskSpec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFile {
    #[serde(default)]
    pub task: Vec<TaskSpec>,
}

impl TaskFile {
    /// Read a task file, picking the format from its extension
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read task file: {}", path.display()))?;

        let file = if is_json(path) {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse task file: {}", path.display()))?
        } else {
            Self::parse_toml(&content)
                .with_context(|| format!("Failed to parse task file: {}", path.display()))?
        };

        log::debug!("Loaded {} task(s) from {}", file.task.len(), path.display());
        Ok(file)
    }

    pub fn parse_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge::{Action, BlockContent, TaskKind, validate_all};
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[[task]]
name = "sshd config"
kind = "file_content"
path = "/etc/ssh/sshd_config"
content = "PermitRootLogin prohibit-password\n"
mode = "0644"
owner = "root"
group = "root"

[[task]]
name = "ntp"
kind = "package_installed"
package = "ntp"
update_cache = true

[[task]]
name = "hosts"
kind = "block_in_file"
path = "/etc/hosts"
marker = "prod storage nodes"
entries = [
    { ip = "10.0.0.1", shortname = "cephadmin", fqdn = "cephadmin.prod" },
    { ip = "10.0.0.1", shortname = "cephmon1", fqdn = "cephmon1.prod" },
]

[[task]]
name = "refresh"
kind = "shell_command"
argv = ["apt-get", "update"]
idempotent = false
"#;

    #[test]
    fn test_parse_toml_in_order() {
        let file = TaskFile::parse_toml(SAMPLE).unwrap();
        let kinds: Vec<_> = file.task.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TaskKind::FileContent,
                TaskKind::PackageInstalled,
                TaskKind::BlockInFile,
                TaskKind::ShellCommand,
            ]
        );
        assert!(file.task[0].idempotent);
        assert!(!file.task[3].idempotent);

        let tasks = validate_all(&file.task).unwrap();
        match &tasks[2].action {
            Action::BlockInFile(b) => match &b.content {
                BlockContent::Entries(entries) => {
                    assert_eq!(entries.len(), 2);
                    assert_eq!(entries[1].fqdn, "cephmon1.prod");
                }
                other => panic!("unexpected content: {other:?}"),
            },
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_load_json_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");
        fs::write(
            &path,
            r#"{"task": [{"name": "hostname", "kind": "hostname", "hostname": "cephadminmon"}]}"#,
        )
        .unwrap();

        let file = TaskFile::load(&path).unwrap();
        assert_eq!(file.task.len(), 1);
        assert_eq!(file.task[0].kind, TaskKind::Hostname);
    }

    #[test]
    fn test_missing_field_is_caught_at_validation() {
        let file = TaskFile::parse_toml(
            "[[task]]\nname = \"no package\"\nkind = \"package_installed\"\n",
        )
        .unwrap();
        let err = validate_all(&file.task).unwrap_err();
        assert_eq!(err.category(), converge::ErrorCategory::Configuration);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(TaskFile::parse_toml("[[task]]\nname = \"x\"\nkind = \"cron\"\n").is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(TaskFile::load(&dir.path().join("absent.toml")).is_err());
    }
}
