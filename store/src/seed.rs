//! Seed dataset loading.
//!
//! The project table is populated once from a JSON array of [`Project`] records.
//! A file in the data directory wins over the copy compiled into the binary.

use std::path::Path;

use revdesk_types::Project;
use tracing::debug;

use crate::StoreError;

const BUILTIN_SEED: &str = include_str!("../data/projects_seed.json");

/// The seed compiled into the binary.
pub fn builtin_seed() -> Result<Vec<Project>, StoreError> {
    parse_seed(BUILTIN_SEED)
}

/// Read the seed at `path`, falling back to [`builtin_seed`] when the file does not exist.
pub fn load_seed(path: &Path) -> Result<Vec<Project>, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            debug!(path = %path.display(), "Loading project seed from file");
            parse_seed(&content)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => builtin_seed(),
        Err(e) => Err(StoreError::SeedRead {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn parse_seed(content: &str) -> Result<Vec<Project>, StoreError> {
    let projects: Vec<Project> = serde_json::from_str(content).map_err(StoreError::Seed)?;
    Ok(projects)
}

#[cfg(test)]
mod tests {
    use super::{builtin_seed, load_seed};

    #[test]
    fn builtin_seed_parses() {
        let projects = builtin_seed().expect("builtin seed");
        assert!(projects.len() >= 5);
        assert!(
            projects
                .iter()
                .any(|p| p.project_code.as_str() == "2024-123456")
        );
    }

    #[test]
    fn missing_file_uses_builtin() {
        let dir = tempfile::tempdir().expect("tempdir");
        let projects = load_seed(&dir.path().join("absent.json")).expect("seed");
        assert_eq!(projects, builtin_seed().expect("builtin seed"));
    }

    #[test]
    fn file_overrides_builtin() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("projects_seed.json");
        std::fs::write(
            &path,
            r#"[{"project_code":"2030-000001","project_name":"Pilot","ministry":"Energy","total_budget_try":10,"spent_try":1}]"#,
        )
        .expect("write seed");

        let projects = load_seed(&path).expect("seed");
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].project_name, "Pilot");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("projects_seed.json");
        std::fs::write(&path, "{not json").expect("write seed");
        assert!(load_seed(&path).is_err());
    }
}
