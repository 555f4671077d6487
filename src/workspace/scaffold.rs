use crate::utils::error::Result;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const PROJECT_DIRS: [&str; 9] = [
    "outputs",
    "data",
    "config",
    "models",
    "services",
    "strategies",
    "simulation",
    "analysis",
    "tests",
];

/// Directories that are importable packages. `outputs`, `data` and `tests`
/// are not.
pub const PACKAGE_DIRS: [&str; 6] = [
    "config",
    "models",
    "services",
    "strategies",
    "simulation",
    "analysis",
];

pub const MARKER_FILE: &str = "__init__.py";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScaffoldReport {
    pub created_dirs: Vec<String>,
    pub existing_dirs: Vec<String>,
    pub created_markers: Vec<String>,
    pub existing_markers: Vec<String>,
}

impl ScaffoldReport {
    pub fn is_noop(&self) -> bool {
        self.created_dirs.is_empty() && self.created_markers.is_empty()
    }
}

pub struct Scaffolder {
    root: PathBuf,
}

impl Scaffolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scaffold(&self) -> Result<ScaffoldReport> {
        let mut report = ScaffoldReport::default();

        for dir in PROJECT_DIRS {
            let path = self.root.join(dir);
            if path.is_dir() {
                report.existing_dirs.push(dir.to_string());
            } else {
                fs::create_dir_all(&path)?;
                report.created_dirs.push(dir.to_string());
            }
        }

        for dir in PACKAGE_DIRS {
            let marker = format!("{}/{}", dir, MARKER_FILE);
            // create_new never truncates an existing marker
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.root.join(dir).join(MARKER_FILE))
            {
                Ok(_) => report.created_markers.push(marker),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    report.existing_markers.push(marker)
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(
            "Project structure ready: {} directories created, {} markers created",
            report.created_dirs.len(),
            report.created_markers.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_all_directories_and_markers() {
        let dir = TempDir::new().unwrap();
        let report = Scaffolder::new(dir.path()).scaffold().unwrap();

        assert_eq!(report.created_dirs.len(), 9);
        assert_eq!(report.created_markers.len(), 6);
        for name in PROJECT_DIRS {
            assert!(dir.path().join(name).is_dir(), "{} missing", name);
        }
        for name in ["outputs", "data", "tests"] {
            assert!(!dir.path().join(name).join(MARKER_FILE).exists());
        }
        for name in PACKAGE_DIRS {
            let marker = dir.path().join(name).join(MARKER_FILE);
            assert_eq!(fs::metadata(marker).unwrap().len(), 0);
        }
    }

    #[test]
    fn existing_marker_is_left_alone() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("models")).unwrap();
        fs::write(dir.path().join("models").join(MARKER_FILE), "VERSION = 1\n").unwrap();

        let report = Scaffolder::new(dir.path()).scaffold().unwrap();
        assert!(report.existing_dirs.contains(&"models".to_string()));
        assert!(report
            .existing_markers
            .contains(&"models/__init__.py".to_string()));
        assert_eq!(
            fs::read_to_string(dir.path().join("models").join(MARKER_FILE)).unwrap(),
            "VERSION = 1\n"
        );
    }

    #[test]
    fn second_run_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let scaffolder = Scaffolder::new(dir.path());
        scaffolder.scaffold().unwrap();

        let again = scaffolder.scaffold().unwrap();
        assert!(again.is_noop());
        assert_eq!(again.existing_dirs.len(), 9);
        assert_eq!(again.existing_markers.len(), 6);
    }
}
