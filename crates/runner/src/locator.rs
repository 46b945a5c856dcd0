use cleats_protocol::{PROJECT_MARKER_FILE, VCS_DIRS};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Why a located root is a fallback rather than a real project root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootDiagnostic {
    UsingHintPath,
    UsingOpenFolder,
    NoFoldersOpen,
}

impl fmt::Display for RootDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RootDiagnostic::UsingHintPath => "root not found, using hint path",
            RootDiagnostic::UsingOpenFolder => "root not found, using open folder",
            RootDiagnostic::NoFoldersOpen => "no folders open, cannot proceed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Located {
    pub root: Option<PathBuf>,
    pub diagnostic: Option<RootDiagnostic>,
}

impl Located {
    fn found(root: PathBuf) -> Self {
        Self {
            root: Some(root),
            diagnostic: None,
        }
    }
}

/// Finds the directory the tool treats as a project.
///
/// At every level of the upward walk the marker file is checked before the
/// VCS directories, so a nested package with its own marker wins over the
/// enclosing checkout.
#[derive(Debug, Clone)]
pub struct ProjectLocator {
    marker_files: Vec<String>,
    vcs_dirs: Vec<String>,
}

impl Default for ProjectLocator {
    fn default() -> Self {
        Self {
            marker_files: vec![PROJECT_MARKER_FILE.to_string()],
            vcs_dirs: VCS_DIRS.iter().map(|d| d.to_string()).collect(),
        }
    }
}

impl ProjectLocator {
    pub fn new(marker_files: Vec<String>, vcs_dirs: Vec<String>) -> Self {
        Self {
            marker_files,
            vcs_dirs,
        }
    }

    pub fn locate(&self, hint: Option<&Path>, open_folders: &[PathBuf]) -> Located {
        let hint_dir = hint.map(hint_directory);

        if let Some(dir) = &hint_dir {
            if let Some(root) = self.find_root(dir) {
                return Located::found(root);
            }
        }

        let candidates: Vec<PathBuf> = if open_folders.is_empty() {
            hint_dir.iter().cloned().collect()
        } else {
            let mut sorted: Vec<PathBuf> = open_folders.iter().map(|p| absolutize(p)).collect();
            sorted.sort();
            sorted
        };
        for candidate in &candidates {
            if let Some(root) = self.find_root(candidate) {
                return Located::found(root);
            }
        }

        if let Some(dir) = hint_dir {
            log::debug!("No project root above {}; using hint", dir.display());
            return Located {
                root: Some(dir),
                diagnostic: Some(RootDiagnostic::UsingHintPath),
            };
        }
        if let Some(first) = open_folders.first() {
            return Located {
                root: Some(absolutize(first)),
                diagnostic: Some(RootDiagnostic::UsingOpenFolder),
            };
        }
        Located {
            root: None,
            diagnostic: Some(RootDiagnostic::NoFoldersOpen),
        }
    }

    /// Nearest ancestor of `start` (inclusive) that carries a marker or VCS directory.
    pub fn find_root(&self, start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .find(|candidate| self.is_root(candidate))
            .map(PathBuf::from)
    }

    fn is_root(&self, dir: &Path) -> bool {
        self.marker_files
            .iter()
            .any(|marker| dir.join(marker).is_file())
            || self.vcs_dirs.iter().any(|vcs| dir.join(vcs).exists())
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn hint_directory(hint: &Path) -> PathBuf {
    let hint = absolutize(hint);
    if hint.is_file() {
        if let Some(parent) = hint.parent() {
            return parent.to_path_buf();
        }
    }
    hint
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn marker_and_vcs_at_same_level_stop_the_walk() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("repo");
        fs::create_dir_all(repo.join(".git")).unwrap();
        fs::write(repo.join(PROJECT_MARKER_FILE), "{}").unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();

        let located = ProjectLocator::default().locate(Some(&repo), &[]);
        assert_eq!(located.root, Some(repo));
        assert_eq!(located.diagnostic, None);
    }

    #[test]
    fn file_hint_walks_from_its_parent() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(PROJECT_MARKER_FILE), "{}").unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        let file = dir.path().join("src/main.js");
        fs::write(&file, "").unwrap();

        let located = ProjectLocator::default().locate(Some(&file), &[]);
        assert_eq!(located.root.as_deref(), Some(dir.path()));
    }

    #[test]
    fn directory_named_like_marker_is_not_a_marker() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a");
        fs::create_dir_all(nested.join(PROJECT_MARKER_FILE)).unwrap();
        let locator = ProjectLocator::new(vec![PROJECT_MARKER_FILE.to_string()], Vec::new());
        assert_eq!(locator.find_root(&nested), None);
    }

    #[test]
    fn nothing_open_reports_cannot_proceed() {
        let located = ProjectLocator::default().locate(None, &[]);
        assert_eq!(located.root, None);
        assert_eq!(located.diagnostic, Some(RootDiagnostic::NoFoldersOpen));
        assert_eq!(
            RootDiagnostic::NoFoldersOpen.to_string(),
            "no folders open, cannot proceed"
        );
    }
}
