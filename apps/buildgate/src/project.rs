//! Project discovery.
//!
//! Walks upward from a start directory to the first directory holding a
//! `*.uproject` descriptor, so the tool works wherever it is vendored inside
//! a host project.

use crate::error::{GateError, Result};
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// File extension identifying a project descriptor.
pub const DESCRIPTOR_EXT: &str = "uproject";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// A resolved project: its root directory, name, and descriptor file.
pub struct ProjectDescriptor {
    pub root_dir: PathBuf,
    pub project_name: String,
    pub descriptor_path: PathBuf,
}

/// Walk upward from `start` to the closest directory containing a descriptor.
///
/// When a directory holds several descriptors the first in lexical order wins.
pub fn locate(start: &Path) -> Result<ProjectDescriptor> {
    if !start.is_dir() {
        return Err(GateError::Configuration(format!(
            "start directory does not exist: {}",
            start.display()
        )));
    }
    let abs = normalize(&std::path::absolute(start).map_err(|e| GateError::io(start, e))?);
    let mut cur = abs.as_path();
    loop {
        if let Some(descriptor_path) = descriptor_in(cur)? {
            let project_name = descriptor_path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            tracing::debug!(root = %cur.display(), project = %project_name, "located project");
            return Ok(ProjectDescriptor {
                root_dir: cur.to_path_buf(),
                project_name,
                descriptor_path,
            });
        }
        match cur.parent() {
            Some(p) => cur = p,
            None => {
                return Err(GateError::NotFound {
                    start: start.to_path_buf(),
                })
            }
        }
    }
}

/// Fold `.` and `..` out of an absolute path so `parent()` walks real ancestors.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn descriptor_in(dir: &Path) -> Result<Option<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        // Unreadable ancestors are skipped rather than aborting the walk
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => return Ok(None),
        Err(e) => return Err(GateError::io(dir, e)),
    };
    let mut found: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_descriptor(p))
        .collect();
    found.sort();
    if found.len() > 1 {
        tracing::warn!(
            dir = %dir.display(),
            count = found.len(),
            "multiple project descriptors; using the first in lexical order"
        );
    }
    Ok(found.into_iter().next())
}

fn is_descriptor(p: &Path) -> bool {
    p.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(DESCRIPTOR_EXT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_locate_from_three_levels_below() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("Shooter.uproject"), "{}").unwrap();
        let deep = root.join("Build/Scripts/ci");
        fs::create_dir_all(&deep).unwrap();

        let pd = locate(&deep).unwrap();
        assert_eq!(pd.root_dir, root);
        assert_eq!(pd.project_name, "Shooter");
        assert_eq!(pd.descriptor_path, root.join("Shooter.uproject"));
    }

    #[test]
    fn test_locate_at_root_itself_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("Game.uproject"), "{}").unwrap();
        let first = locate(root).unwrap();
        let second = locate(root).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.project_name, "Game");
    }

    #[test]
    fn test_multiple_descriptors_pick_first_lexically() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("Zeta.uproject"), "{}").unwrap();
        fs::write(root.join("Alpha.uproject"), "{}").unwrap();
        let pd = locate(root).unwrap();
        assert_eq!(pd.project_name, "Alpha");
    }

    #[test]
    fn test_directory_with_descriptor_extension_is_ignored() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("Real.uproject"), "{}").unwrap();
        let inner = root.join("nested");
        fs::create_dir_all(inner.join("Fake.uproject")).unwrap();
        let pd = locate(&inner).unwrap();
        assert_eq!(pd.project_name, "Real");
    }

    #[test]
    fn test_no_descriptor_anywhere_is_not_found() {
        let dir = tempdir().unwrap();
        let leaf = dir.path().join("a/b");
        fs::create_dir_all(&leaf).unwrap();
        let err = locate(&leaf).unwrap_err();
        assert!(matches!(err, GateError::NotFound { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_missing_start_dir_is_configuration_error() {
        let dir = tempdir().unwrap();
        let err = locate(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, GateError::Configuration(_)));
    }

    #[test]
    fn test_relative_start_walks_to_real_parents() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("Racer.uproject"), "{}").unwrap();
        let leaf = root.join("a/b");
        fs::create_dir_all(&leaf).unwrap();
        let cwd = std::env::current_dir().unwrap();
        let rel = pathdiff::diff_paths(&leaf, &cwd).unwrap();
        assert!(rel.is_relative());

        let pd = locate(&rel).unwrap();
        assert_eq!(pd.project_name, "Racer");
        assert!(pd.root_dir.is_absolute());
        assert!(pd.root_dir.components().all(|c| c != Component::ParentDir));
        assert_eq!(pd.root_dir.canonicalize().unwrap(), root.canonicalize().unwrap());
    }
}
