//! Path safety: every built-in tool resolves paths through here before
//! touching the filesystem (§4.3).

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathSafetyError {
    #[error("path does not exist: {0}")]
    NotFound(PathBuf),
    #[error("path escapes workspace root: {0}")]
    OutsideWorkspace(PathBuf),
    #[error("io error resolving path: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve `candidate` (relative or absolute) against `workspace_root` and
/// reject anything that canonicalizes outside the workspace root.
pub fn resolve_within_workspace(
    workspace_root: &Path,
    candidate: &str,
) -> Result<PathBuf, PathSafetyError> {
    let joined = if Path::new(candidate).is_absolute() {
        PathBuf::from(candidate)
    } else {
        workspace_root.join(candidate)
    };

    let canonical_root = workspace_root
        .canonicalize()
        .map_err(|_| PathSafetyError::NotFound(workspace_root.to_path_buf()))?;
    let canonical = joined
        .canonicalize()
        .map_err(|_| PathSafetyError::NotFound(joined.clone()))?;

    if !canonical.starts_with(&canonical_root) {
        return Err(PathSafetyError::OutsideWorkspace(canonical));
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn rejects_path_outside_workspace() {
        let workspace = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let file = outside.path().join("secret.txt");
        fs::write(&file, "x").unwrap();

        let result = resolve_within_workspace(workspace.path(), file.to_str().unwrap());
        assert!(matches!(result, Err(PathSafetyError::OutsideWorkspace(_))));
    }

    #[test]
    fn accepts_relative_path_inside_workspace() {
        let workspace = tempfile::tempdir().unwrap();
        fs::write(workspace.path().join("a.txt"), "x").unwrap();

        let result = resolve_within_workspace(workspace.path(), "a.txt");
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_traversal_outside_workspace() {
        let workspace = tempfile::tempdir().unwrap();
        let sub = workspace.path().join("sub");
        fs::create_dir(&sub).unwrap();

        let result = resolve_within_workspace(&sub, "../../etc/passwd");
        assert!(result.is_err());
    }
}
