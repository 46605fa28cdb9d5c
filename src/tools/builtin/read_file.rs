//! `read_file(path, start_line?, end_line?)` (§4.3).

use std::path::Path;

use thiserror::Error;
use tokio::fs;

use crate::tools::builtin::sensitive_paths::is_sensitive;
use crate::tools::path_safety::{resolve_within_workspace, PathSafetyError};

const MAX_FILE_BYTES: u64 = 1024 * 1024;
const MAX_LINES: usize = 200;

#[derive(Debug, Error)]
pub enum ReadFileError {
    #[error("path safety violation: {0}")]
    PathSafety(#[from] PathSafetyError),
    #[error("refusing to read sensitive path: {0}")]
    Sensitive(String),
    #[error("file too large ({0} bytes, limit {MAX_FILE_BYTES})")]
    TooLarge(u64),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn read_file(
    workspace_root: &Path,
    path: &str,
    start_line: Option<usize>,
    end_line: Option<usize>,
) -> Result<String, ReadFileError> {
    if is_sensitive(path) {
        return Err(ReadFileError::Sensitive(path.to_string()));
    }
    let resolved = resolve_within_workspace(workspace_root, path)?;

    let metadata = fs::metadata(&resolved).await?;
    if metadata.len() > MAX_FILE_BYTES {
        return Err(ReadFileError::TooLarge(metadata.len()));
    }

    let contents = fs::read_to_string(&resolved).await?;
    let lines: Vec<&str> = contents.lines().collect();
    let total = lines.len();

    let start = start_line.unwrap_or(1).max(1);
    let end_requested = end_line.unwrap_or(total.max(1));
    let end_capped = end_requested.min(start + MAX_LINES - 1).min(total.max(start));

    let slice_start = start.saturating_sub(1).min(lines.len());
    let slice_end = end_capped.min(lines.len());
    let body = if slice_start < slice_end {
        lines[slice_start..slice_end].join("\n")
    } else {
        String::new()
    };

    let header = format!("{path} (lines {start}-{} of {total})", slice_end.max(start));
    Ok(format!("{header}\n```\n{body}\n```"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;

    #[tokio::test]
    async fn reads_full_small_file() {
        let dir = tempfile::tempdir().unwrap();
        stdfs::write(dir.path().join("a.txt"), "one\ntwo\nthree").unwrap();
        let out = read_file(dir.path(), "a.txt", None, None).await.unwrap();
        assert!(out.contains("a.txt (lines 1-3 of 3)"));
        assert!(out.contains("two"));
    }

    #[tokio::test]
    async fn caps_at_200_lines() {
        let dir = tempfile::tempdir().unwrap();
        let content: String = (1..=500).map(|n| format!("line{n}\n")).collect();
        stdfs::write(dir.path().join("big.txt"), content).unwrap();
        let out = read_file(dir.path(), "big.txt", Some(1), Some(500)).await.unwrap();
        assert!(out.contains("lines 1-200 of 500"));
    }

    #[tokio::test]
    async fn rejects_sensitive_file() {
        let dir = tempfile::tempdir().unwrap();
        stdfs::write(dir.path().join(".env"), "SECRET=1").unwrap();
        let result = read_file(dir.path(), ".env", None, None).await;
        assert!(matches!(result, Err(ReadFileError::Sensitive(_))));
    }

    #[tokio::test]
    async fn rejects_file_over_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let huge = vec![b'x'; (MAX_FILE_BYTES + 1) as usize];
        stdfs::write(dir.path().join("huge.bin"), huge).unwrap();
        let result = read_file(dir.path(), "huge.bin", None, None).await;
        assert!(matches!(result, Err(ReadFileError::TooLarge(_))));
    }
}
