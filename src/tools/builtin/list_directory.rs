//! `list_directory(path?)` (§4.3): directories first, then files, with
//! size/subcount, excluding noise directories.

use std::path::Path;

use tokio::fs;

use crate::tools::path_safety::{resolve_within_workspace, PathSafetyError};

const NOISE_DIRS: &[&str] = &[
    ".git", "node_modules", "target", "dist", "build", ".venv", "venv", "__pycache__", ".next",
];

#[derive(Debug, Clone)]
pub enum DirectoryEntryKind {
    Directory { sub_count: usize },
    File { size_bytes: u64 },
}

#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub name: String,
    pub kind: DirectoryEntryKind,
}

pub async fn list_directory(
    workspace_root: &Path,
    path: Option<&str>,
) -> Result<Vec<DirectoryEntry>, PathSafetyError> {
    let resolved = resolve_within_workspace(workspace_root, path.unwrap_or("."))?;

    let mut dir_entries = Vec::new();
    let mut file_entries = Vec::new();

    let mut read_dir = fs::read_dir(&resolved).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if NOISE_DIRS.contains(&name.as_str()) {
            continue;
        }
        let metadata = entry.metadata().await?;
        if metadata.is_dir() {
            let sub_count = count_children(&entry.path()).await.unwrap_or(0);
            dir_entries.push(DirectoryEntry {
                name,
                kind: DirectoryEntryKind::Directory { sub_count },
            });
        } else {
            file_entries.push(DirectoryEntry {
                name,
                kind: DirectoryEntryKind::File {
                    size_bytes: metadata.len(),
                },
            });
        }
    }

    dir_entries.sort_by(|a, b| a.name.cmp(&b.name));
    file_entries.sort_by(|a, b| a.name.cmp(&b.name));
    dir_entries.extend(file_entries);
    Ok(dir_entries)
}

async fn count_children(dir: &Path) -> std::io::Result<usize> {
    let mut read_dir = fs::read_dir(dir).await?;
    let mut count = 0;
    while read_dir.next_entry().await?.is_some() {
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;

    #[tokio::test]
    async fn directories_listed_before_files() {
        let dir = tempfile::tempdir().unwrap();
        stdfs::write(dir.path().join("z.txt"), "x").unwrap();
        stdfs::create_dir(dir.path().join("a_dir")).unwrap();

        let entries = list_directory(dir.path(), None).await.unwrap();
        assert_eq!(entries[0].name, "a_dir");
        assert!(matches!(entries[0].kind, DirectoryEntryKind::Directory { .. }));
        assert_eq!(entries[1].name, "z.txt");
    }

    #[tokio::test]
    async fn excludes_noise_directories() {
        let dir = tempfile::tempdir().unwrap();
        stdfs::create_dir(dir.path().join("node_modules")).unwrap();
        stdfs::create_dir(dir.path().join("src")).unwrap();

        let entries = list_directory(dir.path(), None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "src");
    }
}
