//! `get_file_tree(path?, max_depth?)` (§4.3): depth-capped tree rendering
//! using `├──`/`└──` with prefix continuation.

use std::path::Path;

use crate::tools::path_safety::{resolve_within_workspace, PathSafetyError};

const MAX_DEPTH: usize = 4;
const NOISE_DIRS: &[&str] = &[
    ".git", "node_modules", "target", "dist", "build", ".venv", "venv", "__pycache__", ".next",
];

pub async fn get_file_tree(
    workspace_root: &Path,
    path: Option<&str>,
    max_depth: Option<usize>,
) -> Result<String, PathSafetyError> {
    let resolved = resolve_within_workspace(workspace_root, path.unwrap_or("."))?;
    let depth = max_depth.unwrap_or(MAX_DEPTH).min(MAX_DEPTH);

    let root_name = resolved
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| ".".to_string());
    let mut out = format!("{root_name}/\n");
    render(&resolved, "", depth, &mut out).await?;
    Ok(out)
}

fn render<'a>(
    dir: &'a Path,
    prefix: &'a str,
    remaining_depth: usize,
    out: &'a mut String,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), PathSafetyError>> + 'a>> {
    Box::pin(async move {
        if remaining_depth == 0 {
            return Ok(());
        }
        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if NOISE_DIRS.contains(&name.as_str()) {
                continue;
            }
            entries.push(entry);
        }
        entries.sort_by_key(|e| e.file_name());

        let count = entries.len();
        for (idx, entry) in entries.iter().enumerate() {
            let is_last = idx + 1 == count;
            let connector = if is_last { "└── " } else { "├── " };
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            let label = if is_dir { format!("{name}/") } else { name };
            out.push_str(&format!("{prefix}{connector}{label}\n"));

            if is_dir {
                let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
                render(&entry.path(), &child_prefix, remaining_depth - 1, out).await?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;

    #[tokio::test]
    async fn renders_nested_tree_with_connectors() {
        let dir = tempfile::tempdir().unwrap();
        stdfs::create_dir(dir.path().join("src")).unwrap();
        stdfs::write(dir.path().join("src/main.rs"), "").unwrap();
        stdfs::write(dir.path().join("Cargo.toml"), "").unwrap();

        let tree = get_file_tree(dir.path(), None, None).await.unwrap();
        assert!(tree.contains("├── Cargo.toml") || tree.contains("└── Cargo.toml"));
        assert!(tree.contains("src/"));
        assert!(tree.contains("main.rs"));
    }

    #[tokio::test]
    async fn respects_max_depth() {
        let dir = tempfile::tempdir().unwrap();
        stdfs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        stdfs::write(dir.path().join("a/b/c/deep.txt"), "").unwrap();

        let tree = get_file_tree(dir.path(), None, Some(1)).await.unwrap();
        assert!(tree.contains("a/"));
        assert!(!tree.contains("deep.txt"));
    }
}
