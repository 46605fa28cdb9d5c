//! `search_text(query, is_regex?, include_pattern?)` (§4.3).
//!
//! Wraps external `grep -rn` when available; falls back to an in-process
//! scan honouring the same exclusions when it is not.

use std::path::Path;
use std::process::Stdio;

use regex::{Regex, RegexBuilder};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

const MAX_MATCHES: usize = 30;
const CONTEXT_LINES: usize = 1;

const EXCLUDED_DIRS: &[&str] = &[
    ".git", "node_modules", "target", "dist", "build", ".venv", "venv", "__pycache__", ".next",
];

#[derive(Debug, Clone)]
pub struct SearchMatch {
    pub path: String,
    pub line_number: usize,
    pub context_before: Vec<String>,
    pub line: String,
    pub context_after: Vec<String>,
}

pub async fn search_text(
    workspace_root: &Path,
    query: &str,
    is_regex: bool,
    include_pattern: Option<&str>,
) -> anyhow::Result<Vec<SearchMatch>> {
    match run_grep(workspace_root, query, is_regex, include_pattern).await {
        Ok(matches) if !matches.is_empty() => Ok(matches),
        Ok(_) => Ok(Vec::new()),
        Err(_) => scan_in_process(workspace_root, query, is_regex, include_pattern).await,
    }
}

async fn run_grep(
    workspace_root: &Path,
    query: &str,
    is_regex: bool,
    include_pattern: Option<&str>,
) -> anyhow::Result<Vec<SearchMatch>> {
    let mut cmd = Command::new("grep");
    cmd.arg("-rn").arg(format!("-C{CONTEXT_LINES}"));
    if !is_regex {
        cmd.arg("-F");
    }
    for dir in EXCLUDED_DIRS {
        cmd.arg(format!("--exclude-dir={dir}"));
    }
    if let Some(pattern) = include_pattern {
        cmd.arg(format!("--include={pattern}"));
    }
    cmd.arg(query).arg(".");
    cmd.current_dir(workspace_root);
    cmd.stdout(Stdio::piped()).stderr(Stdio::null());

    let mut child = cmd.spawn()?;
    let mut stdout = child.stdout.take().ok_or_else(|| anyhow::anyhow!("no stdout"))?;
    let mut buf = String::new();
    stdout.read_to_string(&mut buf).await?;
    child.wait().await?;

    Ok(parse_grep_output(&buf).into_iter().take(MAX_MATCHES).collect())
}

fn parse_grep_output(output: &str) -> Vec<SearchMatch> {
    let mut matches = Vec::new();
    for line in output.lines() {
        if line == "--" {
            continue;
        }
        let Some((path_and_line, rest)) = line.split_once(':') else {
            continue;
        };
        let Some((path, line_num)) = path_and_line.rsplit_once(':').or(Some((path_and_line, ""))) else {
            continue;
        };
        if let Ok(line_number) = line_num.parse::<usize>() {
            matches.push(SearchMatch {
                path: path.trim_start_matches("./").to_string(),
                line_number,
                context_before: Vec::new(),
                line: rest.to_string(),
                context_after: Vec::new(),
            });
        }
    }
    matches
}

async fn scan_in_process(
    workspace_root: &Path,
    query: &str,
    is_regex: bool,
    include_pattern: Option<&str>,
) -> anyhow::Result<Vec<SearchMatch>> {
    let pattern: Regex = if is_regex {
        RegexBuilder::new(query).build()?
    } else {
        RegexBuilder::new(&regex::escape(query)).build()?
    };
    let include: Option<Regex> = include_pattern
        .map(|p| glob_to_regex(p))
        .transpose()?;

    let mut matches = Vec::new();
    for entry in walkdir::WalkDir::new(workspace_root)
        .into_iter()
        .filter_entry(|e| {
            !e.file_name()
                .to_str()
                .map(|name| EXCLUDED_DIRS.contains(&name))
                .unwrap_or(false)
        })
    {
        if matches.len() >= MAX_MATCHES {
            break;
        }
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(workspace_root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .to_string();
        if let Some(include) = &include {
            if !include.is_match(&rel) {
                continue;
            }
        }
        let Ok(contents) = fs::read_to_string(entry.path()).await else {
            continue;
        };
        let lines: Vec<&str> = contents.lines().collect();
        for (idx, line) in lines.iter().enumerate() {
            if matches.len() >= MAX_MATCHES {
                break;
            }
            if pattern.is_match(line) {
                let before_start = idx.saturating_sub(CONTEXT_LINES);
                let after_end = (idx + CONTEXT_LINES + 1).min(lines.len());
                matches.push(SearchMatch {
                    path: rel.clone(),
                    line_number: idx + 1,
                    context_before: lines[before_start..idx].iter().map(|s| s.to_string()).collect(),
                    line: line.to_string(),
                    context_after: lines[idx + 1..after_end].iter().map(|s| s.to_string()).collect(),
                });
            }
        }
    }
    Ok(matches)
}

fn glob_to_regex(pattern: &str) -> anyhow::Result<Regex> {
    let mut regex_str = String::from("(?i)");
    for ch in pattern.chars() {
        match ch {
            '*' => regex_str.push_str(".*"),
            '.' => regex_str.push_str("\\."),
            other => regex_str.push(other),
        }
    }
    regex_str.push('$');
    Ok(Regex::new(&regex_str)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;

    #[tokio::test]
    async fn in_process_scan_finds_match_with_context() {
        let dir = tempfile::tempdir().unwrap();
        stdfs::write(dir.path().join("a.py"), "one\ntarget\nthree").unwrap();
        let matches = scan_in_process(dir.path(), "target", false, None).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].context_before, vec!["one".to_string()]);
        assert_eq!(matches[0].context_after, vec!["three".to_string()]);
    }

    #[tokio::test]
    async fn in_process_scan_caps_at_30_matches() {
        let dir = tempfile::tempdir().unwrap();
        let content: String = (0..50).map(|_| "needle\n").collect();
        stdfs::write(dir.path().join("a.txt"), content).unwrap();
        let matches = scan_in_process(dir.path(), "needle", false, None).await.unwrap();
        assert_eq!(matches.len(), MAX_MATCHES);
    }

    #[tokio::test]
    async fn include_pattern_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        stdfs::write(dir.path().join("a.py"), "needle").unwrap();
        stdfs::write(dir.path().join("b.rs"), "needle").unwrap();
        let matches = scan_in_process(dir.path(), "needle", false, Some("*.py")).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].path, "a.py");
    }
}
