//! `run_command(command)` (§4.3): two-layer gate — read-only commands run
//! directly, everything else requires `execute_command` permission plus an
//! approval callback.

use std::process::Stdio;

use tokio::process::Command as TokioCommand;

const SHELL_WRITER_TOKENS: &[&str] = &[">", ">>", "&&", ";", "|tee", "`", "$("];

const LETHAL_PATTERNS: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    ":(){ :|:& };:",
    "mkfs",
    "dd if=/dev/zero",
    "> /dev/sda",
    "chmod -R 777 /",
];

/// Commands allowed to run without approval. `None` sub-commands means any
/// sub-command is allowed; `Some(set)` restricts to that set (e.g. `git` is
/// only safe for read-only sub-commands).
const READ_ONLY_ALLOW_LIST: &[(&str, Option<&[&str]>)] = &[
    ("ls", None),
    ("cat", None),
    ("head", None),
    ("tail", None),
    ("wc", None),
    ("find", None),
    ("grep", None),
    ("echo", None),
    ("pwd", None),
    ("git", Some(&["status", "log", "diff", "show", "branch", "remote", "blame"])),
    ("cargo", Some(&["check", "test", "build", "fmt", "clippy", "--version"])),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandClass {
    ReadOnly,
    RequiresApproval,
}

/// Classify a shell command line per §4.3's two-layer gate.
pub fn classify_command(command: &str) -> CommandClass {
    if contains_shell_writer(command) || contains_lethal_pattern(command) {
        return CommandClass::RequiresApproval;
    }
    if all_piped_segments_allowed(command) {
        CommandClass::ReadOnly
    } else {
        CommandClass::RequiresApproval
    }
}

fn contains_shell_writer(command: &str) -> bool {
    SHELL_WRITER_TOKENS.iter().any(|token| command.contains(token))
}

fn contains_lethal_pattern(command: &str) -> bool {
    let lower = command.to_ascii_lowercase();
    LETHAL_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_ascii_lowercase()))
}

fn all_piped_segments_allowed(command: &str) -> bool {
    command.split('|').all(|segment| segment_is_allowed(segment.trim()))
}

fn segment_is_allowed(segment: &str) -> bool {
    let mut parts = segment.split_whitespace();
    let Some(binary) = parts.next() else {
        return false;
    };
    let Some((_, allowed_subcommands)) = READ_ONLY_ALLOW_LIST
        .iter()
        .find(|(name, _)| *name == binary)
    else {
        return false;
    };
    match allowed_subcommands {
        None => true,
        Some(subcommands) => parts
            .next()
            .map(|sub| subcommands.contains(&sub))
            .unwrap_or(false),
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Execute a command already classified as allowed, under the given
/// working directory.
pub async fn execute_command(
    workspace_root: &std::path::Path,
    command: &str,
) -> anyhow::Result<CommandOutput> {
    let output = TokioCommand::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(workspace_root)
        .stdin(Stdio::null())
        .output()
        .await?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code(),
    })
}
