//! Git Tools
//!
//! Read-only git inspection exposed to the automaton as `IDLE_ONLY_TOOLS`
//! members: status and log. Mutating git operations are not exposed.

use anyhow::Context;
use anyhow::Result;

use crate::types::{GitLogEntry, GitStatus, SandboxClient};

/// Get git status for a repository.
pub async fn git_status(sandbox: &dyn SandboxClient, repo_path: &str) -> Result<GitStatus> {
    let result = sandbox
        .exec(
            &format!(
                "cd {} && git status --porcelain -b 2>/dev/null",
                escape_shell_arg(repo_path)
            ),
            Some(10_000),
        )
        .await
        .context("Failed to get git status")?;

    let lines: Vec<&str> = result
        .stdout
        .split('\n')
        .filter(|l| !l.is_empty())
        .collect();

    let mut branch = "unknown".to_string();
    let mut staged: Vec<String> = Vec::new();
    let mut modified: Vec<String> = Vec::new();
    let mut untracked: Vec<String> = Vec::new();

    for line in &lines {
        if let Some(rest) = line.strip_prefix("## ") {
            branch = rest
                .split("...")
                .next()
                .unwrap_or("unknown")
                .to_string();
            continue;
        }

        if line.len() < 3 {
            continue;
        }

        let status_code = &line[..2];
        let file = line[3..].to_string();

        let first = status_code.as_bytes().first().copied().unwrap_or(b' ');
        let second = status_code.as_bytes().get(1).copied().unwrap_or(b' ');

        if first != b' ' && first != b'?' {
            staged.push(file.clone());
        }
        if second == b'M' || second == b'D' {
            modified.push(file.clone());
        }
        if status_code == "??" {
            untracked.push(file);
        }
    }

    let clean = staged.is_empty() && modified.is_empty() && untracked.is_empty();

    Ok(GitStatus {
        branch,
        staged,
        modified,
        untracked,
        clean,
    })
}

/// Get git log.
pub async fn git_log(
    sandbox: &dyn SandboxClient,
    repo_path: &str,
    limit: u32,
) -> Result<Vec<GitLogEntry>> {
    let result = sandbox
        .exec(
            &format!(
                "cd {} && git log --format=\"%H|%s|%an|%ai\" -n {} 2>/dev/null",
                escape_shell_arg(repo_path),
                limit
            ),
            Some(10_000),
        )
        .await
        .context("Failed to get git log")?;

    let trimmed = result.stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let entries = trimmed
        .split('\n')
        .filter_map(|line| {
            let parts: Vec<&str> = line.splitn(4, '|').collect();
            if parts.len() >= 4 {
                Some(GitLogEntry {
                    hash: parts[0].to_string(),
                    message: parts[1].to_string(),
                    author: parts[2].to_string(),
                    date: parts[3].to_string(),
                })
            } else {
                None
            }
        })
        .collect();

    Ok(entries)
}

/// Escape a shell argument for safe inclusion in a command string.
pub fn escape_shell_arg(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_shell_arg_wraps_and_escapes_quotes() {
        assert_eq!(escape_shell_arg("main"), "'main'");
        assert_eq!(escape_shell_arg("it's"), "'it'\\''s'");
    }
}
