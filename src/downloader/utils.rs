// Helper functions shared by the platform client, muxer and tool manager

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use tracing::debug;

use super::errors::{DownloadError, Result};

/// Run command with timeout, collecting stdout and stderr
pub async fn run_output_with_timeout(
    program: &Path,
    args: Vec<String>,
    limit: Duration,
) -> Result<std::process::Output> {
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let mut stdout_pipe = child.stdout.take().ok_or_else(|| {
        DownloadError::ToolNotFound(format!("Failed to capture stdout from {}", program.display()))
    })?;
    let mut stderr_pipe = child.stderr.take().ok_or_else(|| {
        DownloadError::ToolNotFound(format!("Failed to capture stderr from {}", program.display()))
    })?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf).await;
        buf
    });

    match timeout(limit, child.wait()).await {
        Ok(status_res) => {
            let status = status_res.map_err(|e| {
                DownloadError::MetadataUnavailable(format!(
                    "Failed to wait for {}: {}",
                    program.display(),
                    e
                ))
            })?;
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(DownloadError::MetadataUnavailable(format!(
                "{} timed out after {}s",
                program.display(),
                limit.as_secs()
            )))
        }
    }
}

/// Map a spawn failure to `ToolNotFound` when the executable is missing
pub fn spawn_error(program: &Path, e: std::io::Error) -> DownloadError {
    if e.kind() == std::io::ErrorKind::NotFound {
        DownloadError::ToolNotFound(program.display().to_string())
    } else {
        DownloadError::ToolNotFound(format!("Failed to start {}: {}", program.display(), e))
    }
}

/// Locate an executable: explicit path, common install locations, PATH, bare name
pub fn find_binary(name: &str, configured: Option<&Path>) -> PathBuf {
    if let Some(path) = configured {
        return path.to_path_buf();
    }

    let common_dirs = ["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"];
    for dir in common_dirs {
        let candidate = Path::new(dir).join(name);
        if candidate.is_file() {
            debug!("[Tools] Found {} at {}", name, candidate.display());
            return candidate;
        }
    }

    if let Some(paths) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&paths) {
            let candidate = dir.join(name);
            if candidate.is_file() {
                debug!("[Tools] Found {} on PATH at {}", name, candidate.display());
                return candidate;
            }
            #[cfg(windows)]
            {
                let exe = dir.join(format!("{}.exe", name));
                if exe.is_file() {
                    return exe;
                }
            }
        }
    }

    // Last resort: let the OS resolve it at spawn time
    PathBuf::from(name)
}

/// Make a video title safe to use as a file name
pub fn sanitize_file_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = cleaned.trim().trim_matches('.').trim();
    if trimmed.is_empty() {
        return "video".to_string();
    }

    // Most filesystems cap names at 255 bytes; leave room for suffixes
    let mut out = String::new();
    for c in trimmed.chars() {
        if out.len() + c.len_utf8() > 200 {
            break;
        }
        out.push(c);
    }
    out
}

/// Format file size for display
pub fn format_size(bytes: Option<u64>) -> Option<String> {
    bytes.filter(|b| *b > 0).map(|b| {
        let mb = b as f64 / 1_048_576.0;
        if mb >= 1024.0 {
            format!("{:.1} GB", mb / 1024.0)
        } else {
            format!("{:.0} MB", mb)
        }
    })
}
