// ─── Java Probe ───
// Runs `<java> -version` under a wall-clock timeout and parses the answer.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::error::{LauncherError, LauncherResult};

/// Version reported by a Java executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JavaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// Raw version string, e.g. `17.0.12` or `1.8.0_412`.
    pub raw: String,
}

/// Probe `path` for its version.
///
/// The child is killed when the timeout expires (`kill_on_drop`), so an
/// unresponsive binary costs at most `timeout`.
#[instrument(skip(timeout))]
pub async fn probe_java(path: &Path, timeout: Duration) -> LauncherResult<JavaVersion> {
    if !path.is_file() {
        return Err(LauncherError::ExecutableNotFound(path.to_path_buf()));
    }
    if !is_executable(path) {
        return Err(LauncherError::JavaExecution(format!(
            "{} is not executable",
            path.display()
        )));
    }

    let child = tokio::process::Command::new(path)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| LauncherError::JavaExecution(format!("{}: {e}", path.display())))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output.map_err(|source| LauncherError::io(path, source))?,
        Err(_) => {
            return Err(LauncherError::ProbeTimeout {
                path: path.to_path_buf(),
                timeout,
            })
        }
    };

    let text = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stderr),
        String::from_utf8_lossy(&output.stdout)
    );
    debug!("Probing {:?}: {}", path, text.lines().next().unwrap_or(""));

    if !output.status.success() {
        return Err(LauncherError::JavaExecution(format!(
            "{} exited with {}: {}",
            path.display(),
            output.status,
            text.trim()
        )));
    }

    parse_version_output(&text).ok_or_else(|| {
        LauncherError::JavaExecution(format!(
            "could not parse version output of {}: {}",
            path.display(),
            text.trim()
        ))
    })
}

/// Extract the version from `-version` output. Handles both the modern
/// `17.0.8` scheme and the legacy `1.8.0_392` scheme.
pub fn parse_version_output(output: &str) -> Option<JavaVersion> {
    output.lines().find_map(parse_version_line)
}

fn parse_version_line(line: &str) -> Option<JavaVersion> {
    let start = line.find("version")? + "version".len();
    let rest = line[start..].trim_start().trim_start_matches('"');
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '_'))
        .unwrap_or(rest.len());
    let raw = &rest[..end];
    if raw.is_empty() {
        return None;
    }

    let (dotted, update) = match raw.split_once('_') {
        Some((dotted, update)) => (dotted, update.parse::<u32>().ok()),
        None => (raw, None),
    };
    let nums: Vec<u32> = dotted
        .split('.')
        .filter_map(|part| part.parse::<u32>().ok())
        .collect();
    let first = *nums.first()?;

    let (major, minor, patch) = if first == 1 {
        // 1.8.0_392 → Java 8, update 392
        let major = nums.get(1).copied().unwrap_or(8);
        let minor = nums.get(2).copied().unwrap_or(0);
        (major, minor, update.unwrap_or(0))
    } else {
        (
            first,
            nums.get(1).copied().unwrap_or(0),
            nums.get(2).copied().unwrap_or(0),
        )
    };

    Some(JavaVersion {
        major,
        minor,
        patch,
        raw: raw.to_string(),
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
