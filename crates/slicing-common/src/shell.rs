//! Shell command execution utilities.
//!
//! Installer backends and scenario provisioning shell out to the Open vSwitch
//! tools. Arguments that come from configuration (bridge names, addresses,
//! script paths) always go through [`shellquote`].
//!
//! # Example
//!
//! ```ignore
//! use slicing_common::shell::{self, OVS_OFCTL_CMD, shellquote};
//!
//! let cmd = format!("{} del-flows {}", OVS_OFCTL_CMD, shellquote("s1"));
//! let result = shell::exec(&cmd).await?;
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{SliceError, SliceResult};

/// Path to `ovs-ofctl` for flow table management.
pub const OVS_OFCTL_CMD: &str = "/usr/bin/ovs-ofctl";

/// Path to `ovs-vsctl` for port and QoS configuration.
pub const OVS_VSCTL_CMD: &str = "/usr/bin/ovs-vsctl";

/// Path to the `bash` shell for scenario scripts.
pub const BASH_CMD: &str = "/bin/bash";

/// Path to `sudo`, prefixed when the daemon runs unprivileged.
pub const SUDO_CMD: &str = "/usr/bin/sudo";

/// Regex for characters that need escaping in shell double-quotes.
/// Matches: $, `, ", \, and newline
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// Wraps the string in double quotes and escapes `$`, `` ` ``, `"`, `\`
/// and newline.
///
/// # Example
///
/// ```
/// use slicing_common::shell::shellquote;
///
/// assert_eq!(shellquote("s1"), "\"s1\"");
/// assert_eq!(shellquote("with$var"), "\"with\\$var\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Result of a shell command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success).
    pub exit_code: i32,
    /// The stdout output.
    pub stdout: String,
    /// The stderr output.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr) for error messages.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Executes a shell command asynchronously through `/bin/sh -c`.
///
/// Returns `Err` only if the command could not be spawned; a non-zero exit
/// is reported in the [`ExecResult`].
pub async fn exec(cmd: &str) -> SliceResult<ExecResult> {
    tracing::debug!(command = %cmd, "Executing shell command");

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| SliceError::ShellExec {
            command: cmd.to_string(),
            source: e,
        })?;

    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    let result = ExecResult {
        exit_code,
        stdout,
        stderr,
    };

    if result.success() {
        tracing::trace!(command = %cmd, exit_code = exit_code, "Command succeeded");
    } else {
        tracing::warn!(
            command = %cmd,
            exit_code = exit_code,
            stderr = %result.stderr,
            "Command failed"
        );
    }

    Ok(result)
}

/// Executes a shell command and returns an error on non-zero exit.
pub async fn exec_or_throw(cmd: &str) -> SliceResult<String> {
    let result = exec(cmd).await?;
    if result.success() {
        Ok(result.stdout)
    } else {
        Err(SliceError::ShellCommandFailed {
            command: cmd.to_string(),
            exit_code: result.exit_code,
            output: result.combined_output(),
        })
    }
}

/// Like [`exec_or_throw`], bounded by `timeout`.
///
/// The child is killed when the bound expires.
pub async fn exec_with_timeout(cmd: &str, timeout: Duration) -> SliceResult<String> {
    match tokio::time::timeout(timeout, exec_or_throw(cmd)).await {
        Ok(result) => result,
        Err(_) => Err(SliceError::timeout(
            cmd,
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        )),
    }
}

/// Prefixes `cmd` with sudo when `use_sudo` is set.
pub fn with_sudo(cmd: String, use_sudo: bool) -> String {
    if use_sudo {
        format!("{} {}", SUDO_CMD, cmd)
    } else {
        cmd
    }
}
