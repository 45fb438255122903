//! Subprocess execution for the local engines.

use crate::{Result, TallyError};
use std::ffi::OsStr;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Whether `program` resolves to an executable (absolute path or on `PATH`).
pub fn command_exists(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Run `program` with `args` and return its stdout as UTF-8 (lossy).
///
/// # Errors
///
/// - `TallyError::Io` when the process cannot be spawned or awaited
/// - `TallyError::Backend` on timeout or a non-zero exit status
pub async fn run_command<I, S>(backend: &str, program: &str, args: I, limit: Duration) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let child = Command::new(program)
        .args(args)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| std::io::Error::other(format!("Failed to execute {}: {}", program, e)))?;

    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(std::io::Error::other(format!("Failed to wait for {}: {}", program, e)).into()),
        Err(_) => {
            // Dropping the future drops the child, which kills it.
            return Err(TallyError::backend(
                backend,
                format!("{} timed out after {} seconds", program, limit.as_secs()),
            ));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TallyError::backend(
            backend,
            format!("{} exited with {}: {}", program, output.status, stderr.trim()),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_command_captures_stdout() {
        let out = run_command("test", "sh", ["-c", "echo 153"], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.trim(), "153");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_backend_error() {
        let err = run_command("test", "sh", ["-c", "echo boom >&2; exit 3"], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::Backend { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let err = run_command("test", "definitely-not-a-real-binary-xyz", ["x"], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::Io(_)));
        assert!(!command_exists("definitely-not-a-real-binary-xyz"));
    }

    #[tokio::test]
    async fn test_timeout_is_backend_error() {
        let err = run_command("test", "sh", ["-c", "sleep 5"], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
