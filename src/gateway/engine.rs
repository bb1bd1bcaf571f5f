//! Execution engine: spawn, bound, reap.
//!
//! Runs an already-validated command through the system shell in its own
//! process group, captures stdout and stderr concurrently, and enforces a
//! hard wall-clock budget. On timeout the whole process group is killed
//! and reaped before the result is returned, so no descendant outlives
//! its request.
//!
//! Every failure path — timeout, spawn error, capture fault — is folded
//! into a well-formed [`ExecutionResult`]; this function never returns an
//! error and never panics on engine-side faults. No retries.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::{ExecutionResult, ENGINE_FAILURE_CODE};

/// Separator inserted between stdout and stderr in the merged buffer.
const STDERR_MARKER: &str = "\n--- stderr ---\n";

/// Runs `command` through `sh -c` with the given time budget.
pub async fn execute(command: &str, timeout: Duration) -> ExecutionResult {
    execute_with_shell("sh", command, timeout).await
}

/// Inner engine, parameterized on the shell binary so spawn failures are
/// testable without uninstalling `sh`.
async fn execute_with_shell(shell: &str, command: &str, timeout: Duration) -> ExecutionResult {
    let mut cmd = Command::new(shell);
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Backstop: if this future is dropped mid-flight the direct
        // child still dies with it.
        .kill_on_drop(true);

    // A fresh process group so a timeout can take down descendants too.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("spawn failed for gated command: {e}");
            return ExecutionResult {
                output: format!("failed to start command: {e}"),
                exit_code: ENGINE_FAILURE_CODE,
                timed_out: false,
            };
        }
    };

    // Drain both pipes concurrently with the wait so a chatty process
    // can never deadlock on a full pipe buffer.
    let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    // The deadline covers the wait AND the capture: a background
    // grandchild keeping the pipes open must not stall the request
    // after the direct child exited.
    let bounded = tokio::time::timeout(timeout, async {
        let status = child.wait().await;
        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        (status, stdout, stderr)
    })
    .await;

    match bounded {
        Ok((Ok(status), stdout, stderr)) => ExecutionResult {
            output: merge_output(stdout, &stderr),
            exit_code: status.code().unwrap_or(ENGINE_FAILURE_CODE),
            timed_out: false,
        },
        Ok((Err(e), _, _)) => ExecutionResult {
            output: format!("failed waiting for command: {e}"),
            exit_code: ENGINE_FAILURE_CODE,
            timed_out: false,
        },
        Err(_) => {
            kill_process_group(&mut child);
            // Reap so the kill leaves neither an orphan nor a zombie.
            // The group kill also closes the pipes, so the detached
            // reader tasks finish on EOF.
            let _ = child.wait().await;
            debug!("gated command killed after {}s budget", timeout.as_secs());
            ExecutionResult {
                output: format!("timed out after {}s", timeout.as_secs()),
                exit_code: ENGINE_FAILURE_CODE,
                timed_out: true,
            }
        }
    }
}

/// Reads a captured pipe to the end, lossily decoding as UTF-8.
async fn read_stream<R>(stream: Option<R>) -> String
where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

/// Merges the two captured streams, marking the stderr portion when
/// there is one.
fn merge_output(stdout: String, stderr: &str) -> String {
    if stderr.is_empty() {
        stdout
    } else {
        let mut merged = stdout;
        merged.push_str(STDERR_MARKER);
        merged.push_str(stderr);
        merged
    }
}

/// Kills the child's whole process group. The child was spawned with
/// `process_group(0)`, so its pid doubles as the pgid.
#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    const BUDGET: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let result = execute("echo hello", BUDGET).await;
        assert_eq!(result.output.trim(), "hello");
        assert_eq!(result.exit_code, 0);
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_reports_real_exit_code() {
        let result = execute("exit 3", BUDGET).await;
        assert_eq!(result.exit_code, 3);
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_stderr_merged_with_marker() {
        let result = execute("echo out; echo err >&2", BUDGET).await;
        assert!(result.output.contains("out"));
        assert!(result.output.contains("--- stderr ---"));
        assert!(result.output.contains("err"));
    }

    #[tokio::test]
    async fn test_no_marker_without_stderr() {
        let result = execute("echo clean", BUDGET).await;
        assert!(!result.output.contains("--- stderr ---"));
    }

    #[tokio::test]
    async fn test_timeout_kills_within_budget() {
        let started = Instant::now();
        let result = execute("sleep 100", Duration::from_secs(1)).await;
        let elapsed = started.elapsed();

        assert!(result.timed_out);
        assert_eq!(result.exit_code, ENGINE_FAILURE_CODE);
        assert_eq!(result.output, "timed out after 1s");
        // Budget plus a small teardown epsilon.
        assert!(
            elapsed < Duration::from_secs(3),
            "took {elapsed:?} to return from a 1s budget"
        );
    }

    #[tokio::test]
    async fn test_timeout_reaps_descendants() {
        // The background child belongs to the same process group, so the
        // group kill takes it down with the shell.
        let started = Instant::now();
        let result = execute("sleep 100 & sleep 100", Duration::from_secs(1)).await;
        assert!(result.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_spawn_failure_reported_not_raised() {
        let result =
            execute_with_shell("/nonexistent/shell-xyz", "echo hi", BUDGET).await;
        assert_eq!(result.exit_code, ENGINE_FAILURE_CODE);
        assert!(!result.timed_out);
        assert!(result.output.contains("failed to start command"));
    }

    #[tokio::test]
    async fn test_merge_output_shapes() {
        assert_eq!(merge_output("a".into(), ""), "a");
        assert_eq!(merge_output("a".into(), "b"), "a\n--- stderr ---\nb");
        assert_eq!(merge_output(String::new(), "b"), "\n--- stderr ---\nb");
    }
}
