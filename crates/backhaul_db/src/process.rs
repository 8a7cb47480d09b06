//! Subprocess hygiene shared by every dialect (spec §4.3): argv-only
//! commands (no shell quoting), a sanitized environment, continuous stderr
//! draining to the log sink, and cancel-aware waiting that kills the child
//! on cooperative cancellation. Grounded on the teacher's guest-process
//! bridge (`casparian_worker::bridge`: spawn, drain stderr, poll `try_wait`
//! against a cancel token, kill on cancel), reworked from a blocking
//! `std::process::Child` poll loop into `tokio::process::Child` with a
//! dedicated stderr-draining task, since Runner stages are async stages
//! with a cooperative `tokio`-based cancel check (spec §4.11: "every
//! upstream/downstream byte acknowledgment" and "every remote-call
//! round-trip" are suspension points, not a CPU-bound poll loop).

use std::process::Stdio;

use backhaul_protocol::execution::{LogLevel, LogType};
use backhaul_protocol::{CancellationToken, Reporter};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::{DbError, DbResult};

const STDERR_TAIL_BYTES: usize = 4096;

/// Grace window between SIGTERM and SIGKILL on cancellation (spec §5:
/// "send a TERM (then KILL after a short grace) to live subprocesses"),
/// long enough for `pg_dump`/`mysqldump` to close their DB connection and
/// remove any temp file before being hard-killed.
const CANCEL_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

/// Outcome of running a command to completion.
pub struct ProcessOutcome {
    pub tail_stderr: String,
}

/// Runs `tool` with `args`, wiring `stdin` (if given) and inheriting no
/// ambient environment beyond `env` (spec §4.3: "inherit a sanitized
/// environment"). stdout is left to the caller via `configure`; stderr is
/// drained continuously to `reporter` so a slow dump doesn't silently fill
/// the OS pipe buffer and deadlock.
pub async fn run_subprocess(
    tool: &str,
    args: &[String],
    env: &[(String, String)],
    stdin_path: Option<&std::path::Path>,
    stdout_path: Option<&std::path::Path>,
    cancel: &CancellationToken,
    reporter: &dyn Reporter,
    log_type: LogType,
) -> DbResult<ProcessOutcome> {
    let mut command = Command::new(tool);
    command.args(args);
    command.env_clear();
    for (key, value) in env {
        command.env(key, value);
    }
    command.stderr(Stdio::piped());

    match stdin_path {
        Some(path) => {
            let file = std::fs::File::open(path)?;
            command.stdin(Stdio::from(file));
        }
        None => {
            command.stdin(Stdio::null());
        }
    }
    match stdout_path {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            command.stdout(Stdio::from(file));
        }
        None => {
            command.stdout(Stdio::null());
        }
    }

    let mut child = command
        .spawn()
        .map_err(|err| DbError::ToolNotFound(format!("{tool}: {err}")))?;

    let stderr = child.stderr.take().expect("stderr was piped");
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = String::new();

    loop {
        tokio::select! {
            biased;
            _ = wait_for_cancel(cancel) => {
                terminate_child(&mut child).await;
                return Err(DbError::Cancelled);
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(text)) => {
                        reporter.log(LogLevel::Debug, log_type, &text);
                        append_tail(&mut tail, &text);
                    }
                    Ok(None) => {
                        // stderr closed; fall through to wait for exit.
                        break;
                    }
                    Err(err) => {
                        return Err(DbError::StreamIo(err.to_string()));
                    }
                }
            }
        }
    }

    let status = tokio::select! {
        biased;
        _ = wait_for_cancel(cancel) => {
            terminate_child(&mut child).await;
            return Err(DbError::Cancelled);
        }
        status = child.wait() => status?,
    };

    if let Some(code) = status.code() {
        if code != 0 {
            return Err(DbError::SubprocessFailed {
                tool: tool.to_string(),
                code,
                tail_stderr: tail,
            });
        }
    } else {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Err(DbError::SubprocessSignaled {
                    tool: tool.to_string(),
                    signal,
                });
            }
        }
        return Err(DbError::SubprocessFailed {
            tool: tool.to_string(),
            code: -1,
            tail_stderr: tail,
        });
    }

    Ok(ProcessOutcome { tail_stderr: tail })
}

async fn wait_for_cancel(cancel: &CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
}

/// Signals a cancelled subprocess the way spec §5 requires: TERM first, a
/// short grace period to let it unwind, then KILL if it's still alive.
/// `tokio::process::Child::kill` only ever sends SIGKILL, so the TERM is
/// raised directly against the child's pid.
async fn terminate_child(child: &mut tokio::process::Child) {
    let Some(pid) = child.id() else {
        // Already reaped; nothing left to signal.
        return;
    };

    #[cfg(unix)]
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
    #[cfg(not(unix))]
    {
        // No portable TERM equivalent; fall straight through to the grace
        // wait below and let the KILL escalation handle it.
        let _ = pid;
    }

    if tokio::time::timeout(CANCEL_GRACE, child.wait()).await.is_err() {
        let _ = child.kill().await;
        let _ = child.wait().await;
    }
}

fn append_tail(tail: &mut String, line: &str) {
    tail.push_str(line);
    tail.push('\n');
    if tail.len() > STDERR_TAIL_BYTES {
        let excess = tail.len() - STDERR_TAIL_BYTES;
        *tail = tail.split_off(excess);
    }
}

/// Locates a client binary, preferring a family-matching one when several
/// candidates are given in priority order (spec §4.3: "prefer
/// family-matching").
pub fn find_binary(candidates: &[&str]) -> DbResult<String> {
    for candidate in candidates {
        if let Ok(path) = which::which(candidate) {
            return Ok(path.to_string_lossy().into_owned());
        }
    }
    Err(DbError::ToolNotFound(candidates.join(" or ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use backhaul_protocol::BufferingReporter;

    #[tokio::test]
    async fn run_subprocess_captures_stderr_tail_on_failure() {
        let reporter = BufferingReporter::new();
        let cancel = CancellationToken::new();
        let result = run_subprocess(
            "sh",
            &[
                "-c".to_string(),
                "echo boom 1>&2; exit 3".to_string(),
            ],
            &[],
            None,
            None,
            &cancel,
            &reporter,
            LogType::Dump,
        )
        .await;
        match result {
            Err(DbError::SubprocessFailed { code, tail_stderr, .. }) => {
                assert_eq!(code, 3);
                assert!(tail_stderr.contains("boom"));
            }
            other => panic!("expected SubprocessFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_subprocess_succeeds_on_zero_exit() {
        let reporter = BufferingReporter::new();
        let cancel = CancellationToken::new();
        let result = run_subprocess(
            "sh",
            &["-c".to_string(), "exit 0".to_string()],
            &[],
            None,
            None,
            &cancel,
            &reporter,
            LogType::Dump,
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn cancel_before_spawn_completes_kills_and_errors() {
        let reporter = BufferingReporter::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_subprocess(
            "sh",
            &["-c".to_string(), "sleep 5".to_string()],
            &[],
            None,
            None,
            &cancel,
            &reporter,
            LogType::Dump,
        )
        .await;
        assert!(matches!(result, Err(DbError::Cancelled)));
    }

    #[test]
    fn find_binary_prefers_first_match_in_priority_order() {
        let result = find_binary(&["definitely-not-a-real-binary", "sh"]);
        assert!(result.is_ok());
        assert!(result.unwrap().ends_with("sh"));
    }
}
