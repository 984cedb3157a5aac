//! Time-bounded subprocess execution.
//!
//! Every package-manager call goes through [`run_with_timeout`]. Output pipes
//! are drained on helper threads so a chatty child can never block on a full
//! pipe while we wait for it. Grandchildren can inherit those pipes and keep
//! them open after the child is gone, so the drain itself is bounded too.

use crate::error::{Error, Result};
use crate::types::CommandOutput;
use std::io::{ErrorKind, Read};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// How long to keep reading pipes once the child has exited or been killed.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

type PipeBuffer = Arc<Mutex<Vec<u8>>>;

/// Run `argv` and capture its output, killing it once `timeout` expires.
///
/// A timeout is not an error: the returned [`CommandOutput`] has
/// `timed_out` set. Only a failure to start the program is an error.
pub fn run_with_timeout(argv: &[String], timeout: Duration) -> Result<CommandOutput> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::Other("empty command line".to_string()))?;

    log::debug!("Running (timeout {}s): {}", timeout.as_secs(), argv.join(" "));

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| Error::Spawn {
            program: program.clone(),
            source,
        })?;

    let (done_tx, done_rx) = mpsc::channel();
    let stdout_buf = child.stdout.take().map(|p| spawn_reader(p, done_tx.clone()));
    let stderr_buf = child.stderr.take().map(|p| spawn_reader(p, done_tx.clone()));
    drop(done_tx);

    let status = match child.wait_timeout(timeout)? {
        Some(status) => Some(status),
        None => {
            log::warn!("Command timed out after {}s: {}", timeout.as_secs(), program);
            // Already-exited races are fine to ignore here.
            let _ = child.kill();
            let _ = child.wait();
            None
        }
    };

    let readers = usize::from(stdout_buf.is_some()) + usize::from(stderr_buf.is_some());
    if !wait_for_readers(&done_rx, readers, DRAIN_GRACE) {
        log::debug!("Output pipes of {program} still open; keeping what was read");
    }

    let stdout = stdout_buf.map(|b| take_output(&b)).unwrap_or_default();
    let stderr = stderr_buf.map(|b| take_output(&b)).unwrap_or_default();

    Ok(CommandOutput {
        argv: argv.to_vec(),
        code: status.and_then(|s| s.code()),
        stdout,
        stderr,
        timed_out: status.is_none(),
        timeout,
    })
}

/// Copy `pipe` into a shared buffer chunk by chunk, then signal `done`.
fn spawn_reader<R: Read + Send + 'static>(mut pipe: R, done: Sender<()>) -> PipeBuffer {
    let buf = PipeBuffer::default();
    let sink = Arc::clone(&buf);
    thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => sink
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(_) => break,
            }
        }
        let _ = done.send(());
    });
    buf
}

/// Wait until `count` readers hit EOF or `grace` runs out.
fn wait_for_readers(done: &Receiver<()>, count: usize, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    for _ in 0..count {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if done.recv_timeout(remaining).is_err() {
            return false;
        }
    }
    true
}

fn take_output(buf: &PipeBuffer) -> String {
    let bytes = buf.lock().unwrap_or_else(PoisonError::into_inner);
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Run a `--version` style probe; returns trimmed stdout on success.
pub fn probe_version(argv: &[String], timeout: Duration) -> Option<String> {
    match run_with_timeout(argv, timeout) {
        Ok(out) if out.success() => Some(out.stdout.trim().to_string()),
        Ok(out) => {
            log::debug!(
                "Probe failed ({}): {}",
                out.display_command(),
                crate::error::excerpt(&out.combined(), 200)
            );
            None
        }
        Err(e) => {
            log::debug!("Probe could not start: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_empty_command_is_error() {
        assert!(run_with_timeout(&[], Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let argv = vec!["definitely-not-a-real-program-xyz".to_string()];
        let err = run_with_timeout(&argv, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_output_and_code() {
        let out = run_with_timeout(&sh("echo hello; echo oops >&2; exit 3"), Duration::from_secs(10))
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert!(!out.timed_out);
        assert!(!out.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let out = run_with_timeout(&sh("sleep 5"), Duration::from_millis(200)).unwrap();
        assert!(out.timed_out);
        assert_eq!(out.code, None);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_not_held_by_grandchild_pipes() {
        let start = Instant::now();
        let out = run_with_timeout(&sh("echo early; sleep 6 & wait"), Duration::from_millis(300))
            .unwrap();
        assert!(out.timed_out);
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(out.stdout.trim(), "early");
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_version() {
        assert_eq!(
            probe_version(&sh("echo uv 0.5.1"), Duration::from_secs(5)),
            Some("uv 0.5.1".to_string())
        );
        assert_eq!(probe_version(&sh("exit 1"), Duration::from_secs(5)), None);
    }
}
