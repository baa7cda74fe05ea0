//! Child process execution with a timeout and bounded output capture.

use std::io::{Read, Write};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// What to run and how long to let it run.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    /// Program followed by its arguments.
    pub argv: Vec<String>,
    /// Extra environment variables for the child.
    pub env: Vec<(String, String)>,
    /// Bytes written to the child's stdin before waiting.
    pub stdin: Vec<u8>,
    pub timeout: Duration,
    /// Bytes kept per stream; the rest is drained and counted.
    pub output_limit_bytes: usize,
}

/// Captured child process output.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Extra time granted to the output readers once the child has exited or been
/// killed. Descendants that still hold the pipes past this are abandoned.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

type StreamResult = Result<(Vec<u8>, usize)>;

/// Run `request.argv`, feeding `request.stdin`, and capture both streams.
///
/// Stdin is written and both streams are drained on their own threads while
/// the child runs, so neither a child that never reads nor a chatty child can
/// stall the caller. On Unix the child leads its own process group and a
/// timeout kills the whole group. On timeout `timed_out` is set; that is not
/// an error at this layer.
#[instrument(skip_all, fields(program = request.argv.first().map(String::as_str), timeout_secs = request.timeout.as_secs()))]
pub fn run_process(request: &ProcessRequest) -> Result<ProcessOutput> {
    let (program, args) = request
        .argv
        .split_first()
        .ok_or_else(|| anyhow!("empty command"))?;
    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(request.env.iter().map(|(key, value)| (key, value)))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {program}"));
        }
    };

    let mut child_stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("stdin was not piped"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let input = request.stdin.clone();
    // Detached: the write ends once the child reads everything or the pipe closes.
    thread::spawn(move || {
        if let Err(e) = child_stdin.write_all(&input) {
            warn!(err = %e, "child closed stdin early");
        }
    });

    let limit = request.output_limit_bytes;
    let stdout_rx = spawn_reader(stdout, limit);
    let stderr_rx = spawn_reader(stderr, limit);

    let mut timed_out = false;
    let status = match child
        .wait_timeout(request.timeout)
        .context("wait for command")?
    {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = request.timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_process_tree(&mut child).context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(&stdout_rx, "stdout")?;
    let (stderr, stderr_truncated) = join_output(&stderr_rx, "stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn spawn_reader<R>(reader: R, limit: usize) -> mpsc::Receiver<StreamResult>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone only if the stream was abandoned.
        let _ = tx.send(read_stream_limited(reader, limit));
    });
    rx
}

/// Collect a reader's result, abandoning it if descendants keep the pipe open.
fn join_output(rx: &mpsc::Receiver<StreamResult>, stream: &str) -> StreamResult {
    match rx.recv_timeout(DRAIN_GRACE) {
        Ok(result) => result.with_context(|| format!("read {stream}")),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            warn!(stream, "descendant process still holds the pipe, output abandoned");
            Ok((Vec::new(), 0))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(anyhow!("{stream} reader thread panicked"))
        }
    }
}

/// Kill the child and, on Unix, every process in its group.
fn kill_process_tree(child: &mut Child) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        // The child leads its group, so its pid is the group id.
        let group = format!("-{}", child.id());
        match Command::new("kill")
            .args(["-KILL", "--", group.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => {}
            Ok(status) => warn!(exit_code = ?status.code(), "process group kill failed"),
            Err(e) => warn!(err = %e, "process group kill unavailable"),
        }
    }
    child.kill()
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> ProcessRequest {
        ProcessRequest {
            argv: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            env: vec![("TURNGUARD_TEST_VALUE".to_string(), "42".to_string())],
            stdin: b"hello from stdin".to_vec(),
            timeout: Duration::from_secs(10),
            output_limit_bytes: 1_000,
        }
    }

    #[test]
    fn captures_stdin_echo_and_env() {
        let output = run_process(&sh("cat; printf ' %s' \"$TURNGUARD_TEST_VALUE\"")).expect("run");
        assert!(output.status.success());
        assert_eq!(output.stdout_lossy(), "hello from stdin 42");
        assert!(!output.timed_out);
    }

    #[test]
    fn truncates_output_beyond_limit() {
        let mut request = sh("cat >/dev/null; printf 'abcdefghij'");
        request.output_limit_bytes = 4;
        let output = run_process(&request).expect("run");
        assert_eq!(output.stdout_lossy(), "abcd");
        assert_eq!(output.stdout_truncated, 6);
    }

    #[test]
    fn kills_child_on_timeout() {
        let mut request = sh("sleep 5");
        request.timeout = Duration::from_millis(100);
        let output = run_process(&request).expect("run");
        assert!(output.timed_out);
    }

    #[test]
    fn timeout_holds_when_child_never_reads_large_stdin() {
        let mut request = sh("sleep 8");
        request.stdin = vec![b'x'; 1_000_000];
        request.timeout = Duration::from_millis(500);

        let started = Instant::now();
        let output = run_process(&request).expect("run");

        assert!(output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn timeout_kills_grandchildren_holding_output() {
        let mut request = sh("cat >/dev/null; sleep 6; echo late");
        request.timeout = Duration::from_millis(300);

        let started = Instant::now();
        let output = run_process(&request).expect("run");

        assert!(output.timed_out);
        assert!(!output.stdout_lossy().contains("late"));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn missing_program_is_an_error() {
        let request = ProcessRequest {
            argv: vec!["turnguard-definitely-missing-binary".to_string()],
            ..sh("")
        };
        let err = run_process(&request).unwrap_err();
        assert!(format!("{err:#}").contains("spawn"));
    }
}
