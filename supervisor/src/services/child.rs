//! Child process plumbing: spawn, output pumps, signals and exit watching

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use crate::core::ExitReason;
use crate::error::{SupervisorError, SupervisorResult};
use shared::{process_debug, process_warn, ProcessRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// One line of child output, tagged with the spawn it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub generation: u64,
    pub stream: OutputStream,
    pub text: String,
}

/// Handle on a running child
///
/// The `Child` itself lives in a waiter task so its exit can be awaited while
/// signals are still being sent. Dropping the handle kills the child.
pub struct ChildProcess {
    pid: Option<u32>,
    exit: oneshot::Receiver<ExitReason>,
    kill: Option<oneshot::Sender<()>>,
}

impl ChildProcess {
    /// Spawn `command` with piped output; every line is sent to `output`
    pub fn spawn(
        command: &str,
        args: &[String],
        generation: u64,
        output: mpsc::UnboundedSender<OutputLine>,
    ) -> SupervisorResult<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SupervisorError::SpawnFailed {
                command: command.to_string(),
                source,
            })?;

        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(stdout, generation, OutputStream::Stdout, output.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, generation, OutputStream::Stderr, output));
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };

            let reason = status.map(ExitReason::from).unwrap_or(ExitReason::Unknown);
            let _ = exit_tx.send(reason);
        });

        Ok(Self {
            pid,
            exit: exit_rx,
            kill: Some(kill_tx),
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Resolves once the child has exited
    pub async fn exited(&mut self) -> ExitReason {
        (&mut self.exit).await.unwrap_or(ExitReason::Unknown)
    }

    /// Ask the child to stop (SIGTERM)
    #[cfg(unix)]
    pub fn terminate(&mut self) -> SupervisorResult<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.pid else {
            return Ok(());
        };

        let raw = i32::try_from(pid).map_err(|_| SupervisorError::SignalFailed {
            pid,
            message: "pid out of range".to_string(),
        })?;

        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) => {
                process_debug!(ProcessRole::current(), "📤 Sent SIGTERM to {}", pid);
                Ok(())
            }
            // Already gone; the exit event is on its way
            Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(SupervisorError::SignalFailed {
                pid,
                message: e.to_string(),
            }),
        }
    }

    /// Without POSIX signals the only way to stop the child is to kill it
    #[cfg(not(unix))]
    pub fn terminate(&mut self) -> SupervisorResult<()> {
        self.kill();
        Ok(())
    }

    /// Force the child down (SIGKILL)
    pub fn kill(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
            process_debug!(ProcessRole::current(), "🔨 Sent SIGKILL to {:?}", self.pid);
        }
    }
}

async fn pump_lines<R>(reader: R, generation: u64, stream: OutputStream, output: mpsc::UnboundedSender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = OutputLine {
                    generation,
                    stream,
                    text: decode_line(&buf),
                };
                if output.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                process_warn!(ProcessRole::current(), "⚠️ Stopped reading child {}: {}", stream, e);
                break;
            }
        }
    }
}

/// Lossy UTF-8 with the line terminator removed
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_output_lines_are_tagged_and_exit_is_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut child = ChildProcess::spawn("sh", &sh("echo hello; echo oops >&2; exit 3"), 7, tx).unwrap();

        assert_eq!(child.exited().await, ExitReason::Code(3));

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        assert!(lines.contains(&OutputLine {
            generation: 7,
            stream: OutputStream::Stdout,
            text: "hello".to_string()
        }));
        assert!(lines.contains(&OutputLine {
            generation: 7,
            stream: OutputStream::Stderr,
            text: "oops".to_string()
        }));
    }

    #[test]
    fn test_decode_line_strips_terminators() {
        assert_eq!(decode_line(b"ready\r\n"), "ready");
        assert_eq!(decode_line(b"no newline"), "no newline");
        assert_eq!(decode_line(b"bad \xff byte\n"), "bad \u{FFFD} byte");
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_stop_the_pump() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut child = ChildProcess::spawn("sh", &sh("printf 'bad \\377 byte\\n'; echo 'FATAL ERROR: boom'"), 1, tx).unwrap();

        assert_eq!(child.exited().await, ExitReason::Code(0));

        let mut texts = Vec::new();
        while let Some(line) = rx.recv().await {
            texts.push(line.text);
        }
        assert_eq!(texts, vec!["bad \u{FFFD} byte".to_string(), "FATAL ERROR: boom".to_string()]);
    }

    #[tokio::test]
    async fn test_terminate_sends_sigterm() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut child = ChildProcess::spawn("sleep", &["30".to_string()], 1, tx).unwrap();

        child.terminate().unwrap();
        assert_eq!(child.exited().await, ExitReason::Signaled(15));
    }

    #[tokio::test]
    async fn test_kill_ends_a_child_that_ignores_sigterm() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut child = ChildProcess::spawn("sh", &sh("trap '' TERM; sleep 30"), 1, tx).unwrap();

        child.kill();
        assert_eq!(child.exited().await, ExitReason::Signaled(9));
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_spawn_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = ChildProcess::spawn("/definitely/not/a/binary", &[], 1, tx);
        assert!(matches!(result, Err(SupervisorError::SpawnFailed { .. })));
    }
}
