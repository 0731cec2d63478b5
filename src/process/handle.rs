//! # OS handle of one running process.
//!
//! [`ProcessHandle`] owns a spawned child through a small waiter task:
//!
//! ```text
//! spawn() ──► waiter task ── owns tokio::process::Child
//!               ├─ child.wait()        ──► exit status (oneshot) ──► ProcessHandle::wait()
//!               └─ signal queue (mpsc) ──► killpg(TERM|KILL) on the process group
//!
//!             stdout reader ──► Event::LogLine … Event::StreamClosed
//!             stderr reader ──► Event::LogLine … Event::StreamClosed
//! ```
//!
//! ## Rules
//! - On unix the child leads its own process group; signals go to the whole
//!   group so shell wrappers do not leave grandchildren behind.
//! - stdin is closed; stdout and stderr are captured line by line (lossy UTF-8,
//!   trailing `\n`/`\r\n` stripped) and published on the bus.
//! - Dropping the handle kills the process group.
//! - `wait()` is cancel-safe and caches the exit status.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::SpawnError;
use crate::events::{Bus, Event, EventKind};
use crate::process::{ExitStatus, LogStream, ProcessConfig};

/// Signal delivered to a running process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalKind {
    /// Polite request to exit (SIGTERM).
    Terminate,
    /// Forced termination (SIGKILL).
    Kill,
}

/// Handle to a live (or just exited) child process.
pub struct ProcessHandle {
    name: Arc<str>,
    pid: Option<u32>,
    signals: mpsc::UnboundedSender<SignalKind>,
    exit_rx: Option<oneshot::Receiver<ExitStatus>>,
    exit: Option<ExitStatus>,
}

impl ProcessHandle {
    /// Spawns the configured command and starts capturing its output.
    pub fn spawn(cfg: &ProcessConfig, bus: &Bus) -> Result<Self, SpawnError> {
        let name: Arc<str> = Arc::from(cfg.name.as_str());

        let mut cmd = Command::new(&cfg.command);
        cmd.args(&cfg.args)
            .envs(&cfg.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &cfg.working_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| SpawnError {
            process: cfg.name.clone(),
            source,
        })?;
        let pid = child.id();

        if let Some(out) = child.stdout.take() {
            tokio::spawn(pump(out, name.clone(), LogStream::Stdout, bus.clone()));
        }
        if let Some(err) = child.stderr.take() {
            tokio::spawn(pump(err, name.clone(), LogStream::Stderr, bus.clone()));
        }

        let (sig_tx, sig_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(reap(child, pid, name.clone(), sig_rx, exit_tx));

        tracing::debug!(process = %name, pid = ?pid, "process spawned");
        Ok(Self {
            name,
            pid,
            signals: sig_tx,
            exit_rx: Some(exit_rx),
            exit: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS pid (absent if the OS did not report one).
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status, if the exit was already observed through [`wait`](Self::wait).
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit
    }

    /// Sends a signal. Sending to an exited process is a no-op.
    pub fn signal(&self, kind: SignalKind) {
        let _ = self.signals.send(kind);
    }

    /// Waits for the process to exit.
    pub async fn wait(&mut self) -> ExitStatus {
        if let Some(status) = self.exit {
            return status;
        }
        let status = match self.exit_rx.as_mut() {
            Some(rx) => rx.await.unwrap_or_default(),
            None => ExitStatus::default(),
        };
        self.exit_rx = None;
        self.exit = Some(status);
        status
    }

    /// Sends TERM, waits up to `grace` (or until `force` is cancelled), then KILLs.
    pub async fn terminate(&mut self, grace: Duration, force: &CancellationToken) -> ExitStatus {
        if let Some(status) = self.exit {
            return status;
        }
        self.signal(SignalKind::Terminate);

        let exited = tokio::select! {
            status = self.wait() => Some(status),
            _ = tokio::time::sleep(grace) => None,
            _ = force.cancelled() => None,
        };

        match exited {
            Some(status) => status,
            None => {
                tracing::warn!(
                    process = %self.name,
                    pid = ?self.pid,
                    ?grace,
                    "process ignored terminate; killing"
                );
                self.signal(SignalKind::Kill);
                self.wait().await
            }
        }
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("name", &self.name)
            .field("pid", &self.pid)
            .field("exit", &self.exit)
            .finish()
    }
}

/// Owns the child until it exits; a closed signal queue means "kill".
async fn reap(
    mut child: Child,
    pid: Option<u32>,
    name: Arc<str>,
    mut signals: mpsc::UnboundedReceiver<SignalKind>,
    exit_tx: oneshot::Sender<ExitStatus>,
) {
    let res = loop {
        tokio::select! {
            res = child.wait() => break res,
            sig = signals.recv() => match sig {
                Some(kind) => deliver(&mut child, pid, kind),
                None => {
                    deliver(&mut child, pid, SignalKind::Kill);
                    break child.wait().await;
                }
            },
        }
    };

    let status = match res {
        Ok(status) => ExitStatus::from(status),
        Err(e) => {
            tracing::warn!(process = %name, error = %e, "failed to wait for process");
            ExitStatus::default()
        }
    };
    tracing::debug!(process = %name, pid = ?pid, %status, "process exited");
    let _ = exit_tx.send(status);
}

#[cfg(unix)]
fn deliver(child: &mut Child, pid: Option<u32>, kind: SignalKind) {
    use nix::sys::signal::{Signal, kill, killpg};
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        let _ = child.start_kill();
        return;
    };
    let pid = Pid::from_raw(pid as i32);
    let sig = match kind {
        SignalKind::Terminate => Signal::SIGTERM,
        SignalKind::Kill => Signal::SIGKILL,
    };
    if let Err(e) = killpg(pid, sig) {
        tracing::debug!(pid = %pid, error = %e, "killpg failed; signalling process only");
        match kind {
            SignalKind::Terminate => {
                let _ = kill(pid, sig);
            }
            SignalKind::Kill => {
                let _ = child.start_kill();
            }
        }
    }
}

#[cfg(not(unix))]
fn deliver(child: &mut Child, _pid: Option<u32>, _kind: SignalKind) {
    let _ = child.start_kill();
}

async fn pump<R>(reader: R, process: Arc<str>, stream: LogStream, bus: Bus)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            // keep draining the pipe so the child never blocks on a full buffer
            Ok(_) if !bus.has_receivers() => {}
            Ok(_) => {
                let line = trim_newline(&buf);
                bus.publish(Event::log_line(
                    process.clone(),
                    stream,
                    String::from_utf8_lossy(line).as_ref(),
                ));
            }
            Err(e) => {
                tracing::debug!(
                    process = %process,
                    stream = stream.as_str(),
                    error = %e,
                    "output read failed"
                );
                break;
            }
        }
    }
    bus.publish(
        Event::new(EventKind::StreamClosed)
            .with_process(process)
            .with_stream(stream),
    );
}

fn trim_newline(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}
