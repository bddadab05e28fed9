//! The per-process state machine.
//!
//! A session owns exactly one child. It writes the stdin payload, routes
//! stdout and stderr chunks to their sinks, records how the child exited,
//! and resolves its [`ResultHandle`] once both streams are closed and the
//! child has been reaped.
//!
//! Every child leads its own process group and signals go to the whole
//! group, so grandchildren holding the output pipes die with it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::killpg;
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command as ProcessCommand};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::handle::{Output, ResultHandle};
use super::signal::{Signal, Status};
use super::sink::{Sink, SinkState};
use crate::error::{Error, Result};

/// Bytes requested per read from a child's output pipe.
const CHUNK_SIZE: usize = 8192;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Spawned,
    Running,
    ExitDetected,
    Reaped,
    Resolved,
}

impl SessionState {
    /// Whether `next` is the state that directly follows `self`.
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Spawned)
                | (Self::Spawned, Self::Running)
                | (Self::Running, Self::ExitDetected)
                | (Self::ExitDetected, Self::Reaped)
                | (Self::Reaped, Self::Resolved)
        )
    }
}

/// Everything needed to start one child process.
#[derive(Debug, Default)]
pub(crate) struct Launch {
    /// Program label used in logs and errors.
    pub program: String,
    pub executable: PathBuf,
    /// Arguments after argv[0].
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub env_remove: Vec<String>,
    pub env_clear: bool,
    pub working_dir: Option<PathBuf>,
    pub stdin: Option<Vec<u8>>,
    pub stdout: Sink,
    pub stderr: Sink,
    pub debug: bool,
    pub timeout: Option<(Duration, Signal)>,
}

/// Spawn `launch` now and drive it on a background task.
///
/// Spawn failures resolve the returned handle immediately.
pub(crate) fn start(launch: Launch) -> ResultHandle {
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (result_tx, result_rx) = oneshot::channel();
    let timeout = launch.timeout;

    match Session::spawn(launch) {
        Ok((session, child, sinks)) => {
            let pid = child.id();
            if let Some((after, signal)) = timeout {
                arm_timeout(after, signal, control_tx.clone());
            }
            tokio::spawn(async move {
                let output = session.run(child, sinks, control_rx).await;
                let _ = result_tx.send(Ok(output));
            });
            ResultHandle::new(pid, control_tx, result_rx)
        }
        Err(e) => ResultHandle::failed(e),
    }
}

/// Spawn `launch` and drive it to completion on the current task.
///
/// Signals queued on `control` before the spawn are delivered once the
/// child is running.
pub(crate) async fn run(
    launch: Launch,
    control_tx: &mpsc::UnboundedSender<Signal>,
    control: mpsc::UnboundedReceiver<Signal>,
) -> Result<Output> {
    let timeout = launch.timeout;
    let (session, child, sinks) = Session::spawn(launch)?;
    if let Some((after, signal)) = timeout {
        arm_timeout(after, signal, control_tx.clone());
    }
    Ok(session.run(child, sinks, control).await)
}

/// Deliver `signal` after `after`, unless the session resolves first.
fn arm_timeout(after: Duration, signal: Signal, control: mpsc::UnboundedSender<Signal>) {
    tokio::spawn(async move {
        tokio::select! {
            () = tokio::time::sleep(after) => {
                debug!(signal = signal.as_str(), "timeout elapsed");
                let _ = control.send(signal);
            }
            () = control.closed() => {}
        }
    });
}

/// Where a session's two output streams go.
struct Sinks {
    stdout: Sink,
    stderr: Sink,
}

struct Session {
    id: Uuid,
    program: String,
    debug: bool,
    state: SessionState,
}

impl Session {
    /// Created -> Spawned.
    fn spawn(launch: Launch) -> Result<(Self, Child, Sinks)> {
        let mut session = Self {
            id: Uuid::now_v7(),
            program: launch.program,
            debug: launch.debug,
            state: SessionState::Created,
        };
        let sinks = Sinks {
            stdout: launch.stdout,
            stderr: launch.stderr,
        };

        let mut cmd = ProcessCommand::new(&launch.executable);
        cmd.args(&launch.args);

        if let Some(ref dir) = launch.working_dir {
            cmd.current_dir(dir);
        }

        if launch.env_clear {
            cmd.env_clear();
        }

        for key in &launch.env_remove {
            cmd.env_remove(key);
        }

        for (key, value) in &launch.env {
            cmd.env(key, value);
        }

        cmd.process_group(0);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        if launch.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }

        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            program: session.program.clone(),
            source,
        })?;

        session.transition(SessionState::Spawned);
        if session.debug {
            debug!(session = %session.id, program = %session.program, args = ?launch.args, pid = ?child.id(), "spawned");
        }

        // Written from its own task so a child that fills its stdout pipe
        // before draining stdin cannot deadlock us.
        if let (Some(payload), Some(mut stdin)) = (launch.stdin, child.stdin.take()) {
            let id = session.id;
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&payload).await {
                    debug!(session = %id, error = %e, "failed to write stdin");
                }
                // Dropping the handle closes the child's stdin.
            });
        }

        Ok((session, child, sinks))
    }

    /// Spawned -> Running -> ExitDetected -> Reaped -> Resolved.
    async fn run(mut self, mut child: Child, sinks: Sinks, mut control: mpsc::UnboundedReceiver<Signal>) -> Output {
        let mut stdout_sink = SinkState::open(sinks.stdout).await;
        let mut stderr_sink = SinkState::open(sinks.stderr).await;
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let pid = child.id();

        let mut out_buf = vec![0u8; CHUNK_SIZE];
        let mut err_buf = vec![0u8; CHUNK_SIZE];
        let mut status: Option<Status> = None;

        self.transition(SessionState::Running);

        while stdout.is_some() || stderr.is_some() || status.is_none() {
            tokio::select! {
                read = read_chunk(&mut stdout, &mut out_buf), if stdout.is_some() => {
                    match read {
                        Ok(0) => {
                            self.trace_stream_closed("stdout");
                            stdout = None;
                        }
                        Ok(n) => self.dispatch("stdout", &mut stdout_sink, &out_buf[..n]).await,
                        Err(e) => {
                            warn!(session = %self.id, error = %e, "stdout read failed");
                            stdout = None;
                        }
                    }
                }
                read = read_chunk(&mut stderr, &mut err_buf), if stderr.is_some() => {
                    match read {
                        Ok(0) => {
                            self.trace_stream_closed("stderr");
                            stderr = None;
                        }
                        Ok(n) => self.dispatch("stderr", &mut stderr_sink, &err_buf[..n]).await,
                        Err(e) => {
                            warn!(session = %self.id, error = %e, "stderr read failed");
                            stderr = None;
                        }
                    }
                }
                exited = child.wait(), if status.is_none() => {
                    let recorded = match exited {
                        Ok(exit) => Status::from_exit_status(exit),
                        Err(e) => {
                            warn!(session = %self.id, error = %e, "failed to wait for process");
                            Status::Exited(0)
                        }
                    };
                    status = Some(recorded);
                    self.transition(SessionState::ExitDetected);
                    if self.debug {
                        debug!(session = %self.id, status = %recorded, "process exited");
                    }
                    self.stop_accepting_signals(&mut control);
                }
                Some(signal) = control.recv(), if status.is_none() => {
                    self.deliver_signal(pid, signal);
                }
            }
        }

        self.transition(SessionState::Reaped);

        let output = Output {
            status: status.unwrap_or(Status::Exited(0)),
            stdout: stdout_sink.close().await,
            stderr: stderr_sink.close().await,
        };

        self.transition(SessionState::Resolved);
        output
    }

    async fn dispatch(&self, stream: &'static str, sink: &mut SinkState, chunk: &[u8]) {
        if self.debug {
            debug!(session = %self.id, stream, bytes = chunk.len(), data = %String::from_utf8_lossy(chunk), "chunk received");
        }

        if let Err(e) = sink.deliver(chunk).await {
            warn!(session = %self.id, stream, error = %e, "output sink failed, discarding further output");
            *sink = SinkState::Disabled;
        }
    }

    /// Only called before the child is reaped, so the group id cannot have
    /// been reused.
    fn deliver_signal(&self, pid: Option<u32>, signal: Signal) {
        let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
            warn!(session = %self.id, signal = signal.as_str(), "no pid to signal");
            return;
        };

        match killpg(Pid::from_raw(pid), signal) {
            Ok(()) => debug!(session = %self.id, pid, signal = signal.as_str(), "signal delivered"),
            Err(e) => warn!(session = %self.id, pid, signal = signal.as_str(), error = %e, "failed to deliver signal"),
        }
    }

    /// Close the control channel once the child has exited, so further
    /// `signal` calls report not-running instead of being queued.
    fn stop_accepting_signals(&self, control: &mut mpsc::UnboundedReceiver<Signal>) {
        control.close();
        while let Ok(signal) = control.try_recv() {
            debug!(session = %self.id, signal = signal.as_str(), "process already exited, signal ignored");
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid session transition {:?} -> {next:?}",
            self.state
        );
        if self.debug {
            debug!(session = %self.id, program = %self.program, from = ?self.state, to = ?next, "state transition");
        } else {
            trace!(session = %self.id, from = ?self.state, to = ?next, "state transition");
        }
        self.state = next;
    }

    fn trace_stream_closed(&self, stream: &'static str) {
        if self.debug {
            debug!(session = %self.id, stream, "stream closed");
        }
    }
}

/// Read the next chunk from an optional pipe.
async fn read_chunk<R>(pipe: &mut Option<R>, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match pipe {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;
    use tokio_stream::StreamExt;

    fn sh(script: &str) -> Launch {
        Launch {
            program: "sh".to_string(),
            executable: crate::resolve::which("sh").expect("sh on PATH"),
            args: vec!["-c".to_string(), script.to_string()],
            ..Launch::default()
        }
    }

    #[test]
    fn test_state_order() {
        use SessionState::*;
        let order = [Created, Spawned, Running, ExitDetected, Reaped, Resolved];
        for pair in order.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]));
            assert!(!pair[1].can_advance_to(pair[0]));
        }
        assert!(!Resolved.can_advance_to(Resolved));
        assert!(!Running.can_advance_to(Resolved));
    }

    #[test]
    fn test_session_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}

        let (tx, rx) = mpsc::unbounded_channel();
        let mut launch = sh("true");
        launch.stdout = Sink::callback(|_| Ok(()));
        launch.stderr = Sink::writer(tokio::io::sink());
        let session = run(launch, &tx, rx);
        assert_send(&session);
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let output = start(sh("printf ok; printf err >&2")).await.unwrap();
        assert_eq!(output.status, Status::Exited(0));
        assert_eq!(output.stdout.as_deref(), Some(&b"ok"[..]));
        assert_eq!(output.stderr.as_deref(), Some(&b"err"[..]));
    }

    #[tokio::test]
    async fn test_exit_code() {
        let output = start(sh("exit 42")).await.unwrap();
        assert_eq!(output.status, Status::Exited(42));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_stdin_payload_is_written_and_closed() {
        let mut launch = sh("cat");
        launch.stdin = Some(b"from stdin".to_vec());
        let output = start(launch).await.unwrap();
        assert_eq!(output.stdout.as_deref(), Some(&b"from stdin"[..]));
    }

    #[tokio::test]
    async fn test_no_stdin_means_eof() {
        // `cat` would block forever on an open stdin.
        let output = start(sh("cat; echo done")).await.unwrap();
        assert_eq!(output.stdout_string().as_deref(), Some("done\n"));
    }

    #[tokio::test]
    async fn test_large_output_is_not_lost() {
        let mut launch = sh("cat");
        let payload: Vec<u8> = (0..200_000u32).map(|i| u8::try_from(i % 251).unwrap()).collect();
        launch.stdin = Some(payload.clone());
        let output = start(launch).await.unwrap();
        assert_eq!(output.stdout, Some(payload));
    }

    #[tokio::test]
    async fn test_signal_terminates_child() {
        // The trailing `true` keeps sh from exec'ing sleep, so sleep is a
        // grandchild holding the pipes.
        let started = Instant::now();
        let handle = start(sh("sleep 30; true"));
        assert!(handle.pid().is_some());
        handle.signal("KILL").unwrap();
        let output = handle.await.unwrap();
        assert_eq!(output.status, Status::killed_by(Signal::SIGKILL));
        assert_eq!(output.status.code(), None);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_signal_after_resolution_is_rejected() {
        let mut handle = start(sh("true"));
        let output = (&mut handle).await.unwrap();
        assert!(output.success());
        assert!(matches!(handle.signal("TERM"), Err(Error::NotRunning)));
    }

    #[tokio::test]
    async fn test_timeout_delivers_signal() {
        let started = Instant::now();
        let mut launch = sh("sleep 30; true");
        launch.timeout = Some((Duration::from_millis(100), Signal::SIGTERM));
        let output = start(launch).await.unwrap();
        assert_eq!(output.status, Status::killed_by(Signal::SIGTERM));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_signal_rejected_once_exited_while_pipes_open() {
        // The background sleep keeps stdout open after sh exits.
        let started = Instant::now();
        let handle = start(sh("sleep 2 & exit 0"));

        let mut rejected = false;
        for _ in 0..150 {
            if matches!(handle.signal("CONT"), Err(Error::NotRunning)) {
                rejected = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(rejected);
        assert!(started.elapsed() < Duration::from_millis(1800));

        let output = handle.await.unwrap();
        assert_eq!(output.status, Status::Exited(0));
    }

    #[tokio::test]
    async fn test_unnamed_signal_is_reported() {
        let output = start(sh("kill -s 34 $$")).await.unwrap();
        assert_eq!(output.status, Status::Signaled(34));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_queue_sink_streams_every_chunk() {
        let (sink, stream) = Sink::queue();
        let mut launch = sh("printf a; sleep 0.1; printf b; sleep 0.1; printf c");
        launch.stdout = sink;

        let output = start(launch).await.unwrap();
        assert_eq!(output.stdout, None);

        // Ends because the session dropped its sender on resolution.
        let chunks: Vec<Vec<u8>> = stream.collect().await;
        assert_eq!(chunks, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[tokio::test]
    async fn test_future_sink_resolves_with_first_chunk() {
        let (sink, first) = Sink::future();
        let mut launch = sh("printf first; sleep 0.1; printf second");
        launch.stdout = sink;

        let output = start(launch).await.unwrap();
        assert_eq!(output.stdout, None);
        assert_eq!(first.await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_spawn_failure_resolves_handle() {
        let launch = Launch {
            program: "missing".to_string(),
            executable: PathBuf::from("/nonexistent/definitely/missing"),
            ..Launch::default()
        };
        let err = start(launch).await.unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
        assert_eq!(err.phase(), crate::Phase::Spawn);
    }

    #[tokio::test]
    async fn test_redirected_streams_report_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let chunks_cb = Arc::clone(&chunks);

        let mut launch = sh("printf hello; printf oops >&2");
        launch.stdout = Sink::path(&path);
        launch.stderr = Sink::callback(move |chunk| {
            chunks_cb.lock().unwrap().extend_from_slice(chunk);
            Ok(())
        });

        let output = start(launch).await.unwrap();
        assert_eq!(output.stdout, None);
        assert_eq!(output.stderr, None);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        assert_eq!(*chunks.lock().unwrap(), b"oops");
    }

    #[tokio::test]
    async fn test_failing_sink_keeps_exit_status() {
        let mut launch = sh("printf data; exit 7");
        launch.stdout = Sink::callback(|_| Err(std::io::Error::other("callback exploded")));
        let output = start(launch).await.unwrap();
        assert_eq!(output.status, Status::Exited(7));
        assert_eq!(output.stdout, None);
    }

    #[tokio::test]
    async fn test_env_and_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut launch = sh("printf \"$PROCALL_TEST_VAR:\"; pwd");
        launch.env.insert("PROCALL_TEST_VAR".into(), "value".into());
        launch.working_dir = Some(dir.path().to_path_buf());

        let stdout = start(launch).await.unwrap().stdout_string().unwrap();
        assert!(stdout.starts_with("value:"));
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(PathBuf::from(stdout["value:".len()..].trim()), expected);
    }

    #[tokio::test]
    async fn test_env_clear() {
        let mut launch = sh("printf \"[$HOME]\"");
        launch.env_clear = true;
        let output = start(launch).await.unwrap();
        assert_eq!(output.stdout_string().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_debug_mode_does_not_change_output() {
        let mut launch = sh("printf a; printf b >&2; exit 3");
        launch.debug = true;
        let output = start(launch).await.unwrap();
        assert_eq!(output.status, Status::Exited(3));
        assert_eq!(output.stdout_string().as_deref(), Some("a"));
        assert_eq!(output.stderr_string().as_deref(), Some("b"));
    }
}
