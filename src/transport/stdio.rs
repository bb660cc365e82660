// ! STDIO transport implementation for MCP
// !
// ! Module spawns an MCP server as a child process and speaks newline-delimited
// ! JSON over its stdin/stdout. Stderr is surfaced as log lines and process
// ! exit ends the connection.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};

use crate::core::error::{McpError, McpResult};
use crate::transport::framing::LineFramer;
use crate::transport::traits::{
    DisconnectReason, EventReceiver, EventSender, Transport, TransportEvent, TransportKind,
};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// How long to wait for stdout and stderr to drain once the process has exited
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a process that closed its stdout gets to exit before it is killed
const STDOUT_CLOSED_GRACE: Duration = Duration::from_millis(500);

/// STDIO transport for MCP clients
///
/// Each call to [`Transport::open`] spawns a fresh process.
#[derive(Debug)]
pub struct StdioClientTransport {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
    shutdown_grace: Duration,
    stdin_writer: Mutex<Option<BufWriter<ChildStdin>>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
}

impl StdioClientTransport {
    /// Create a new STDIO client transport
    ///
    /// # Arguments
    /// * `command` - Command to execute for the MCP server
    /// * `args` - Arguments to pass to the command
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: HashMap::new(),
            cwd: None,
            shutdown_grace: Duration::from_secs(5),
            stdin_writer: Mutex::new(None),
            shutdown: Mutex::new(None),
            supervisor: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Variables layered over the inherited environment
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Working directory for the child process
    pub fn with_cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    /// How long `close` waits for the child to exit before killing it
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    fn spawn_child(&self) -> McpResult<Child> {
        tracing::debug!("Starting MCP server: {} {:?}", self.command, self.args);

        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        command
            .spawn()
            .map_err(|e| McpError::connection(format!("Failed to start server process: {e}")))
    }

    async fn read_stdout(stdout: ChildStdout, events: EventSender) -> DisconnectReason {
        let mut reader = stdout;
        let mut framer = LineFramer::new();
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => {
                    tracing::debug!("STDIO reader reached EOF");
                    if let Some(message) = framer.finish() {
                        let _ = events.send(TransportEvent::Message(message));
                    }
                    return DisconnectReason::StreamEnded;
                }
                Ok(n) => {
                    for message in framer.push(&chunk[..n]) {
                        if events.send(TransportEvent::Message(message)).is_err() {
                            tracing::debug!("Event receiver dropped");
                            return DisconnectReason::Closed;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Error reading from stdout: {}", e);
                    return DisconnectReason::StreamError(format!("Failed to read stdout: {e}"));
                }
            }
        }
    }

    async fn read_stderr(stderr: tokio::process::ChildStderr, events: EventSender) {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let event = TransportEvent::Log {
                        source: "stderr".to_string(),
                        line,
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("Error reading from stderr: {}", e);
                    break;
                }
            }
        }
    }

    async fn supervise(
        mut child: Child,
        readers: (JoinHandle<DisconnectReason>, JoinHandle<()>),
        mut shutdown: oneshot::Receiver<()>,
        grace: Duration,
        connected: Arc<AtomicBool>,
        events: EventSender,
    ) {
        let (mut stdout_reader, stderr_reader) = readers;
        let mut exit = None;
        let mut stream_end = None;
        let requested = tokio::select! {
            biased;
            _ = &mut shutdown => true,
            status = child.wait() => {
                exit = Some(status);
                false
            }
            ended = &mut stdout_reader => {
                stream_end = Some(ended.unwrap_or_else(|e| {
                    DisconnectReason::StreamError(format!("stdout reader failed: {e}"))
                }));
                false
            }
        };

        if requested {
            match timeout(grace, child.wait()).await {
                Ok(status) => exit = Some(status),
                Err(_) => {
                    tracing::warn!("Timeout waiting for server process, killing it");
                    let _ = child.kill().await;
                    exit = Some(child.wait().await);
                }
            }
        } else if stream_end.is_some() {
            // A process that is exiting closes stdout first; anything else
            // left running without a protocol stream is killed.
            match timeout(STDOUT_CLOSED_GRACE, child.wait()).await {
                Ok(status) => exit = Some(status),
                Err(_) => {
                    tracing::warn!("Server closed stdout but kept running, killing it");
                    let _ = child.kill().await;
                    let _ = child.wait().await;
                }
            }
        }
        connected.store(false, Ordering::SeqCst);

        // Deliver everything the process wrote before announcing the close
        let stdout_pending = stream_end.is_none();
        let drained = async move {
            if stdout_pending {
                let _ = stdout_reader.await;
            }
            let _ = stderr_reader.await;
        };
        if timeout(OUTPUT_DRAIN_TIMEOUT, drained).await.is_err() {
            tracing::debug!("Server output still open after exit");
        }

        let reason = match exit {
            _ if requested => DisconnectReason::Closed,
            Some(Ok(status)) => {
                tracing::info!("Server process exited with status: {}", status);
                DisconnectReason::ProcessExited {
                    code: status.code(),
                    signal: exit_signal(&status),
                }
            }
            Some(Err(e)) => DisconnectReason::StreamError(format!(
                "Error waiting for server process: {e}"
            )),
            None => stream_end.unwrap_or(DisconnectReason::StreamEnded),
        };
        let _ = events.send(TransportEvent::Closed(reason));
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

#[async_trait]
impl Transport for StdioClientTransport {
    async fn open(&self) -> McpResult<EventReceiver> {
        let mut child = self.spawn_child()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::connection("Failed to get stdin handle"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::connection("Failed to get stdout handle"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| McpError::connection("Failed to get stderr handle"))?;

        let (events, receiver) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let stdout_reader = tokio::spawn(Self::read_stdout(stdout, events.clone()));
        let stderr_reader = tokio::spawn(Self::read_stderr(stderr, events.clone()));

        self.connected.store(true, Ordering::SeqCst);
        let supervisor = tokio::spawn(Self::supervise(
            child,
            (stdout_reader, stderr_reader),
            shutdown_rx,
            self.shutdown_grace,
            self.connected.clone(),
            events,
        ));

        *self.stdin_writer.lock().await = Some(BufWriter::new(stdin));
        *self.shutdown.lock().await = Some(shutdown_tx);
        *self.supervisor.lock().await = Some(supervisor);

        Ok(receiver)
    }

    async fn send(&self, frame: &str) -> McpResult<()> {
        let mut guard = self.stdin_writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| McpError::transport("Transport not connected"))?;

        tracing::trace!("Sending: {}", frame);

        writer
            .write_all(frame.as_bytes())
            .await
            .map_err(|e| McpError::transport(format!("Failed to write message: {e}")))?;
        writer
            .write_all(b"\n")
            .await
            .map_err(|e| McpError::transport(format!("Failed to write newline: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| McpError::transport(format!("Failed to flush: {e}")))?;

        Ok(())
    }

    async fn close(&self) -> McpResult<()> {
        tracing::debug!("Closing STDIO transport");

        // Signal the supervisor first so the exit that follows is reported
        // as a requested close
        if let Some(shutdown) = self.shutdown.lock().await.take() {
            let _ = shutdown.send(());
        }
        // Closing stdin asks the server to shut down
        if let Some(mut writer) = self.stdin_writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        if let Some(supervisor) = self.supervisor.lock().await.take() {
            if let Err(e) = supervisor.await {
                tracing::warn!("STDIO supervisor task failed: {}", e);
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connection_info(&self) -> String {
        format!(
            "STDIO transport ({} {}, connected: {})",
            self.command,
            self.args.join(" "),
            self.is_connected()
        )
    }
}
