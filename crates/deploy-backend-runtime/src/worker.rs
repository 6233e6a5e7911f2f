//! Running workers and their log streams.
//!
//! [`ProcessWorker`] backs a worker with a child process. Its stdout and
//! stderr are pumped line by line into a bounded channel that the caller
//! reads through a [`LogStream`]. Stopping the worker kills the process and
//! tears down the pumps, which ends the stream.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use deploy_backend_common::RuntimeError;

/// Lines buffered between the process and the reader.
const LOG_BUFFER: usize = 1024;

/// A running function instance.
#[async_trait]
pub trait Worker: Send + Sync {
    fn worker_id(&self) -> &str;

    /// Terminate the worker. Calling this more than once is a no-op.
    async fn stop(&self);

    /// Take the worker's output stream.
    ///
    /// The first call returns the live stream. Later calls return a stream
    /// that is already closed.
    fn logs(&self) -> LogStream;
}

/// Line-oriented output of a worker.
///
/// Open until the worker stops or [`LogStream::close`] is called.
#[derive(Debug)]
pub struct LogStream {
    rx: Option<mpsc::Receiver<String>>,
}

impl LogStream {
    /// Create a stream and the sender feeding it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx: Some(rx) })
    }

    /// A stream that yields nothing.
    pub fn closed() -> Self {
        Self { rx: None }
    }

    /// Wait for the next line. Returns `None` once the stream is closed.
    pub async fn next_line(&mut self) -> Option<String> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Close the stream, discarding buffered lines.
    pub fn close(&mut self) {
        self.rx = None;
    }

    pub fn is_closed(&self) -> bool {
        self.rx.as_ref().is_none_or(mpsc::Receiver::is_closed)
    }
}

/// Worker backed by a child process.
pub struct ProcessWorker {
    worker_id: String,
    child: Mutex<Option<Child>>,
    logs: Mutex<Option<LogStream>>,
    pumps: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl ProcessWorker {
    /// Spawn `command` with piped output.
    ///
    /// The process is killed if the worker is dropped without being stopped.
    pub fn spawn(worker_id: impl Into<String>, mut command: Command) -> Result<Self, RuntimeError> {
        let worker_id = worker_id.into();

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            RuntimeError::spawn_failed(format!(
                "{}: {e}",
                command.as_std().get_program().to_string_lossy()
            ))
        })?;

        let (tx, stream) = LogStream::channel(LOG_BUFFER);
        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump(stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump(stderr, tx)));
        }

        debug!(worker_id = %worker_id, pid = child.id(), "Worker process spawned");

        Ok(Self {
            worker_id,
            child: Mutex::new(Some(child)),
            logs: Mutex::new(Some(stream)),
            pumps: Mutex::new(pumps),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker for ProcessWorker {
    fn worker_id(&self) -> &str {
        &self.worker_id
    }

    async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        // Dropping the pumps drops their senders, which ends the stream.
        for pump in self.pumps.lock().drain(..) {
            pump.abort();
        }

        let child = self.child.lock().take();
        if let Some(mut child) = child {
            if let Err(e) = child.kill().await {
                debug!(worker_id = %self.worker_id, error = %e, "Worker process already gone");
            }
        }

        info!(worker_id = %self.worker_id, "worker stopped");
    }

    fn logs(&self) -> LogStream {
        self.logs.lock().take().unwrap_or_else(LogStream::closed)
    }
}

impl std::fmt::Debug for ProcessWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessWorker")
            .field("worker_id", &self.worker_id)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

async fn pump<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
            break;
        }
    }
}
