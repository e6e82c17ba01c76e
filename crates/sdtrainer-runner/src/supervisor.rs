//! Single-slot supervision of script processes.
//!
//! Each [`TaskSupervisor`] owns one slot. Starting a task while the slot is
//! busy fails with [`SupervisorError::AlreadyRunning`] and leaves the running
//! process alone. Interrupting signals the whole process tree and frees the
//! slot even when signalling fails, so a wedged script never blocks the kind
//! forever.

use crate::command::ScriptCommand;
use crate::error::{RunnerError, RunnerResult, SupervisorError};
use crate::kill::{kill_process_tree, KillSignal};
use crate::kind::TaskKind;
use crate::protocol::{parse_line, ScriptEvent};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// How long output readers may run after the process exits.
///
/// Grandchildren can keep the pipes open after the script itself is gone.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Signals a process tree; [`kill_process_tree`] outside of tests.
type KillFn = fn(u32, KillSignal) -> Pin<Box<dyn Future<Output = RunnerResult<()>> + Send>>;

fn signal_tree(pid: u32, signal: KillSignal) -> Pin<Box<dyn Future<Output = RunnerResult<()>> + Send>> {
    Box::pin(kill_process_tree(pid, signal))
}

/// Observable state of a supervisor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Idle,
    Running,
    Cancelling,
}

#[derive(Debug)]
enum Slot {
    Idle,
    Running {
        pid: u32,
        generation: u64,
        interrupted: Arc<AtomicBool>,
    },
    Cancelling {
        generation: u64,
    },
}

/// How a supervised process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskExit {
    pub kind: TaskKind,
    /// `None` when the process was ended by a signal.
    pub code: Option<i32>,
    pub interrupted: bool,
    pub timed_out: bool,
}

impl TaskExit {
    pub fn success(&self) -> bool {
        self.code == Some(0) && !self.interrupted && !self.timed_out
    }
}

/// Output of a running task, in the order it was produced per stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskMessage {
    Event(ScriptEvent),
    Stderr(String),
    /// Always the last message.
    Exit(TaskExit),
}

/// Handle to one started task.
#[derive(Debug)]
pub struct TaskRun {
    pub kind: TaskKind,
    pub pid: u32,
    rx: mpsc::UnboundedReceiver<TaskMessage>,
}

impl TaskRun {
    /// The next message, or `None` after [`TaskMessage::Exit`] was delivered.
    pub async fn next(&mut self) -> Option<TaskMessage> {
        self.rx.recv().await
    }

    /// Discard remaining output and wait for the exit.
    pub async fn wait(mut self) -> Option<TaskExit> {
        while let Some(message) = self.rx.recv().await {
            if let TaskMessage::Exit(exit) = message {
                return Some(exit);
            }
        }
        None
    }

    /// Collect every stdout event and the exit.
    pub async fn collect(mut self) -> (Vec<ScriptEvent>, Option<TaskExit>) {
        let mut events = Vec::new();
        while let Some(message) = self.rx.recv().await {
            match message {
                TaskMessage::Event(event) => events.push(event),
                TaskMessage::Stderr(_) => {}
                TaskMessage::Exit(exit) => return (events, Some(exit)),
            }
        }
        (events, None)
    }
}

#[derive(Debug)]
struct Inner {
    slot: Mutex<Slot>,
    generation: AtomicU64,
    kill: KillFn,
}

/// Runs at most one process of its kind at a time.
#[derive(Debug, Clone)]
pub struct TaskSupervisor {
    kind: TaskKind,
    inner: Arc<Inner>,
}

impl TaskSupervisor {
    pub fn new(kind: TaskKind) -> Self {
        Self::with_kill(kind, signal_tree)
    }

    fn with_kill(kind: TaskKind, kill: KillFn) -> Self {
        Self {
            kind,
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot::Idle),
                generation: AtomicU64::new(0),
                kill,
            }),
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn state(&self) -> TaskState {
        match *self.inner.slot.lock() {
            Slot::Idle => TaskState::Idle,
            Slot::Running { .. } => TaskState::Running,
            Slot::Cancelling { .. } => TaskState::Cancelling,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() != TaskState::Idle
    }

    /// Spawn `command` into the slot.
    ///
    /// Must be called from within a tokio runtime; output is pumped by a
    /// spawned monitor task.
    pub fn start(&self, command: &ScriptCommand) -> Result<TaskRun, SupervisorError> {
        let mut slot = self.inner.slot.lock();
        if !matches!(*slot, Slot::Idle) {
            debug!(kind = %self.kind, "rejecting start, slot busy");
            return Err(SupervisorError::AlreadyRunning { kind: self.kind });
        }

        info!(kind = %self.kind, "will run command {}", command.display());
        let mut child = command.to_command().spawn().map_err(|source| RunnerError::Spawn {
            program: command.program.clone(),
            source,
        })?;
        let pid = child.id().unwrap_or_default();
        let stdout = child
            .stdout
            .take()
            .ok_or(RunnerError::MissingPipe { stream: "stdout" })?;
        let stderr = child
            .stderr
            .take()
            .ok_or(RunnerError::MissingPipe { stream: "stderr" })?;

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let interrupted = Arc::new(AtomicBool::new(false));
        *slot = Slot::Running {
            pid,
            generation,
            interrupted: interrupted.clone(),
        };
        drop(slot);

        let (tx, rx) = mpsc::unbounded_channel();
        let monitor = Monitor {
            supervisor: self.clone(),
            generation,
            pid,
            interrupted,
            timeout: command.timeout,
        };
        tokio::spawn(monitor.run(child, stdout, stderr, tx));

        Ok(TaskRun {
            kind: self.kind,
            pid,
            rx,
        })
    }

    /// Signal the running process tree and free the slot.
    ///
    /// Returns `Ok(false)` when nothing was running. The slot is idle
    /// afterwards even if signalling failed; the error is still returned.
    pub async fn interrupt(&self) -> Result<bool, SupervisorError> {
        let (pid, generation) = {
            let mut slot = self.inner.slot.lock();
            match &*slot {
                Slot::Running {
                    pid,
                    generation,
                    interrupted,
                } => {
                    interrupted.store(true, Ordering::SeqCst);
                    let running = (*pid, *generation);
                    *slot = Slot::Cancelling {
                        generation: running.1,
                    };
                    running
                }
                Slot::Idle | Slot::Cancelling { .. } => return Ok(false),
            }
        };

        let signal = if self.kind.kill_hard() {
            KillSignal::Kill
        } else {
            KillSignal::Interrupt
        };
        info!(kind = %self.kind, pid, ?signal, "interrupting task");
        let result = (self.inner.kill)(pid, signal).await;
        if let Err(e) = &result {
            warn!(kind = %self.kind, pid, error = %e, "failed to signal task, freeing slot anyway");
        }
        self.release(generation);
        result.map(|()| true).map_err(SupervisorError::from)
    }

    /// Free the slot if it still belongs to `generation`.
    fn release(&self, generation: u64) {
        let mut slot = self.inner.slot.lock();
        let owned = match &*slot {
            Slot::Running { generation: g, .. } | Slot::Cancelling { generation: g } => *g == generation,
            Slot::Idle => false,
        };
        if owned {
            *slot = Slot::Idle;
        }
    }
}

struct Monitor {
    supervisor: TaskSupervisor,
    generation: u64,
    pid: u32,
    interrupted: Arc<AtomicBool>,
    timeout: Option<Duration>,
}

impl Monitor {
    async fn run(
        self,
        mut child: Child,
        stdout: impl AsyncRead + Unpin + Send + 'static,
        stderr: impl AsyncRead + Unpin + Send + 'static,
        tx: mpsc::UnboundedSender<TaskMessage>,
    ) {
        let kind = self.supervisor.kind;
        let mut readers = tokio::spawn(pump(kind, stdout, stderr, tx.clone()));

        let mut timed_out = false;
        let status = match self.timeout {
            None => child.wait().await,
            Some(duration) => {
                let finished = tokio::select! {
                    status = child.wait() => Some(status),
                    _ = sleep(duration) => None,
                };
                match finished {
                    Some(status) => status,
                    None => {
                        warn!(kind = %kind, "Task timed out after {:?}", duration);
                        timed_out = true;
                        if let Err(e) = (self.supervisor.inner.kill)(self.pid, KillSignal::Kill).await {
                            warn!(kind = %kind, error = %e, "failed to kill timed out task");
                        }
                        child.wait().await
                    }
                }
            }
        };

        if tokio::time::timeout(DRAIN_TIMEOUT, &mut readers).await.is_err() {
            debug!(kind = %kind, "output still open after exit, detaching readers");
            readers.abort();
        }

        let code = match &status {
            Ok(status) => status.code(),
            Err(e) => {
                warn!(kind = %kind, error = %e, "failed to wait for task");
                None
            }
        };
        let exit = TaskExit {
            kind,
            code,
            interrupted: self.interrupted.load(Ordering::SeqCst),
            timed_out,
        };
        info!(kind = %kind, code = ?exit.code, interrupted = exit.interrupted, "task exited");
        self.supervisor.release(self.generation);
        let _ = tx.send(TaskMessage::Exit(exit));
    }
}

/// Forward stdout lines as parsed events and stderr lines verbatim.
async fn pump(
    kind: TaskKind,
    stdout: impl AsyncRead + Unpin,
    stderr: impl AsyncRead + Unpin,
    tx: mpsc::UnboundedSender<TaskMessage>,
) {
    let out_tx = tx.clone();
    let out = async move {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        while let Some(line) = next_lossy_line(kind, &mut reader, &mut buf).await {
            if line.trim().is_empty() {
                continue;
            }
            info!(kind = %kind, "{}", line);
            let _ = out_tx.send(TaskMessage::Event(parse_line(kind, &line)));
        }
    };
    let err = async move {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        while let Some(line) = next_lossy_line(kind, &mut reader, &mut buf).await {
            warn!(kind = %kind, "{}", line);
            let _ = tx.send(TaskMessage::Stderr(line));
        }
    };
    tokio::join!(out, err);
}

/// Next line without its `\n` or `\r\n`, invalid UTF-8 replaced. `None` at EOF or on a read error.
async fn next_lossy_line(
    kind: TaskKind,
    reader: &mut (impl AsyncBufRead + Unpin),
    buf: &mut Vec<u8>,
) -> Option<String> {
    buf.clear();
    match reader.read_until(b'\n', buf).await {
        Ok(0) => None,
        Ok(_) => {
            if buf.ends_with(b"\n") {
                buf.pop();
                if buf.ends_with(b"\r") {
                    buf.pop();
                }
            }
            Some(String::from_utf8_lossy(buf).into_owned())
        }
        Err(e) => {
            warn!(kind = %kind, error = %e, "failed to read task output");
            None
        }
    }
}
