//! Process tree termination.

use crate::error::{RunnerError, RunnerResult};
use tracing::debug;

/// Signal sent to a process tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSignal {
    /// Ask the scripts to stop (Python raises `KeyboardInterrupt`).
    Interrupt,
    Kill,
}

/// Signal the process group led by `pid`.
///
/// The child was spawned as its own group leader, so the negative pid reaches
/// every descendant. A group that already exited is not an error.
#[cfg(unix)]
pub async fn kill_process_tree(pid: u32, signal: KillSignal) -> RunnerResult<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(-(pid as i32));
    let sig = match signal {
        KillSignal::Interrupt => Signal::SIGINT,
        KillSignal::Kill => Signal::SIGKILL,
    };
    debug!("Sending {:?} to process group {}", sig, pid);
    match kill(pgid, sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(RunnerError::Kill {
            pid,
            message: e.to_string(),
        }),
    }
}

/// Terminate `pid` and its children with `taskkill`.
///
/// Windows has no SIGINT for detached consoles, so both signals force the kill.
#[cfg(windows)]
pub async fn kill_process_tree(pid: u32, signal: KillSignal) -> RunnerResult<()> {
    debug!("Running taskkill for process tree {} ({:?})", pid, signal);
    let output = tokio::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output()
        .await?;
    if output.status.success() {
        Ok(())
    } else {
        Err(RunnerError::Kill {
            pid,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
