//! Script command construction.

use crate::error::{RunnerError, RunnerResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// A script invocation: program, arguments, working directory, and environment overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Variables set on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Kill the process tree when it runs longer than this.
    pub timeout: Option<Duration>,
}

impl ScriptCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    /// `python -u <script>`, unbuffered so events arrive as they are printed.
    pub fn python(python: impl Into<PathBuf>, script: impl AsRef<Path>) -> Self {
        Self::new(python)
            .arg("-u")
            .arg(script.as_ref().display().to_string())
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env.extend(vars);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Human readable command line for logs and previews.
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Build the tokio command: null stdin, piped output, own process group on unix.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        #[cfg(unix)]
        {
            // New process group so the whole tree can be signalled at once
            unsafe {
                cmd.pre_exec(|| {
                    libc::setpgid(0, 0);
                    Ok(())
                });
            }
        }

        cmd
    }
}

/// Relative location of the interpreter inside a repo virtualenv.
pub fn venv_python_bin() -> &'static str {
    if cfg!(windows) {
        "venv/Scripts/python.exe"
    } else {
        "venv/bin/python"
    }
}

/// The interpreter for scripts in `repo`.
///
/// A standalone trainer python directory wins over the repo virtualenv.
pub fn resolve_python(repo: &Path, trainer_python: Option<&Path>) -> PathBuf {
    match trainer_python {
        Some(dir) if cfg!(windows) => dir.join("python.exe"),
        Some(dir) => dir.join("python"),
        None => repo.join(venv_python_bin()),
    }
}

/// The script repo, or `NotConfigured` when it is unset.
pub fn require_repo(repo: Option<PathBuf>, what: &str) -> RunnerResult<PathBuf> {
    repo.ok_or_else(|| RunnerError::NotConfigured {
        what: what.to_string(),
    })
}
