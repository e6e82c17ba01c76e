//! The trainer repo's own setup script (virtualenv, pip requirements).

use super::train::TerminalPlatform;
use crate::command::ScriptCommand;
use std::path::{Path, PathBuf};

/// A setup run for a freshly cloned trainer repo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupScript {
    pub platform: TerminalPlatform,
    /// Install from CN package mirrors.
    pub use_cn: bool,
    /// Install into this standalone Python instead of a new virtualenv.
    pub trainer_python: Option<PathBuf>,
}

impl SetupScript {
    pub fn script_name(&self) -> &'static str {
        match (self.platform, self.use_cn) {
            (TerminalPlatform::Windows, true) => "setup_cn.bat",
            (TerminalPlatform::Windows, false) => "setup.bat",
            (_, true) => "setup_cn.sh",
            (_, false) => "setup.sh",
        }
    }

    /// The command to run from `repo`.
    pub fn command(&self, repo: &Path) -> ScriptCommand {
        let script = self.script_name();
        let mut cmd = match self.platform {
            TerminalPlatform::Windows => ScriptCommand::new("cmd").args(["/c".to_string(), format!(".\\{script}")]),
            _ => ScriptCommand::new("bash").arg(script),
        };
        if let Some(python) = &self.trainer_python {
            let bin = match self.platform {
                TerminalPlatform::Windows => python.join("python.exe"),
                _ => python.join("python"),
            };
            cmd = cmd
                .env("PYTHON", bin.display().to_string())
                .env("PYH", python.display().to_string())
                .env("SKIP_VENV", "1");
        }
        cmd.current_dir(repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_selection() {
        let mut setup = SetupScript {
            platform: TerminalPlatform::Linux,
            use_cn: false,
            trainer_python: None,
        };
        assert_eq!(setup.script_name(), "setup.sh");
        setup.use_cn = true;
        assert_eq!(setup.script_name(), "setup_cn.sh");
        setup.platform = TerminalPlatform::Windows;
        assert_eq!(setup.script_name(), "setup_cn.bat");

        let cmd = setup.command(Path::new("C:/repo"));
        assert_eq!(cmd.program, PathBuf::from("cmd"));
        assert_eq!(cmd.args, vec!["/c", ".\\setup_cn.bat"]);
        assert!(cmd.env.is_empty());
    }

    #[test]
    fn test_standalone_python_skips_venv() {
        let setup = SetupScript {
            platform: TerminalPlatform::Linux,
            use_cn: false,
            trainer_python: Some("/opt/py".into()),
        };
        let cmd = setup.command(Path::new("/repo"));
        assert_eq!(cmd.program, PathBuf::from("bash"));
        assert_eq!(cmd.env["PYTHON"], "/opt/py/python");
        assert_eq!(cmd.env["PYH"], "/opt/py");
        assert_eq!(cmd.env["SKIP_VENV"], "1");
        assert_eq!(cmd.cwd.as_deref(), Some(Path::new("/repo")));
    }
}
