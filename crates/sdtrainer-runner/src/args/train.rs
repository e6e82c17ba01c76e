//! Training launch: `train_network.py` through `accelerate`, in a terminal window.
//!
//! Training is not supervised. It runs in its own terminal so its console
//! output stays visible, and reports back through the callback server.

use crate::command::ScriptCommand;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub const TRAIN_SCRIPT: &str = "train_network.py";
const ACCELERATE_LAUNCH: &str = "accelerate.commands.launch";
const ACCELERATE_CONFIG: &str = "accelerate.commands.config.config";

/// Platform conventions for opening a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalPlatform {
    Windows,
    MacOs,
    Linux,
}

impl TerminalPlatform {
    pub fn current() -> Self {
        if cfg!(windows) {
            TerminalPlatform::Windows
        } else if cfg!(target_os = "macos") {
            TerminalPlatform::MacOs
        } else {
            TerminalPlatform::Linux
        }
    }

    /// The terminal launcher binary.
    pub fn launcher(&self) -> &'static str {
        match self {
            TerminalPlatform::Windows => "wt",
            TerminalPlatform::MacOs => "osascript",
            TerminalPlatform::Linux => "x-terminal-emulator",
        }
    }
}

/// What to train and where to put it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub output_name: String,
    pub output_dir: PathBuf,
    /// `train_network.py` options; strings and numbers become `--key value`,
    /// `true` becomes a bare `--key`. Other values are ignored.
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// A fully resolved training launch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainCommand {
    pub command: String,
    pub args: Vec<String>,
    /// Working directory: the trainer repo.
    pub python_exec: PathBuf,
    pub training_args: Vec<String>,
    pub bin_path: PathBuf,
    pub arg_object: Map<String, Value>,
}

fn win_quote(platform: TerminalPlatform, value: &str) -> String {
    match platform {
        TerminalPlatform::Windows => format!("\"{value}\""),
        _ => value.to_string(),
    }
}

/// `train_network.py` and its options, plus the options as a flat map for display.
pub fn training_args(
    config: &TrainingConfig,
    callback_url: &str,
    platform: TerminalPlatform,
) -> (Vec<String>, Map<String, Value>) {
    let output_dir = config.output_dir.display().to_string();
    let mut args = vec![
        TRAIN_SCRIPT.to_string(),
        "--output_dir".to_string(),
        win_quote(platform, &output_dir),
        "--output_name".to_string(),
        win_quote(platform, &config.output_name),
        "--training_comment".to_string(),
        win_quote(platform, &config.output_name),
        "--callback_url".to_string(),
        callback_url.to_string(),
    ];
    let mut arg_object = Map::new();
    for (key, value) in &config.params {
        let flag = format!("--{key}");
        match value {
            Value::String(s) => {
                args.push(flag.clone());
                args.push(match platform {
                    TerminalPlatform::Windows if key == "network_args" => s.clone(),
                    TerminalPlatform::Windows if s.contains(' ') => format!("'{s}'"),
                    TerminalPlatform::Windows => format!("\"{s}\""),
                    _ => s.clone(),
                });
            }
            Value::Number(n) => {
                args.push(flag.clone());
                args.push(n.to_string());
            }
            Value::Bool(true) => args.push(flag.clone()),
            Value::Bool(false) => {}
            _ => continue,
        }
        arg_object.insert(flag, value.clone());
    }
    (args, arg_object)
}

/// Quote for a POSIX shell line when needed.
fn sh_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Wrap `python -m <module> <module_args>` in a terminal launcher for `platform`.
fn terminal_args(
    platform: TerminalPlatform,
    repo: &Path,
    python: &Path,
    module: &str,
    module_args: &[String],
) -> Vec<String> {
    match platform {
        TerminalPlatform::Windows => {
            let mut args = vec![
                "-d".to_string(),
                repo.display().to_string(),
                "cmd.exe".to_string(),
                "/c".to_string(),
                "start".to_string(),
                python.display().to_string(),
                "-m".to_string(),
                module.to_string(),
            ];
            args.extend(module_args.iter().cloned());
            args
        }
        TerminalPlatform::MacOs | TerminalPlatform::Linux => {
            let mut line = format!(
                "cd {} && {} -m {}",
                sh_quote(&repo.display().to_string()),
                sh_quote(&python.display().to_string()),
                module
            );
            for arg in module_args {
                line.push(' ');
                line.push_str(&sh_quote(arg));
            }
            if platform == TerminalPlatform::MacOs {
                let escaped = line.replace('\\', "\\\\").replace('"', "\\\"");
                vec![
                    "-e".to_string(),
                    format!("tell application \"Terminal\" to do script \"{escaped}\""),
                ]
            } else {
                vec!["-e".to_string(), "sh".to_string(), "-c".to_string(), line]
            }
        }
    }
}

impl TrainCommand {
    /// Resolve the launch for `config` with the trainer repo at `repo`.
    pub fn build(
        config: &TrainingConfig,
        repo: &Path,
        python: &Path,
        callback_url: &str,
        platform: TerminalPlatform,
    ) -> Self {
        let (training_args, arg_object) = training_args(config, callback_url, platform);
        let args = terminal_args(platform, repo, python, ACCELERATE_LAUNCH, &training_args);
        Self {
            command: platform.launcher().to_string(),
            args,
            python_exec: repo.to_path_buf(),
            training_args,
            bin_path: python.to_path_buf(),
            arg_object,
        }
    }

    /// `accelerate config` in a terminal, for first-time setup of the trainer repo.
    pub fn accelerate_config(repo: &Path, python: &Path, platform: TerminalPlatform) -> Self {
        Self {
            command: platform.launcher().to_string(),
            args: terminal_args(platform, repo, python, ACCELERATE_CONFIG, &[]),
            python_exec: repo.to_path_buf(),
            training_args: Vec::new(),
            bin_path: python.to_path_buf(),
            arg_object: Map::new(),
        }
    }

    pub fn to_script_command(&self) -> ScriptCommand {
        ScriptCommand::new(&self.command)
            .args(self.args.iter().cloned())
            .current_dir(&self.python_exec)
    }
}
