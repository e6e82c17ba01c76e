//! Kinds of supervised script tasks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One kind of long-running script. At most one task per kind runs at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Preprocess,
    Caption,
    Segment,
    Generate,
    Doctor,
    Install,
}

impl TaskKind {
    pub const ALL: [TaskKind; 6] = [
        TaskKind::Preprocess,
        TaskKind::Caption,
        TaskKind::Segment,
        TaskKind::Generate,
        TaskKind::Doctor,
        TaskKind::Install,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Preprocess => "preprocess",
            TaskKind::Caption => "caption",
            TaskKind::Segment => "segment",
            TaskKind::Generate => "generate",
            TaskKind::Doctor => "doctor",
            TaskKind::Install => "install",
        }
    }

    /// Installer scripts run pip and shell children that ignore SIGINT.
    pub fn kill_hard(&self) -> bool {
        matches!(self, TaskKind::Install)
    }

    /// Python scripts of this kind print one JSON event per line.
    pub fn speaks_json(&self) -> bool {
        !matches!(self, TaskKind::Install)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
