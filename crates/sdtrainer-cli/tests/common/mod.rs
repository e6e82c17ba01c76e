//! Common test utilities for CLI testing.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::{tempdir, TempDir};

/// Test context with a temporary data directory
pub struct TestContext {
    pub temp_dir: TempDir,
    pub data_dir: PathBuf,
}

impl TestContext {
    pub fn new() -> Self {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let data_dir = temp_dir.path().join("data");
        Self { temp_dir, data_dir }
    }

    /// Get path to temp directory
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a command configured for this context
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("sdtrainer").expect("Binary not found");
        cmd.current_dir(self.path())
            .env("SDTRAINER_DATA_DIR", &self.data_dir)
            .env_remove("SDTRAINER_PROJECT")
            .env_remove("SDTRAINER_REMOTE")
            .env_remove("SDTRAINER_LOG_LEVEL")
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1");
        cmd
    }

    /// Create a 64x64 project named `demo` and return its directory
    pub fn create_project(&self) -> PathBuf {
        self.command()
            .args(["project", "new", "demo", "--width", "64", "--height", "64", "--path"])
            .arg(self.path())
            .assert()
            .success();
        self.path().join("demo")
    }
}
