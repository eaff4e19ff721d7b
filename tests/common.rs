#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    process::{Command, Output},
};

use tempfile::TempDir;

/// Runs the built binary with an isolated home so no user config is picked up.
pub struct CliHarness {
    home: TempDir,
}

impl CliHarness {
    pub fn new() -> Self {
        Self {
            home: tempfile::tempdir().expect("Failed to create temp home"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.home.path().join(name)
    }

    pub fn write_config(&self, json: &str) -> PathBuf {
        let path = self.path("config.json");
        std::fs::write(&path, json).expect("Failed to write config");
        path
    }

    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_clipbridge"))
            .args(args)
            .env("HOME", self.home.path())
            .env("XDG_CONFIG_HOME", self.home.path())
            .env("XDG_RUNTIME_DIR", self.home.path())
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to spawn clipbridge")
    }

    pub fn run_with_config(&self, config: &Path, args: &[&str]) -> Output {
        let config = config.to_str().expect("non-UTF-8 temp path");
        let mut full = vec!["--config", config];
        full.extend_from_slice(args);
        self.run(&full)
    }
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
