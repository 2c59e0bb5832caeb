#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// 一時ディレクトリに作るモノレポ
pub struct TestRepo {
    pub root: TempDir,
    config_home: TempDir,
}

impl TestRepo {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join(".git")).unwrap();
        Self {
            root,
            config_home: tempfile::tempdir().unwrap(),
        }
    }

    pub fn add_app(&self, name: &str) -> &Self {
        let dir = self.root.path().join("apps").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("Dockerfile"),
            format!("FROM alpine:latest\nCMD [\"echo\", \"{}\"]\n", name),
        )
        .unwrap();
        self
    }

    #[allow(dead_code)]
    pub fn write(&self, rel: &str, content: &str) {
        let path = self.root.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    #[allow(dead_code)]
    pub fn file(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    /// 利用者の環境に左右されない `dockyard` コマンド
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("dockyard").unwrap();
        cmd.current_dir(self.root.path())
            .env("DOCKYARD_ROOT", self.root.path())
            .env("XDG_CONFIG_HOME", self.config_home.path())
            .env("DOCKER_CONFIG", self.config_home.path().join("docker"))
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .env_remove("DOCKYARD_OWNER")
            .env_remove("DOCKYARD_REGISTRY")
            .env_remove("DOCKYARD_REPO_NAME")
            .env_remove("GITHUB_REPOSITORY_OWNER")
            .env_remove("GITHUB_REPOSITORY")
            .env_remove("GITHUB_EVENT_NAME")
            .env_remove("GITHUB_REF")
            .env_remove("GITHUB_REF_NAME")
            .env_remove("GITHUB_REF_TYPE")
            .env_remove("GITHUB_SHA")
            .env_remove("GITHUB_BASE_REF");
        cmd
    }
}

#[allow(dead_code)]
pub fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}
