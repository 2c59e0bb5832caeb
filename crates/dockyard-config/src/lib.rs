//! Dockyard の設定
//!
//! 設定は以下の順で重ね合わせる（後が優先）:
//! 1. 組み込みのデフォルト
//! 2. GitHub Actions の環境変数（`GITHUB_REPOSITORY_OWNER`, `GITHUB_REPOSITORY`）
//! 3. グローバル設定 `~/.config/dockyard/config.yaml`
//! 4. リポジトリ設定 `<repo>/dockyard.yaml`
//! 5. `DOCKYARD_*` 環境変数
//!
//! CLI フラグによる上書きは呼び出し側で行う。

pub mod error;

pub use error::*;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE: &str = "dockyard.yaml";

const DEFAULT_APPS_DIR: &str = "apps";
const DEFAULT_SHARED_DIR: &str = "shared";
const DEFAULT_DESCRIPTOR: &str = "Dockerfile";
const DEFAULT_REGISTRY: &str = "ghcr.io";

/// 設定ファイルの内容（すべて省略可能）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct FileConfig {
    apps_dir: Option<String>,
    shared_dirs: Option<Vec<String>>,
    descriptor: Option<String>,
    registry: Option<String>,
    owner: Option<String>,
    repo_name: Option<String>,
}

/// 解決済みの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub repo_root: PathBuf,
    /// アプリを置くディレクトリ（リポジトリルートからの相対パス）
    pub apps_dir: String,
    /// 変更時に全アプリを再ビルドするディレクトリ
    pub shared_dirs: Vec<String>,
    /// アプリと判定するためのビルド定義ファイル名
    pub descriptor: String,
    pub registry: String,
    pub owner: Option<String>,
    pub repo_name: String,
}

impl Settings {
    fn defaults(repo_root: &Path) -> Self {
        let repo_name = repo_root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("app")
            .to_lowercase();

        Self {
            repo_root: repo_root.to_path_buf(),
            apps_dir: DEFAULT_APPS_DIR.to_string(),
            shared_dirs: vec![DEFAULT_SHARED_DIR.to_string()],
            descriptor: DEFAULT_DESCRIPTOR.to_string(),
            registry: DEFAULT_REGISTRY.to_string(),
            owner: None,
            repo_name,
        }
    }

    /// プロセス環境とユーザー設定ディレクトリを使って読み込む
    pub fn load(repo_root: &Path) -> Result<Self> {
        let global = global_config_path();
        Self::load_with(repo_root, global.as_deref(), |key| std::env::var(key).ok())
    }

    /// 設定ソースを明示して読み込む
    pub fn load_with<F>(repo_root: &Path, global_config: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::defaults(repo_root);

        if let Some(owner) = env("GITHUB_REPOSITORY_OWNER") {
            settings.owner = Some(owner);
        }
        if let Some(repository) = env("GITHUB_REPOSITORY")
            && let Some((_, name)) = repository.split_once('/')
        {
            settings.repo_name = name.to_lowercase();
        }

        if let Some(path) = global_config {
            settings.merge_file(path)?;
        }
        settings.merge_file(&repo_root.join(CONFIG_FILE))?;

        if let Some(registry) = env("DOCKYARD_REGISTRY") {
            settings.registry = registry;
        }
        if let Some(owner) = env("DOCKYARD_OWNER") {
            settings.owner = Some(owner);
        }
        if let Some(repo_name) = env("DOCKYARD_REPO_NAME") {
            settings.repo_name = repo_name;
        }

        debug!(?settings, "Loaded settings");
        Ok(settings)
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Ok(());
        }

        debug!(file = %path.display(), "Reading config file");
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(());
        }
        // コメントのみのファイルは null としてパースされる
        let file: Option<FileConfig> =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let Some(file) = file else {
            return Ok(());
        };

        if let Some(apps_dir) = file.apps_dir {
            self.apps_dir = apps_dir;
        }
        if let Some(shared_dirs) = file.shared_dirs {
            self.shared_dirs = shared_dirs;
        }
        if let Some(descriptor) = file.descriptor {
            self.descriptor = descriptor;
        }
        if let Some(registry) = file.registry {
            self.registry = registry;
        }
        if let Some(owner) = file.owner {
            self.owner = Some(owner);
        }
        if let Some(repo_name) = file.repo_name {
            self.repo_name = repo_name;
        }
        Ok(())
    }

    /// アプリディレクトリの絶対パス
    pub fn apps_root(&self) -> PathBuf {
        self.repo_root.join(&self.apps_dir)
    }
}

/// グローバル設定ファイルのパス
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dockyard").join("config.yaml"))
}

/// リポジトリルートを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 DOCKYARD_ROOT
/// 2. カレントディレクトリから上に向かって dockyard.yaml または .git を含むディレクトリ
pub fn find_repo_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var("DOCKYARD_ROOT") {
        let path = PathBuf::from(&root);
        if path.is_dir() {
            debug!(root = %path.display(), "Using DOCKYARD_ROOT");
            return Ok(path);
        }
        debug!(root = %root, "DOCKYARD_ROOT is not a directory, ignoring");
    }

    find_repo_root_from(&std::env::current_dir()?)
}

/// `start` から上に向かってリポジトリルートを探す
pub fn find_repo_root_from(start: &Path) -> Result<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        if current.join(CONFIG_FILE).is_file() || current.join(".git").exists() {
            debug!(root = %current.display(), "Found repository root");
            return Ok(current);
        }

        if !current.pop() {
            break;
        }
    }

    Err(ConfigError::RootNotFound(start.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use std::fs;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = temp_dir.path().join("My-Monorepo");
        fs::create_dir(&repo).unwrap();

        let settings = Settings::load_with(&repo, None, no_env).unwrap();
        assert_eq!(settings.apps_dir, "apps");
        assert_eq!(settings.shared_dirs, vec!["shared"]);
        assert_eq!(settings.descriptor, "Dockerfile");
        assert_eq!(settings.registry, "ghcr.io");
        assert_eq!(settings.owner, None);
        assert_eq!(settings.repo_name, "my-monorepo");
        assert_eq!(settings.apps_root(), repo.join("apps"));
    }

    #[test]
    fn test_repo_file_overrides_global() {
        let temp_dir = tempfile::tempdir().unwrap();
        let global = temp_dir.path().join("global.yaml");
        fs::write(&global, "registry: registry.example.com\nowner: global-owner\n").unwrap();
        fs::write(
            temp_dir.path().join(CONFIG_FILE),
            "owner: acme\nshared-dirs:\n  - shared\n  - proto\n",
        )
        .unwrap();

        let settings = Settings::load_with(temp_dir.path(), Some(&global), no_env).unwrap();
        assert_eq!(settings.registry, "registry.example.com");
        assert_eq!(settings.owner.as_deref(), Some("acme"));
        assert_eq!(settings.shared_dirs, vec!["shared", "proto"]);
    }

    #[test]
    fn test_env_precedence() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join(CONFIG_FILE), "owner: from-file\n").unwrap();

        let env: HashMap<&str, &str> = HashMap::from([
            ("GITHUB_REPOSITORY_OWNER", "from-github"),
            ("GITHUB_REPOSITORY", "from-github/Platform"),
            ("DOCKYARD_REGISTRY", "localhost:5000"),
        ]);
        let lookup = |key: &str| env.get(key).map(|v| v.to_string());

        let settings = Settings::load_with(temp_dir.path(), None, lookup).unwrap();
        // ファイル設定は GITHUB_* より優先、DOCKYARD_* はファイルより優先
        assert_eq!(settings.owner.as_deref(), Some("from-file"));
        assert_eq!(settings.repo_name, "platform");
        assert_eq!(settings.registry, "localhost:5000");
    }

    #[test]
    fn test_empty_config_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join(CONFIG_FILE), "").unwrap();

        let settings = Settings::load_with(temp_dir.path(), None, no_env).unwrap();
        assert_eq!(settings.apps_dir, "apps");
    }

    #[test]
    fn test_invalid_config_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join(CONFIG_FILE), "unknown-key: 1\n").unwrap();

        let result = Settings::load_with(temp_dir.path(), None, no_env);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_find_repo_root_from_subdir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::create_dir(temp_dir.path().join(".git")).unwrap();
        let nested = temp_dir.path().join("apps/api/src");
        fs::create_dir_all(&nested).unwrap();

        let root = find_repo_root_from(&nested).unwrap();
        assert_eq!(root, temp_dir.path());
    }

    #[test]
    fn test_find_repo_root_prefers_nearest_config() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::create_dir(temp_dir.path().join(".git")).unwrap();
        let sub = temp_dir.path().join("platform");
        fs::create_dir_all(sub.join("apps")).unwrap();
        fs::write(sub.join(CONFIG_FILE), "apps-dir: apps\n").unwrap();

        let root = find_repo_root_from(&sub.join("apps")).unwrap();
        assert_eq!(root, sub);
    }

    #[test]
    #[serial]
    fn test_find_repo_root_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().to_str().unwrap().to_string();

        temp_env::with_var("DOCKYARD_ROOT", Some(&root), || {
            let found = find_repo_root().unwrap();
            assert_eq!(found, temp_dir.path());
        });
    }

    #[test]
    #[serial]
    fn test_load_reads_process_env() {
        let temp_dir = tempfile::tempdir().unwrap();

        temp_env::with_vars(
            [
                ("DOCKYARD_OWNER", Some("env-owner")),
                ("DOCKYARD_REPO_NAME", Some("tools")),
            ],
            || {
                let settings = Settings::load(temp_dir.path()).unwrap();
                assert_eq!(settings.owner.as_deref(), Some("env-owner"));
                assert_eq!(settings.repo_name, "tools");
            },
        );
    }
}
