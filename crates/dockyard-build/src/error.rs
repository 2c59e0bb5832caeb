use dockyard_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Dockerfile not found: {0}")]
    DockerfileNotFound(PathBuf),

    #[error("Build context directory not found: {0}")]
    ContextNotFound(PathBuf),

    #[error("Invalid .dockerignore pattern '{pattern}' (line {line}): {message}")]
    InvalidIgnorePattern {
        pattern: String,
        line: usize,
        message: String,
    },

    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Failed to tag {source_ref} as {target_ref}: {message}")]
    TagFailed {
        source_ref: String,
        target_ref: String,
        message: String,
    },

    #[error("Push failed: {message}")]
    PushFailed { message: String },

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Invalid tag: {tag}")]
    InvalidTag { tag: String },

    #[error("Registry authentication failed for {registry}: {message}")]
    AuthFailed { registry: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl BuildError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::DockerfileNotFound(path) => {
                format!(
                    "Dockerfileが見つかりません: {}\n\
                     \n\
                     解決方法:\n\
                     1. apps/<アプリ名>/Dockerfile が存在するか確認してください\n\
                     2. dockyard.yaml の descriptor 設定を確認してください",
                    path.display()
                )
            }
            BuildError::InvalidIgnorePattern { pattern, line, .. } => {
                format!(
                    ".dockerignore の {} 行目のパターンが不正です: {}\n\
                     \n\
                     除外漏れを防ぐため、ビルドを中止しました。",
                    line, pattern
                )
            }
            BuildError::BuildFailed(msg) => {
                format!(
                    "ビルドに失敗しました: {}\n\
                     \n\
                     Dockerfileの内容を確認してください。",
                    msg
                )
            }
            BuildError::PushFailed { message } => {
                format!(
                    "プッシュに失敗しました: {}\n\
                     \n\
                     レジストリにログインしているか確認してください:\n\
                        docker login <registry>",
                    message
                )
            }
            BuildError::DockerConnection(e) => {
                format!(
                    "Dockerに接続できません: {}\n\
                     \n\
                     Dockerが起動しているか確認してください。",
                    e
                )
            }
            _ => format!("{}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
