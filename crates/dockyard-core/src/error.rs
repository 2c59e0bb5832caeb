use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("アプリが見つかりません: {name}\n利用可能なアプリ: {available}")]
    NotFound { name: String, available: String },

    #[error("Dockerfileが見つかりません: {0}")]
    DockerfileNotFound(PathBuf),

    #[error("リリースバージョンの形式が不正です: '{0}' (期待する形式: v1.2.3 または 1.2.3)")]
    TagFormat(String),

    #[error("無効なタグ: {0}")]
    InvalidTag(String),

    #[error("アプリディレクトリの走査に失敗しました: {path}\n理由: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("入力の取得に失敗しました: {0}")]
    Prompt(String),
}

impl CoreError {
    pub fn not_found(name: impl Into<String>, available: &[&str]) -> Self {
        let available = if available.is_empty() {
            "(なし)".to_string()
        } else {
            available.join(", ")
        };
        CoreError::NotFound {
            name: name.into(),
            available,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
