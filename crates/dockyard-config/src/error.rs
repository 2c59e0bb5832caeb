use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "リポジトリルートが見つかりません\n探索開始位置: {0}\n\
        ヒント: dockyard.yaml または .git を含むディレクトリで実行するか、\
        DOCKYARD_ROOT 環境変数で指定してください"
    )]
    RootNotFound(PathBuf),

    #[error("設定ファイルの解析に失敗しました: {path}\n理由: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
