//! イメージバックエンドの抽象化

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;

/// ローカルに存在するイメージの情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    pub id: String,
    pub size: Option<i64>,
    pub tags: Vec<String>,
}

/// コンテナイメージのビルド・タグ付け・プッシュを行うバックエンド
///
/// Docker Engine 実装は [`crate::docker::DockerBackend`]、
/// テスト用のインメモリ実装は [`crate::fakes::MemoryBackend`]。
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// `context` をビルドコンテキストとして `dockerfile` からイメージをビルドし、
    /// `image_ref` の名前を付ける
    async fn build(&self, context: &Path, dockerfile: &Path, image_ref: &str) -> Result<()>;

    /// ローカルイメージ `src` に別名 `dst` を付ける
    async fn tag_local(&self, src: &str, dst: &str) -> Result<()>;

    async fn push(&self, image_ref: &str) -> Result<()>;

    /// 存在しない場合は [`crate::BuildError::ImageNotFound`]
    async fn inspect_local(&self, image_ref: &str) -> Result<ImageInfo>;
}
