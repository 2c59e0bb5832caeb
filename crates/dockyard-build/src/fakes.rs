//! テスト用のインメモリ実装

use crate::backend::{ImageBackend, ImageInfo};
use crate::error::{BuildError, Result};
use async_trait::async_trait;
use dockyard_core::{CoreError, Prompter};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [`MemoryBackend`] が受け取った呼び出し
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Build {
        context: PathBuf,
        dockerfile: PathBuf,
        image_ref: String,
    },
    Tag {
        src: String,
        dst: String,
    },
    Push {
        image_ref: String,
    },
    Inspect {
        image_ref: String,
    },
}

type BuildHook = Box<dyn Fn(&str) + Send + Sync>;

/// 呼び出しを記録し、指定した参照で失敗するバックエンド
///
/// 失敗条件はイメージ参照の部分一致で指定する。
#[derive(Default)]
pub struct MemoryBackend {
    calls: Mutex<Vec<BackendCall>>,
    images: Mutex<HashMap<String, ImageInfo>>,
    fail_build: Vec<String>,
    fail_tag: Vec<String>,
    fail_push: Vec<String>,
    on_build: Option<BuildHook>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_build_on(mut self, pattern: &str) -> Self {
        self.fail_build.push(pattern.to_string());
        self
    }

    pub fn fail_tag_on(mut self, pattern: &str) -> Self {
        self.fail_tag.push(pattern.to_string());
        self
    }

    pub fn fail_push_on(mut self, pattern: &str) -> Self {
        self.fail_push.push(pattern.to_string());
        self
    }

    /// ビルドのたびにイメージ参照を渡して呼ばれる
    pub fn on_build(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_build = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.calls).clone()
    }

    pub fn built(&self) -> Vec<String> {
        self.refs_of(|call| match call {
            BackendCall::Build { image_ref, .. } => Some(image_ref),
            _ => None,
        })
    }

    pub fn pushed(&self) -> Vec<String> {
        self.refs_of(|call| match call {
            BackendCall::Push { image_ref } => Some(image_ref),
            _ => None,
        })
    }

    pub fn has_image(&self, image_ref: &str) -> bool {
        lock(&self.images).contains_key(image_ref)
    }

    fn refs_of(&self, pick: impl Fn(&BackendCall) -> Option<&String>) -> Vec<String> {
        lock(&self.calls).iter().filter_map(pick).cloned().collect()
    }

    fn record(&self, call: BackendCall) {
        lock(&self.calls).push(call);
    }

    fn matches(patterns: &[String], image_ref: &str) -> bool {
        patterns.iter().any(|p| image_ref.contains(p.as_str()))
    }
}

#[async_trait]
impl ImageBackend for MemoryBackend {
    async fn build(&self, context: &Path, dockerfile: &Path, image_ref: &str) -> Result<()> {
        self.record(BackendCall::Build {
            context: context.to_path_buf(),
            dockerfile: dockerfile.to_path_buf(),
            image_ref: image_ref.to_string(),
        });
        if let Some(hook) = &self.on_build {
            hook(image_ref);
        }

        if Self::matches(&self.fail_build, image_ref) {
            return Err(BuildError::BuildFailed(format!(
                "scripted failure for {}",
                image_ref
            )));
        }

        let mut images = lock(&self.images);
        let id = format!("sha256:{:064x}", images.len() + 1);
        images.insert(
            image_ref.to_string(),
            ImageInfo {
                id,
                size: Some(1024),
                tags: vec![image_ref.to_string()],
            },
        );
        Ok(())
    }

    async fn tag_local(&self, src: &str, dst: &str) -> Result<()> {
        self.record(BackendCall::Tag {
            src: src.to_string(),
            dst: dst.to_string(),
        });

        if Self::matches(&self.fail_tag, dst) {
            return Err(BuildError::TagFailed {
                source_ref: src.to_string(),
                target_ref: dst.to_string(),
                message: "scripted failure".to_string(),
            });
        }

        let mut images = lock(&self.images);
        let Some(info) = images.get(src).cloned() else {
            return Err(BuildError::ImageNotFound(src.to_string()));
        };
        images.insert(dst.to_string(), info);
        Ok(())
    }

    async fn push(&self, image_ref: &str) -> Result<()> {
        self.record(BackendCall::Push {
            image_ref: image_ref.to_string(),
        });

        if Self::matches(&self.fail_push, image_ref) {
            return Err(BuildError::PushFailed {
                message: format!("scripted failure for {}", image_ref),
            });
        }
        if !self.has_image(image_ref) {
            return Err(BuildError::ImageNotFound(image_ref.to_string()));
        }
        Ok(())
    }

    async fn inspect_local(&self, image_ref: &str) -> Result<ImageInfo> {
        self.record(BackendCall::Inspect {
            image_ref: image_ref.to_string(),
        });

        lock(&self.images)
            .get(image_ref)
            .cloned()
            .ok_or_else(|| BuildError::ImageNotFound(image_ref.to_string()))
    }
}

/// あらかじめ決めた応答を順に返す [`Prompter`]
///
/// 応答が尽きた場合は [`CoreError::Prompt`] を返す。
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    selections: Mutex<VecDeque<String>>,
    confirms: Mutex<VecDeque<bool>>,
    lines: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(self, answer: &str) -> Self {
        lock(&self.selections).push_back(answer.to_string());
        self
    }

    pub fn confirm_with(self, answer: bool) -> Self {
        lock(&self.confirms).push_back(answer);
        self
    }

    pub fn line(self, answer: &str) -> Self {
        lock(&self.lines).push_back(answer.to_string());
        self
    }

    /// 表示された質問
    pub fn asked(&self) -> Vec<String> {
        lock(&self.asked).clone()
    }

    fn ask(&self, prompt: &str) {
        lock(&self.asked).push(prompt.to_string());
    }
}

impl Prompter for ScriptedPrompter {
    fn select_unit(&self, candidates: &[&str]) -> dockyard_core::Result<String> {
        self.ask(&candidates.join(","));
        lock(&self.selections)
            .pop_front()
            .ok_or_else(|| CoreError::Prompt("no scripted selection left".to_string()))
    }

    fn confirm(&self, prompt: &str) -> dockyard_core::Result<bool> {
        self.ask(prompt);
        lock(&self.confirms)
            .pop_front()
            .ok_or_else(|| CoreError::Prompt("no scripted confirmation left".to_string()))
    }

    fn read_line(&self, prompt: &str) -> dockyard_core::Result<String> {
        self.ask(prompt);
        lock(&self.lines)
            .pop_front()
            .ok_or_else(|| CoreError::Prompt("no scripted line left".to_string()))
    }
}
