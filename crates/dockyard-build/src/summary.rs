//! ビルド結果の集計

use crate::backend::ImageInfo;
use dockyard_core::{TagSet, Trigger, Unit};
use serde::Serialize;

/// アプリ 1 つ分の結末
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    BuildFailed,
    PushFailed,
    /// 実行時点で Dockerfile が見つからなかった
    SkippedNotFound,
}

impl Outcome {
    pub fn is_failure(self) -> bool {
        !matches!(self, Outcome::Success)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Outcome::Success => "success",
            Outcome::BuildFailed => "build failed",
            Outcome::PushFailed => "push failed",
            Outcome::SkippedNotFound => "skipped (not found)",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildResult {
    pub unit: Unit,
    pub outcome: Outcome,
    /// 作成できたローカル参照と、プッシュできたリモート参照
    pub image_refs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageInfo>,
}

impl BuildResult {
    pub(crate) fn success(unit: &Unit, image_refs: Vec<String>, image: Option<ImageInfo>) -> Self {
        Self {
            unit: unit.clone(),
            outcome: Outcome::Success,
            image_refs,
            error: None,
            image,
        }
    }

    pub(crate) fn failure(
        unit: &Unit,
        outcome: Outcome,
        image_refs: Vec<String>,
        error: impl std::fmt::Display,
    ) -> Self {
        Self {
            unit: unit.clone(),
            outcome,
            image_refs,
            error: Some(error.to_string()),
            image: None,
        }
    }
}

/// 1 回の実行の結果
///
/// `results` は処理した順に並ぶ。キャンセルされた場合、未処理のアプリは含まれない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    trigger: Trigger,
    tags: TagSet,
    pushed: bool,
    results: Vec<BuildResult>,
    cancelled: bool,
}

impl RunSummary {
    /// 結果が空の集計（ビルド対象がない場合にも使う）
    pub fn new(trigger: Trigger, tags: TagSet, pushed: bool) -> Self {
        Self {
            trigger,
            tags,
            pushed,
            results: Vec::new(),
            cancelled: false,
        }
    }

    pub(crate) fn record(&mut self, result: BuildResult) {
        self.results.push(result);
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// プッシュを行う実行だったか
    pub fn pushed(&self) -> bool {
        self.pushed
    }

    pub fn results(&self) -> &[BuildResult] {
        &self.results
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn failures(&self) -> impl Iterator<Item = &BuildResult> {
        self.results.iter().filter(|r| r.outcome.is_failure())
    }

    pub fn succeeded(&self) -> usize {
        self.results.len() - self.failures().count()
    }

    /// すべてのアプリが成功し、中断もされなかった
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failures().next().is_none()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
