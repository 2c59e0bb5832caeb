//! 変更検出
//!
//! 変更されたファイルパスから、ビルドが必要なアプリを決定します。

use crate::model::{ChangeSet, Trigger, Unit};
use tracing::{debug, info};

pub const DEFAULT_APPS_DIR: &str = "apps";
pub const DEFAULT_SHARED_DIR: &str = "shared";

/// 変更パスとアプリの対応付け
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    apps_prefix: String,
    shared_prefixes: Vec<String>,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_APPS_DIR, &[DEFAULT_SHARED_DIR.to_string()])
    }
}

impl ChangeDetector {
    /// リポジトリルートからの相対ディレクトリで作成
    pub fn new(apps_dir: &str, shared_dirs: &[String]) -> Self {
        Self {
            apps_prefix: dir_prefix(apps_dir),
            shared_prefixes: shared_dirs
                .iter()
                .map(|d| dir_prefix(d))
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// ビルドが必要なアプリを選択（入力の順序を保持）
    ///
    /// push / pull request 以外のトリガーでは `units` をそのまま返す。
    pub fn select(&self, units: &[Unit], changes: &ChangeSet, trigger: &Trigger) -> Vec<Unit> {
        if !trigger.uses_change_detection() {
            debug!(trigger = %trigger, "Change detection bypassed");
            return units.to_vec();
        }

        if changes.is_empty() {
            info!("No changed paths known, rebuilding all apps");
            return units.to_vec();
        }

        if let Some(prefix) = self
            .shared_prefixes
            .iter()
            .find(|prefix| changes.any_with_prefix(prefix))
        {
            info!(shared = %prefix, "Shared directory changed, rebuilding all apps");
            return units.to_vec();
        }

        let selected: Vec<Unit> = units
            .iter()
            .filter(|unit| changes.any_with_prefix(&self.unit_prefix(unit)))
            .cloned()
            .collect();

        info!(
            changed_paths = changes.len(),
            selected = selected.len(),
            "Selected apps from changes"
        );
        selected
    }

    fn unit_prefix(&self, unit: &Unit) -> String {
        format!("{}{}/", self.apps_prefix, unit.name())
    }
}

fn dir_prefix(dir: &str) -> String {
    let trimmed = dir.trim_start_matches("./").trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}
