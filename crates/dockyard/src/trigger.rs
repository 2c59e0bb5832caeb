//! 実行コンテキストの検出（GitHub Actions の環境変数、git）

use anyhow::{Context, Result, bail};
use dockyard_core::{ChangeSet, Trigger};
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

/// GitHub Actions の環境変数からトリガーを組み立てる
///
/// `unit` と `tag` は workflow_dispatch の入力として扱う。
pub fn from_github_env<F>(env: F, unit: Option<&str>, tag: Option<&str>) -> Result<Trigger>
where
    F: Fn(&str) -> Option<String>,
{
    let event = env("GITHUB_EVENT_NAME")
        .context("GITHUB_EVENT_NAME が設定されていません（--ci は GitHub Actions 上で使用してください）")?;
    let git_ref = env("GITHUB_REF").unwrap_or_default();
    let ref_name = env("GITHUB_REF_NAME").unwrap_or_else(|| {
        git_ref
            .strip_prefix("refs/heads/")
            .or_else(|| git_ref.strip_prefix("refs/tags/"))
            .unwrap_or(&git_ref)
            .to_string()
    });

    let trigger = match event.as_str() {
        "push" => {
            let is_tag = env("GITHUB_REF_TYPE").as_deref() == Some("tag")
                || git_ref.starts_with("refs/tags/");
            if is_tag {
                Trigger::Release { version: ref_name }
            } else {
                if ref_name.is_empty() {
                    bail!("push イベントのブランチ名を取得できません");
                }
                Trigger::Push { branch: ref_name }
            }
        }
        "pull_request" | "pull_request_target" => Trigger::PullRequest {
            number: pull_request_number(&git_ref)?,
        },
        "release" => Trigger::Release { version: ref_name },
        "workflow_dispatch" => Trigger::ManualDispatch {
            requested_unit: unit.map(str::to_string),
            requested_tag: tag.map(str::to_string),
        },
        other => bail!("未対応のイベントです: {}", other),
    };

    debug!(%trigger, "Detected CI trigger");
    Ok(trigger)
}

/// `refs/pull/<n>/merge` から PR 番号を取り出す
fn pull_request_number(git_ref: &str) -> Result<u64> {
    git_ref
        .strip_prefix("refs/pull/")
        .and_then(|rest| rest.split('/').next())
        .and_then(|n| n.parse().ok())
        .with_context(|| format!("GITHUB_REF から PR 番号を取得できません: '{}'", git_ref))
}

/// ビルド対象のコミット
///
/// `--sha`、`GITHUB_SHA`、`git rev-parse HEAD` の順で探す。
pub fn commit_sha<F>(explicit: Option<&str>, env: F, repo_root: &Path) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    explicit
        .map(str::to_string)
        .or_else(|| env("GITHUB_SHA"))
        .or_else(|| git(repo_root, &["rev-parse", "HEAD"]).map(|out| out.trim().to_string()))
        .filter(|sha| !sha.is_empty())
}

/// 差分の起点となるリビジョン
///
/// `--base` を優先し、PR では `origin/<GITHUB_BASE_REF>`、push ではイベントの
/// `before` を使う。
pub fn diff_base<F>(explicit: Option<&str>, trigger: &Trigger, env: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(base) = explicit.filter(|b| !b.is_empty()) {
        return Some(base.to_string());
    }

    match trigger {
        Trigger::PullRequest { .. } => env("GITHUB_BASE_REF")
            .filter(|b| !b.is_empty())
            .map(|b| format!("origin/{}", b)),
        Trigger::Push { .. } => env("GITHUB_EVENT_PATH").and_then(|path| push_before(Path::new(&path))),
        Trigger::Release { .. } | Trigger::ManualDispatch { .. } | Trigger::LocalInvocation { .. } => {
            None
        }
    }
}

/// push イベントのペイロードから `before` を取り出す
fn push_before(event_path: &Path) -> Option<String> {
    let content = match std::fs::read_to_string(event_path) {
        Ok(content) => content,
        Err(e) => {
            warn!(file = %event_path.display(), error = %e, "Could not read event payload");
            return None;
        }
    };

    let payload: serde_json::Value = match serde_json::from_str(&content) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(file = %event_path.display(), error = %e, "Could not parse event payload");
            return None;
        }
    };

    payload
        .get("before")
        .and_then(|before| before.as_str())
        .map(str::to_string)
}

/// 変更されたファイルの一覧
///
/// 取得できない場合は空集合を返し、全アプリのビルドにフォールバックする。
/// push では `base..HEAD` を見るため、まとめて push された全コミットが対象になる。
pub fn changed_files(
    list_file: Option<&Path>,
    trigger: &Trigger,
    base: Option<&str>,
    repo_root: &Path,
) -> ChangeSet {
    if let Some(path) = list_file {
        return match std::fs::read_to_string(path) {
            Ok(content) => parse_file_list(&content),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Could not read changed files list");
                ChangeSet::new()
            }
        };
    }

    let Some(base) = base.filter(|b| is_usable_base(b, repo_root)) else {
        warn!(?base, "No usable diff base, rebuilding all apps");
        return ChangeSet::new();
    };

    let range = match trigger {
        Trigger::PullRequest { .. } => format!("{}...HEAD", base),
        _ => format!("{}..HEAD", base),
    };

    match git(repo_root, &["diff", "--name-only", &range]) {
        Some(output) => parse_file_list(&output),
        None => {
            warn!(%range, "git diff failed, rebuilding all apps");
            ChangeSet::new()
        }
    }
}

/// 新規ブランチの push では `before` がすべて 0 になる
fn is_usable_base(base: &str, repo_root: &Path) -> bool {
    if base.is_empty() || base.chars().all(|c| c == '0') {
        return false;
    }
    git(
        repo_root,
        &["rev-parse", "--verify", "--quiet", &format!("{}^{{commit}}", base)],
    )
    .is_some()
}

fn parse_file_list(content: &str) -> ChangeSet {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

fn git(repo_root: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_root)
        .args(args)
        .output()
        .ok()?;

    if !output.status.success() {
        debug!(
            ?args,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "git command failed"
        );
        return None;
    }
    String::from_utf8(output.stdout).ok()
}
