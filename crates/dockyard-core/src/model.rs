//! ビルド対象のデータモデル

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// 全アプリを指定するセンチネル
pub const ALL_UNITS: &str = "all";

/// ビルド可能なアプリ（モノレポ内の1アプリケーション）
///
/// カタログの探索でのみ生成される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unit {
    name: String,
    dockerfile_path: PathBuf,
}

impl Unit {
    pub(crate) fn new(name: String, dockerfile_path: PathBuf) -> Self {
        Self {
            name,
            dockerfile_path,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dockerfile_path(&self) -> &Path {
        &self.dockerfile_path
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// 実行のきっかけとなったイベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    Push {
        branch: String,
    },
    PullRequest {
        number: u64,
    },
    Release {
        version: String,
    },
    ManualDispatch {
        requested_unit: Option<String>,
        requested_tag: Option<String>,
    },
    LocalInvocation {
        requested_unit: Option<String>,
        requested_tag: Option<String>,
    },
}

impl Trigger {
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::Push { .. } => "push",
            Trigger::PullRequest { .. } => "pull_request",
            Trigger::Release { .. } => "release",
            Trigger::ManualDispatch { .. } => "manual_dispatch",
            Trigger::LocalInvocation { .. } => "local",
        }
    }

    /// 変更検出でビルド対象を絞り込むトリガーか
    pub fn uses_change_detection(&self) -> bool {
        matches!(self, Trigger::Push { .. } | Trigger::PullRequest { .. })
    }

    /// PRのイメージはレジストリに公開しない
    pub fn allows_push(&self) -> bool {
        !matches!(self, Trigger::PullRequest { .. })
    }

    pub fn requested_unit(&self) -> Option<&str> {
        match self {
            Trigger::ManualDispatch { requested_unit, .. }
            | Trigger::LocalInvocation { requested_unit, .. } => requested_unit.as_deref(),
            _ => None,
        }
    }

    /// 要求されたアプリの選択。未指定なら全アプリ
    pub fn selection(&self) -> UnitSelection {
        self.requested_unit()
            .map(UnitSelection::parse)
            .unwrap_or(UnitSelection::All)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Push { branch } => write!(f, "push ({})", branch),
            Trigger::PullRequest { number } => write!(f, "pull request #{}", number),
            Trigger::Release { version } => write!(f, "release {}", version),
            Trigger::ManualDispatch { .. } => f.write_str("manual dispatch"),
            Trigger::LocalInvocation { .. } => f.write_str("local"),
        }
    }
}

/// アプリの指定（名前 または "all"）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitSelection {
    All,
    Named(String),
}

impl UnitSelection {
    pub fn parse(value: &str) -> Self {
        if value == ALL_UNITS {
            UnitSelection::All
        } else {
            UnitSelection::Named(value.to_string())
        }
    }
}

/// 変更されたファイルパスの集合
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    paths: BTreeSet<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str) {
        let normalized = normalize_path(path);
        if !normalized.is_empty() {
            self.paths.insert(normalized);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn any_with_prefix(&self, prefix: &str) -> bool {
        self.paths.iter().any(|p| p.starts_with(prefix))
    }
}

impl<S: AsRef<str>> FromIterator<S> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = ChangeSet::new();
        for path in iter {
            set.insert(path.as_ref());
        }
        set
    }
}

fn normalize_path(path: &str) -> String {
    let path = path.trim().replace('\\', "/");
    let mut rest = path.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    rest.trim_start_matches('/').to_string()
}

/// 1アプリ分のイメージタグ列
///
/// 先頭が代表タグ。重複なし、空にならない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TagSet {
    tags: Vec<String>,
}

impl TagSet {
    pub(crate) fn new(primary: String) -> Self {
        Self {
            tags: vec![primary],
        }
    }

    /// 既に含まれているタグは無視する
    pub(crate) fn push(&mut self, tag: String) {
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    pub fn primary(&self) -> &str {
        &self.tags[0]
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.tags
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tags.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_set_normalizes_paths() {
        let changes: ChangeSet = ["./apps/api/main.py", "shared\\lib.py", "  ", "/README.md"]
            .into_iter()
            .collect();

        let paths: Vec<&str> = changes.iter().collect();
        assert_eq!(paths, vec!["README.md", "apps/api/main.py", "shared/lib.py"]);
        assert!(changes.any_with_prefix("apps/api/"));
        assert!(!changes.any_with_prefix("apps/web/"));
    }

    #[test]
    fn test_tag_set_deduplicates_keeping_first() {
        let mut tags = TagSet::new("latest".to_string());
        tags.push("main-abc1234".to_string());
        tags.push("latest".to_string());

        assert_eq!(tags.as_slice(), &["latest", "main-abc1234"]);
        assert_eq!(tags.primary(), "latest");
    }

    #[test]
    fn test_trigger_selection() {
        let trigger = Trigger::LocalInvocation {
            requested_unit: Some("all".to_string()),
            requested_tag: None,
        };
        assert_eq!(trigger.selection(), UnitSelection::All);

        let trigger = Trigger::ManualDispatch {
            requested_unit: Some("api".to_string()),
            requested_tag: None,
        };
        assert_eq!(trigger.selection(), UnitSelection::Named("api".to_string()));

        let trigger = Trigger::Push {
            branch: "main".to_string(),
        };
        assert_eq!(trigger.selection(), UnitSelection::All);
        assert!(trigger.uses_change_detection());
    }

    #[test]
    fn test_pull_request_never_pushes() {
        assert!(!Trigger::PullRequest { number: 7 }.allows_push());
        assert!(
            Trigger::Release {
                version: "1.0.0".to_string()
            }
            .allows_push()
        );
    }
}
