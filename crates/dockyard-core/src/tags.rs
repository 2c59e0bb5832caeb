//! イメージタグの解決
//!
//! トリガーの種類ごとに付与するタグの規則:
//!
//! | トリガー | タグ |
//! |---|---|
//! | push (main) | `latest`, `main-<sha7>` |
//! | push (develop) | `develop`, `develop-<sha7>` |
//! | push (その他) | `<branch>-<sha7>` |
//! | pull request | `pr-<n>` |
//! | release | `vX.Y.Z`, `vX.Y`, `vX` |
//! | manual / local | 指定タグ（既定 `1.0` / `local`） |

use crate::error::{CoreError, Result};
use crate::model::{TagSet, Trigger};
use regex::Regex;
use std::sync::LazyLock;

static RELEASE_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v?(\d+)\.(\d+)\.(\d+)$").expect("valid regex"));

const SHORT_SHA_LEN: usize = 7;
pub const DEFAULT_MANUAL_TAG: &str = "1.0";
pub const DEFAULT_LOCAL_TAG: &str = "local";

pub struct TagResolver;

impl TagResolver {
    /// トリガーとコミットSHAからタグ列を解決
    pub fn resolve(trigger: &Trigger, commit_sha: &str) -> Result<TagSet> {
        let tags = match trigger {
            Trigger::Push { branch } => {
                let sha = short_sha(commit_sha)?;
                match branch.as_str() {
                    "main" => {
                        let mut tags = TagSet::new("latest".to_string());
                        tags.push(format!("main-{}", sha));
                        tags
                    }
                    "develop" => {
                        let mut tags = TagSet::new("develop".to_string());
                        tags.push(format!("develop-{}", sha));
                        tags
                    }
                    other => TagSet::new(format!("{}-{}", sanitize_branch(other), sha)),
                }
            }
            Trigger::PullRequest { number } => TagSet::new(format!("pr-{}", number)),
            Trigger::Release { version } => release_tags(version)?,
            Trigger::ManualDispatch { requested_tag, .. } => {
                TagSet::new(explicit_tag(requested_tag.as_deref(), DEFAULT_MANUAL_TAG)?)
            }
            Trigger::LocalInvocation { requested_tag, .. } => {
                TagSet::new(explicit_tag(requested_tag.as_deref(), DEFAULT_LOCAL_TAG)?)
            }
        };

        tracing::debug!(trigger = %trigger, tags = %tags, "Resolved image tags");
        Ok(tags)
    }
}

/// ブランチ名をタグに使える形へ変換
///
/// 小文字化し、`[a-z0-9._-]` 以外の文字を `-` に置換する。
pub fn sanitize_branch(branch: &str) -> String {
    branch
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// コミットSHAの先頭7文字
pub fn short_sha(commit_sha: &str) -> Result<&str> {
    let sha = commit_sha.trim();
    match sha.get(..SHORT_SHA_LEN) {
        Some(prefix) if prefix.chars().all(|c| c.is_ascii_hexdigit()) => Ok(prefix),
        _ => Err(CoreError::InvalidTag(format!(
            "コミットSHAが不正です: '{}' (16進数{}文字以上が必要です)",
            commit_sha, SHORT_SHA_LEN
        ))),
    }
}

fn release_tags(version: &str) -> Result<TagSet> {
    let caps = RELEASE_VERSION
        .captures(version)
        .ok_or_else(|| CoreError::TagFormat(version.to_string()))?;

    let (major, minor, patch) = (&caps[1], &caps[2], &caps[3]);
    let mut tags = TagSet::new(format!("v{}.{}.{}", major, minor, patch));
    tags.push(format!("v{}.{}", major, minor));
    tags.push(format!("v{}", major));
    Ok(tags)
}

fn explicit_tag(requested: Option<&str>, default: &str) -> Result<String> {
    match requested {
        None => Ok(default.to_string()),
        Some("") => Err(CoreError::InvalidTag("(empty)".to_string())),
        Some(tag) => Ok(tag.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "abcdef1234567";

    fn push(branch: &str) -> Trigger {
        Trigger::Push {
            branch: branch.to_string(),
        }
    }

    #[test]
    fn test_push_main() {
        let tags = TagResolver::resolve(&push("main"), SHA).unwrap();
        assert_eq!(tags.as_slice(), &["latest", "main-abcdef1"]);
        assert_eq!(tags.primary(), "latest");
    }

    #[test]
    fn test_push_develop() {
        let tags = TagResolver::resolve(&push("develop"), SHA).unwrap();
        assert_eq!(tags.as_slice(), &["develop", "develop-abcdef1"]);
    }

    #[test]
    fn test_push_feature_branch_is_sanitized() {
        let tags = TagResolver::resolve(&push("Feature/Login+OAuth"), SHA).unwrap();
        assert_eq!(tags.as_slice(), &["feature-login-oauth-abcdef1"]);
    }

    #[test]
    fn test_push_requires_commit_sha() {
        let result = TagResolver::resolve(&push("main"), "abc");
        assert!(matches!(result, Err(CoreError::InvalidTag(_))));

        let result = TagResolver::resolve(&push("main"), "zzzzzzzzz");
        assert!(matches!(result, Err(CoreError::InvalidTag(_))));
    }

    #[test]
    fn test_pull_request() {
        let tags = TagResolver::resolve(&Trigger::PullRequest { number: 42 }, SHA).unwrap();
        assert_eq!(tags.as_slice(), &["pr-42"]);
    }

    #[test]
    fn test_release() {
        let trigger = Trigger::Release {
            version: "2.3.4".to_string(),
        };
        let tags = TagResolver::resolve(&trigger, SHA).unwrap();
        assert_eq!(tags.as_slice(), &["v2.3.4", "v2.3", "v2"]);

        let trigger = Trigger::Release {
            version: "v10.0.1".to_string(),
        };
        let tags = TagResolver::resolve(&trigger, "").unwrap();
        assert_eq!(tags.as_slice(), &["v10.0.1", "v10.0", "v10"]);
    }

    #[test]
    fn test_release_bad_version() {
        for version in ["bad", "1.2", "v1.2.3-rc1", "1.2.3.4", "", " 1.2.3 ", "v1.2.3\n"] {
            let trigger = Trigger::Release {
                version: version.to_string(),
            };
            let result = TagResolver::resolve(&trigger, SHA);
            assert!(
                matches!(result, Err(CoreError::TagFormat(_))),
                "version {:?} should be rejected",
                version
            );
        }
    }

    #[test]
    fn test_manual_dispatch() {
        let trigger = Trigger::ManualDispatch {
            requested_unit: None,
            requested_tag: None,
        };
        let tags = TagResolver::resolve(&trigger, SHA).unwrap();
        assert_eq!(tags.as_slice(), &["1.0"]);

        let trigger = Trigger::ManualDispatch {
            requested_unit: None,
            requested_tag: Some("Hotfix/1".to_string()),
        };
        let tags = TagResolver::resolve(&trigger, SHA).unwrap();
        assert_eq!(tags.as_slice(), &["Hotfix/1"]);
    }

    #[test]
    fn test_local_invocation() {
        let trigger = Trigger::LocalInvocation {
            requested_unit: Some("api".to_string()),
            requested_tag: None,
        };
        let tags = TagResolver::resolve(&trigger, "").unwrap();
        assert_eq!(tags.as_slice(), &["local"]);
    }

    #[test]
    fn test_empty_explicit_tag_rejected() {
        let trigger = Trigger::LocalInvocation {
            requested_unit: None,
            requested_tag: Some(String::new()),
        };
        assert!(matches!(
            TagResolver::resolve(&trigger, SHA),
            Err(CoreError::InvalidTag(_))
        ));
    }

    #[test]
    fn test_tags_never_empty_nor_duplicated() {
        let triggers = vec![
            push("main"),
            push("develop"),
            push("latest"),
            push("release/1.x"),
            Trigger::PullRequest { number: 1 },
            Trigger::Release {
                version: "0.0.0".to_string(),
            },
            Trigger::ManualDispatch {
                requested_unit: None,
                requested_tag: Some("latest".to_string()),
            },
            Trigger::LocalInvocation {
                requested_unit: None,
                requested_tag: None,
            },
        ];

        for trigger in triggers {
            let tags = TagResolver::resolve(&trigger, SHA).unwrap();
            assert!(!tags.is_empty(), "{} produced no tags", trigger);

            let mut seen = std::collections::HashSet::new();
            for tag in tags.iter() {
                assert!(seen.insert(tag), "{} produced duplicate tag {}", trigger, tag);
            }
        }
    }

    #[test]
    fn test_sanitize_branch() {
        assert_eq!(sanitize_branch("main"), "main");
        assert_eq!(sanitize_branch("feature/ABC_1.2"), "feature-abc_1.2");
        assert_eq!(sanitize_branch("fix#12 ok"), "fix-12-ok");
        assert_eq!(sanitize_branch("ümlaut"), "-mlaut");
    }
}
