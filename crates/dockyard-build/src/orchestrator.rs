//! 選択されたアプリを順番にビルド・プッシュする

use crate::backend::ImageBackend;
use crate::summary::{BuildResult, Outcome, RunSummary};
use dockyard_core::{CoreError, Prompter, Result, TagResolver, TagSet, Trigger, Unit};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// イメージ参照の組み立て規則
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageNaming {
    repo_name: String,
    registry: String,
    owner: Option<String>,
}

impl ImageNaming {
    /// レジストリはパスに大文字を許さないため、名前はすべて小文字にそろえる
    pub fn new(repo_name: &str, registry: &str, owner: Option<&str>) -> Self {
        Self {
            repo_name: repo_name.to_lowercase(),
            registry: registry.trim_end_matches('/').to_lowercase(),
            owner: owner.filter(|o| !o.is_empty()).map(str::to_lowercase),
        }
    }

    /// `<repo>/<unit>:<tag>`
    pub fn local_ref(&self, unit: &Unit, tag: &str) -> String {
        format!("{}/{}:{}", self.repo_name, unit.name(), tag)
    }

    /// `<registry>/<owner>/<repo>/<unit>:<tag>`
    pub fn remote_ref(&self, unit: &Unit, tag: &str) -> String {
        match &self.owner {
            Some(owner) => format!(
                "{}/{}/{}/{}:{}",
                self.registry,
                owner,
                self.repo_name,
                unit.name(),
                tag
            ),
            None => format!(
                "{}/{}/{}:{}",
                self.registry,
                self.repo_name,
                unit.name(),
                tag
            ),
        }
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// ビルド後にレジストリへプッシュする
    pub push: bool,
    /// 最初のビルド前に確認を求める
    pub confirm: bool,
}

pub struct BuildOrchestrator<'a> {
    backend: &'a dyn ImageBackend,
    repository_root: PathBuf,
    naming: ImageNaming,
    prompter: Option<&'a dyn Prompter>,
    cancel: Option<watch::Receiver<bool>>,
}

impl<'a> BuildOrchestrator<'a> {
    /// `repository_root` はすべてのビルドでコンテキストとして使う
    pub fn new(backend: &'a dyn ImageBackend, repository_root: &Path, naming: ImageNaming) -> Self {
        Self {
            backend,
            repository_root: repository_root.to_path_buf(),
            naming,
            prompter: None,
            cancel: None,
        }
    }

    pub fn with_prompter(mut self, prompter: &'a dyn Prompter) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// 値が `true` になると、実行中のアプリを終えたところで停止する
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn naming(&self) -> &ImageNaming {
        &self.naming
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// `units` を与えられた順に処理する
    ///
    /// アプリごとの失敗は結果に記録して次へ進む。
    /// タグを決められない場合はビルドを始めずにエラーを返す。
    pub async fn run(
        &self,
        units: &[Unit],
        trigger: &Trigger,
        commit_sha: &str,
        options: RunOptions,
    ) -> Result<RunSummary> {
        let tags = TagResolver::resolve(trigger, commit_sha)?;

        let push = if options.push && !trigger.allows_push() {
            warn!(trigger = trigger.kind(), "Push is disabled for this trigger");
            false
        } else {
            options.push
        };

        let mut summary = RunSummary::new(trigger.clone(), tags.clone(), push);
        info!(
            %trigger,
            units = units.len(),
            tags = %tags,
            push,
            "Starting build run"
        );

        if options.confirm && !units.is_empty() {
            match self.prompter {
                Some(prompter) => {
                    let question = format!(
                        "{} 個のアプリをビルドします（タグ: {}）。続行しますか？",
                        units.len(),
                        tags
                    );
                    if !prompter.confirm(&question)? {
                        info!("Build run declined");
                        summary.mark_cancelled();
                        return Ok(summary);
                    }
                }
                None => debug!("No prompter available, skipping confirmation"),
            }
        }

        for unit in units {
            if self.is_cancelled() {
                warn!(next = unit.name(), "Cancellation requested, stopping");
                summary.mark_cancelled();
                break;
            }

            let result = self.process_unit(unit, &tags, push).await;
            match result.outcome {
                Outcome::Success => info!(unit = unit.name(), "Unit finished"),
                outcome => warn!(
                    unit = unit.name(),
                    %outcome,
                    error = result.error.as_deref().unwrap_or(""),
                    "Unit failed"
                ),
            }
            summary.record(result);
        }

        Ok(summary)
    }

    async fn process_unit(&self, unit: &Unit, tags: &TagSet, push: bool) -> BuildResult {
        let dockerfile = unit.dockerfile_path();
        if !dockerfile.is_file() {
            return BuildResult::failure(
                unit,
                Outcome::SkippedNotFound,
                Vec::new(),
                CoreError::DockerfileNotFound(dockerfile.to_path_buf()),
            );
        }

        let mut image_refs = Vec::with_capacity(tags.len() * 2);
        for tag in tags.iter() {
            let local = self.naming.local_ref(unit, tag);
            debug!(unit = unit.name(), image = %local, "Building");
            if let Err(e) = self
                .backend
                .build(&self.repository_root, dockerfile, &local)
                .await
            {
                return BuildResult::failure(unit, Outcome::BuildFailed, image_refs, e);
            }
            image_refs.push(local);
        }

        let primary = self.naming.local_ref(unit, tags.primary());
        let image = match self.backend.inspect_local(&primary).await {
            Ok(info) => Some(info),
            Err(e) => {
                debug!(unit = unit.name(), error = %e, "Could not inspect built image");
                None
            }
        };

        if push {
            for tag in tags.iter() {
                let local = self.naming.local_ref(unit, tag);
                let remote = self.naming.remote_ref(unit, tag);

                if let Err(e) = self.backend.tag_local(&local, &remote).await {
                    return BuildResult::failure(unit, Outcome::PushFailed, image_refs, e);
                }
                if let Err(e) = self.backend.push(&remote).await {
                    return BuildResult::failure(unit, Outcome::PushFailed, image_refs, e);
                }
                image_refs.push(remote);
            }
        }

        BuildResult::success(unit, image_refs, image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_core::AppCatalog;
    use std::fs;

    fn catalog(names: &[&str]) -> (tempfile::TempDir, AppCatalog) {
        let temp_dir = tempfile::tempdir().unwrap();
        for name in names {
            let dir = temp_dir.path().join("apps").join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("Dockerfile"), "FROM alpine").unwrap();
        }
        let catalog =
            AppCatalog::discover(&temp_dir.path().join("apps"), "Dockerfile").unwrap();
        (temp_dir, catalog)
    }

    #[test]
    fn test_image_naming() {
        let (_dir, catalog) = catalog(&["api"]);
        let api = catalog.get("api").unwrap();

        let naming = ImageNaming::new("Mono", "ghcr.io/", Some("Acme"));
        assert_eq!(naming.local_ref(api, "local"), "mono/api:local");
        assert_eq!(
            naming.remote_ref(api, "main-abc1234"),
            "ghcr.io/acme/mono/api:main-abc1234"
        );

        let no_owner = ImageNaming::new("mono", "localhost:5000", None);
        assert_eq!(no_owner.remote_ref(api, "1.0"), "localhost:5000/mono/api:1.0");
    }

    #[test]
    fn test_empty_owner_is_ignored() {
        let naming = ImageNaming::new("mono", "ghcr.io", Some(""));
        assert_eq!(naming.owner(), None);
    }
}
