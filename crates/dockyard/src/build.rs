use crate::Cli;
use crate::prompt::TerminalPrompter;
use crate::{report, signal, trigger};
use anyhow::{Result, anyhow, bail};
use colored::Colorize;
use dockyard_build::{
    BuildOrchestrator, DockerBackend, ImageNaming, RegistryAuth, RunOptions, RunSummary,
};
use dockyard_config::Settings;
use dockyard_core::{AppCatalog, ChangeDetector, Prompter, TagResolver, Trigger, Unit};
use std::io::IsTerminal;
use tracing::{debug, warn};

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// ビルドを実行し、すべてのアプリが成功したかを返す
pub async fn handle_build_command(cli: &Cli) -> Result<bool> {
    let repo_root = dockyard_config::find_repo_root()?;
    let mut settings = Settings::load(&repo_root)?;
    if let Some(registry) = &cli.registry {
        settings.registry = registry.clone();
    }
    if let Some(owner) = &cli.owner {
        settings.owner = Some(owner.clone());
    }
    debug!(?settings, "Effective settings");

    let catalog = AppCatalog::discover(&settings.apps_root(), &settings.descriptor)?;
    if cli.list {
        report::print_catalog(&catalog);
        return Ok(true);
    }

    let interactive = !cli.yes && !cli.ci && std::io::stdin().is_terminal();
    let terminal = TerminalPrompter;
    let prompter: Option<&dyn Prompter> = interactive.then_some(&terminal as &dyn Prompter);

    let (trigger, push) = if cli.ci {
        let trigger = trigger::from_github_env(env, cli.unit.as_deref(), cli.tag.as_deref())?;
        (trigger, cli.push)
    } else {
        local_trigger(cli, &catalog, prompter)?
    };

    let units = select_units(cli, &settings, &catalog, &trigger)?;
    let sha = trigger::commit_sha(cli.sha.as_deref(), env, &repo_root).unwrap_or_default();
    let tags = TagResolver::resolve(&trigger, &sha)?;

    let will_push = push && trigger.allows_push();
    if push && !will_push {
        println!(
            "{}",
            "⚠ プルリクエストのビルドはプッシュしません".yellow()
        );
    }

    if units.is_empty() {
        println!("{}", "ビルド対象のアプリはありません".yellow());
        let summary = RunSummary::new(trigger, tags, will_push);
        return finish(cli, &summary);
    }

    if will_push {
        if settings.owner.is_none() {
            bail!(
                "プッシュ先の owner が設定されていません\n\
                 ヒント: --owner、DOCKYARD_OWNER、または dockyard.yaml の owner で指定してください"
            );
        }
        if !check_registry_login(&RegistryAuth::new(), &settings.registry, prompter)? {
            println!("{}", "中断しました".yellow());
            return Ok(false);
        }
    }

    let backend = DockerBackend::connect()
        .await
        .map_err(|e| anyhow!(e.user_message()))?
        .verbose(cli.verbose);

    let naming = ImageNaming::new(
        &settings.repo_name,
        &settings.registry,
        settings.owner.as_deref(),
    );
    let mut orchestrator =
        BuildOrchestrator::new(&backend, &repo_root, naming).with_cancel(signal::cancellation());
    if let Some(prompter) = prompter {
        orchestrator = orchestrator.with_prompter(prompter);
    }

    report::print_plan(&trigger, &tags, &units, will_push);

    let summary = orchestrator
        .run(
            &units,
            &trigger,
            &sha,
            RunOptions {
                push,
                confirm: interactive,
            },
        )
        .await?;

    finish(cli, &summary)
}

fn finish(cli: &Cli, summary: &RunSummary) -> Result<bool> {
    report::print_summary(summary);
    if let Some(path) = &cli.summary_json {
        report::write_json(path, summary)?;
    }
    Ok(summary.is_success())
}

/// ローカル実行のトリガー。アプリ未指定の対話セッションでは入力を求める
fn local_trigger(
    cli: &Cli,
    catalog: &AppCatalog,
    prompter: Option<&dyn Prompter>,
) -> Result<(Trigger, bool)> {
    let (Some(prompter), None) = (prompter, &cli.unit) else {
        let trigger = Trigger::LocalInvocation {
            requested_unit: cli.unit.clone(),
            requested_tag: cli.tag.clone(),
        };
        return Ok((trigger, cli.push));
    };

    if catalog.is_empty() {
        return Ok((
            Trigger::LocalInvocation {
                requested_unit: None,
                requested_tag: None,
            },
            cli.push,
        ));
    }

    let unit = prompter.select_unit(&catalog.names())?;
    let tag = prompter.read_line("イメージタグ（空欄で local）")?;
    let tag = Some(tag.trim().to_string()).filter(|t| !t.is_empty());
    let push = cli.push || prompter.confirm("レジストリにプッシュしますか？")?;

    Ok((
        Trigger::LocalInvocation {
            requested_unit: Some(unit),
            requested_tag: tag,
        },
        push,
    ))
}

fn select_units(
    cli: &Cli,
    settings: &Settings,
    catalog: &AppCatalog,
    trigger: &Trigger,
) -> Result<Vec<Unit>> {
    if !trigger.uses_change_detection() {
        return Ok(catalog.select(&trigger.selection())?);
    }

    let base = trigger::diff_base(cli.base.as_deref(), trigger, env);
    let changes = trigger::changed_files(
        cli.changed_files.as_deref(),
        trigger,
        base.as_deref(),
        &settings.repo_root,
    );
    debug!(changed = changes.len(), "Collected changed files");

    let detector = ChangeDetector::new(&settings.apps_dir, &settings.shared_dirs);
    Ok(detector.select(catalog.units(), &changes, trigger))
}

/// プッシュ前にレジストリへのログイン状態を一度だけ確認する
///
/// 未ログインの場合、対話セッションでは続行するかを尋ね、
/// それ以外は警告のみで続行する。
fn check_registry_login(
    auth: &RegistryAuth,
    registry: &str,
    prompter: Option<&dyn Prompter>,
) -> Result<bool> {
    if auth.is_logged_in(registry) {
        return Ok(true);
    }

    warn!(%registry, config = %auth.config_path().display(), "No registry credentials found");
    println!(
        "{}",
        format!(
            "⚠ {} にログインしていないようです（docker login {}）",
            registry, registry
        )
        .yellow()
    );

    match prompter {
        Some(prompter) => Ok(prompter.confirm("このまま続行しますか？")?),
        None => Ok(true),
    }
}
