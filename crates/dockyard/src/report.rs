//! 実行計画と結果の表示

use anyhow::{Context, Result};
use colored::Colorize;
use dockyard_build::{BuildResult, Outcome, RunSummary};
use dockyard_core::{AppCatalog, TagSet, Trigger, Unit};
use std::path::Path;

pub fn print_catalog(catalog: &AppCatalog) {
    if catalog.is_empty() {
        println!(
            "{}",
            format!("アプリが見つかりません: {}", catalog.root().display()).yellow()
        );
        return;
    }

    println!("{}", "アプリ一覧:".bold());
    for unit in catalog.units() {
        println!("  • {}", unit.name().cyan());
    }
}

pub fn print_plan(trigger: &Trigger, tags: &TagSet, units: &[Unit], push: bool) {
    println!("{}", "Dockerイメージをビルド中...".green());
    println!("トリガー: {}", trigger.to_string().cyan());
    println!("タグ: {}", tags.to_string().cyan());
    if push {
        println!("プッシュ: {}", "有効".cyan());
    }
    println!();
    println!("{}", format!("ビルド対象 ({} 個):", units.len()).bold());
    for unit in units {
        println!("  • {}", unit.name().cyan());
    }
    println!();
}

fn format_size(bytes: i64) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    format!("{:.1}MB", bytes as f64 / MB)
}

fn print_result(result: &BuildResult) {
    let name = result.unit.name();
    match result.outcome {
        Outcome::Success => {
            let detail = result
                .image
                .as_ref()
                .and_then(|info| info.size)
                .map(|size| format!(" ({})", format_size(size)))
                .unwrap_or_default();
            println!("  {} {}{}", "✓".green(), name, detail.dimmed());
            for image_ref in &result.image_refs {
                println!("      {}", image_ref.cyan());
            }
        }
        Outcome::SkippedNotFound => {
            println!("  {} {}: {}", "-".yellow(), name, result.outcome);
        }
        outcome => {
            println!("  {} {}: {}", "✗".red().bold(), name, outcome);
            if let Some(error) = &result.error {
                for line in error.lines() {
                    println!("      {}", line.red());
                }
            }
        }
    }
}

pub fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", "結果サマリー:".bold());

    if summary.results().is_empty() {
        println!("  ビルド対象のアプリはありませんでした");
    }
    for result in summary.results() {
        print_result(result);
    }

    println!();
    let failed = summary.failures().count();
    if summary.cancelled() {
        println!(
            "{}",
            format!("⚠ 中断されました（{} 個完了）", summary.results().len()).yellow()
        );
    }
    if failed == 0 && !summary.cancelled() {
        println!(
            "{}",
            format!("✓ {} 個のアプリが完了しました", summary.succeeded())
                .green()
                .bold()
        );
    } else if failed > 0 {
        println!(
            "{}",
            format!("✗ {} 個成功 / {} 個失敗", summary.succeeded(), failed)
                .red()
                .bold()
        );
    }
}

pub fn write_json(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = summary.to_json().context("サマリーのJSON変換に失敗しました")?;
    std::fs::write(path, json)
        .with_context(|| format!("サマリーを書き込めません: {}", path.display()))?;
    tracing::debug!(file = %path.display(), "Wrote run summary");
    Ok(())
}
