mod build;
mod prompt;
mod report;
mod signal;
mod trigger;

use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dockyard", version)]
#[command(
    about = "モノレポのアプリを見つけて、コンテナイメージをビルドする",
    long_about = None
)]
struct Cli {
    /// ビルドするアプリ名（all で全アプリ）
    unit: Option<String>,

    /// イメージタグ（既定: local、workflow_dispatch では 1.0）
    tag: Option<String>,

    /// ビルド後にレジストリへプッシュする
    #[arg(short, long)]
    push: bool,

    /// 確認をすべて省略する
    #[arg(short = 'y', long)]
    yes: bool,

    /// GitHub Actions の環境変数からトリガーを判定する
    #[arg(long)]
    ci: bool,

    /// アプリ一覧を表示して終了
    #[arg(long)]
    list: bool,

    /// 変更ファイル一覧（改行区切り）。省略時は git diff を使う
    #[arg(long, value_name = "PATH")]
    changed_files: Option<PathBuf>,

    /// 変更ファイルを求める差分の起点（既定: PR はベースブランチ、push は push 前のコミット）
    #[arg(long, value_name = "REV")]
    base: Option<String>,

    /// ビルド対象のコミット SHA
    #[arg(long, value_name = "SHA")]
    sha: Option<String>,

    /// プッシュ先のレジストリ
    #[arg(long, value_name = "REGISTRY")]
    registry: Option<String>,

    /// レジストリ上の owner（組織名・ユーザー名）
    #[arg(long, value_name = "OWNER")]
    owner: Option<String>,

    /// 実行結果を JSON で書き出す
    #[arg(long, value_name = "PATH")]
    summary_json: Option<PathBuf>,

    /// ビルドログとデバッグログを表示する
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help / --version は成功扱い、それ以外の使い方の誤りは 1
            let code = if e.exit_code() == 0 { 0 } else { 1 };
            e.print().ok();
            return ExitCode::from(code);
        }
    };

    init_tracing(cli.verbose);

    match build::handle_build_command(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!();
            eprintln!("{} {:#}", "✗".red().bold(), e);
            ExitCode::from(1)
        }
    }
}
