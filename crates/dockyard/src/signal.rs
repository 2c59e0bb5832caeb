use colored::Colorize;
use tokio::sync::watch;
use tracing::{info, warn};

/// Ctrl+C / SIGTERM で `true` になるキャンセル信号
///
/// 1 回目は実行中のアプリの完了を待ち、2 回目で即座に終了する。
pub fn cancellation() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = wait_for_signal().await {
            warn!(error = %e, "Failed to install signal handler");
            return;
        }

        eprintln!();
        eprintln!(
            "{}",
            "⚠ 中断要求を受け付けました。実行中のアプリが終わり次第停止します（もう一度押すと強制終了）"
                .yellow()
        );
        tx.send(true).ok();

        if wait_for_signal().await.is_ok() {
            info!("Second interrupt, exiting immediately");
            std::process::exit(130);
        }
    });

    rx
}

async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received SIGINT (Ctrl+C)");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM");
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
        Ok(())
    }
}
