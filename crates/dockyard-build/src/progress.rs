use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// ビルド中に最新のステップを表示するスピナー
pub struct BuildProgress {
    bar: ProgressBar,
}

impl BuildProgress {
    pub fn new(image_ref: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(style);
        bar.set_message(format!("Building {}...", image_ref));
        bar.enable_steady_tick(Duration::from_millis(120));

        Self { bar }
    }

    /// `Step 3/9 : RUN cargo build` のような行だけを表示に反映する
    pub fn observe(&self, line: &str) {
        let line = line.trim();
        if line.starts_with("Step ") || line.starts_with('#') {
            self.bar.set_message(line.to_string());
        }
    }

    /// スピナーを止めずに 1 行出力する
    pub fn println(&self, line: &str) {
        self.bar.println(line);
    }

    pub fn finish_success(&self, image_ref: &str) {
        self.bar.finish_with_message(format!("Built {} ✓", image_ref));
    }

    pub fn finish_error(&self, error: &str) {
        self.bar.finish_with_message(format!("Build failed: {}", error));
    }
}
