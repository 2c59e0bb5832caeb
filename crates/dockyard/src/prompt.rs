//! inquire によるターミナル入力

use dockyard_core::{ALL_UNITS, CoreError, Prompter, Result};
use inquire::{Confirm, InquireError, Select, Text};

pub struct TerminalPrompter;

fn prompt_error(e: InquireError) -> CoreError {
    match e {
        InquireError::OperationCanceled | InquireError::OperationInterrupted => {
            CoreError::Prompt("入力がキャンセルされました".to_string())
        }
        other => CoreError::Prompt(other.to_string()),
    }
}

impl Prompter for TerminalPrompter {
    fn select_unit(&self, candidates: &[&str]) -> Result<String> {
        let mut items: Vec<String> = vec![ALL_UNITS.to_string()];
        items.extend(candidates.iter().map(|c| c.to_string()));

        Select::new("ビルドするアプリを選択してください", items)
            .with_starting_cursor(0)
            .with_page_size(12)
            .with_help_message("↑↓ で移動、Enter で決定、ESC でキャンセル")
            .prompt()
            .map_err(prompt_error)
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        Confirm::new(prompt)
            .with_default(true)
            .prompt()
            .map_err(prompt_error)
    }

    fn read_line(&self, prompt: &str) -> Result<String> {
        Text::new(prompt).prompt().map_err(prompt_error)
    }
}
