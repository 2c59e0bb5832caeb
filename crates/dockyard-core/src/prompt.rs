//! 対話入力の抽象化

use crate::error::Result;

/// 対話的な選択・確認を提供する
///
/// ターミナル実装は CLI 側にあり、テストではスクリプト化した実装を使う。
pub trait Prompter {
    /// 候補からアプリを1つ選ぶ。全アプリの場合は `"all"` を返す
    fn select_unit(&self, candidates: &[&str]) -> Result<String>;

    fn confirm(&self, prompt: &str) -> Result<bool>;

    fn read_line(&self, prompt: &str) -> Result<String>;
}
