//! Dockyard core
//!
//! モノレポ内のアプリ発見、トリガーに応じたイメージタグの解決、
//! 変更パスに基づくビルド対象の選択を提供します。

pub mod changes;
pub mod discovery;
pub mod error;
pub mod model;
pub mod prompt;
pub mod tags;

pub use changes::ChangeDetector;
pub use discovery::{AppCatalog, is_valid_unit_name};
pub use error::{CoreError, Result};
pub use model::{ALL_UNITS, ChangeSet, TagSet, Trigger, Unit, UnitSelection};
pub use prompt::Prompter;
pub use tags::{TagResolver, sanitize_branch, short_sha};
