//! アプリ自動発見機能
//!
//! `apps/<name>/Dockerfile` の規約に従ってビルド可能なアプリを発見します。

use crate::error::{CoreError, Result};
use crate::model::{Unit, UnitSelection};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// イメージリポジトリ名の1コンポーネントとして有効な名前
static UNIT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*$").expect("valid regex"));

/// 発見されたアプリの一覧（名前の辞書順）
#[derive(Debug, Clone, Default)]
pub struct AppCatalog {
    root: PathBuf,
    units: Vec<Unit>,
}

impl AppCatalog {
    /// `apps_root` 直下のサブディレクトリからアプリを発見
    ///
    /// `descriptor`（通常は `Dockerfile`）を含むディレクトリだけがアプリになる。
    /// `apps_root` が存在しない場合は空のカタログを返す。
    #[tracing::instrument(skip(apps_root), fields(apps_root = %apps_root.display()))]
    pub fn discover(apps_root: &Path, descriptor: &str) -> Result<Self> {
        let mut units = Vec::new();

        if !apps_root.is_dir() {
            debug!("Apps root does not exist, catalog is empty");
            return Ok(Self {
                root: apps_root.to_path_buf(),
                units,
            });
        }

        let entries = std::fs::read_dir(apps_root).map_err(|source| CoreError::Discovery {
            path: apps_root.to_path_buf(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| CoreError::Discovery {
                path: apps_root.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                warn!(dir = %path.display(), "Skipping directory with non UTF-8 name");
                continue;
            };

            let dockerfile = path.join(descriptor);
            if !dockerfile.is_file() {
                debug!(unit = %name, "No {} found, not a buildable app", descriptor);
                continue;
            }

            if !is_valid_unit_name(name) {
                warn!(
                    unit = %name,
                    "Skipping app: name is not a valid image repository component"
                );
                continue;
            }

            debug!(unit = %name, dockerfile = %dockerfile.display(), "Found app");
            units.push(Unit::new(name.to_string(), dockerfile));
        }

        units.sort_by(|a, b| a.name().cmp(b.name()));
        info!(unit_count = units.len(), "Discovered apps");

        Ok(Self {
            root: apps_root.to_path_buf(),
            units,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn names(&self) -> Vec<&str> {
        self.units.iter().map(Unit::name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// 名前がカタログに含まれているか
    pub fn validate(&self, name: &str) -> bool {
        self.units.iter().any(|u| u.name() == name)
    }

    pub fn get(&self, name: &str) -> Result<&Unit> {
        self.units
            .iter()
            .find(|u| u.name() == name)
            .ok_or_else(|| CoreError::not_found(name, &self.names()))
    }

    /// 指定に従ってアプリを選択（カタログ順）
    pub fn select(&self, selection: &UnitSelection) -> Result<Vec<Unit>> {
        match selection {
            UnitSelection::All => Ok(self.units.clone()),
            UnitSelection::Named(name) => Ok(vec![self.get(name)?.clone()]),
        }
    }
}

/// アプリ名がイメージ参照に使える形式か
pub fn is_valid_unit_name(name: &str) -> bool {
    UNIT_NAME.is_match(name)
}
