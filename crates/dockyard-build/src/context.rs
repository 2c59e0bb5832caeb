//! ビルドコンテキストの tar.gz 作成

use crate::error::{BuildError, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use glob::{MatchOptions, Pattern};
use std::fs;
use std::path::Path;
use tar::Builder;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// コンテキスト外の Dockerfile を同梱するときのパス
pub const INJECTED_DOCKERFILE: &str = ".dockyard.Dockerfile";

const IGNORE_FILE: &str = ".dockerignore";
const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024;

/// `*` はパス区切りをまたがない。`**` だけが複数階層に一致する
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Docker Engine に送るビルドコンテキスト
#[derive(Debug)]
pub struct BuildContext {
    /// gzip 圧縮済みの tar アーカイブ
    pub archive: Vec<u8>,
    /// アーカイブ内での Dockerfile のパス
    pub dockerfile: String,
}

pub struct ContextBuilder;

impl ContextBuilder {
    /// `context_path` 以下を tar.gz にまとめる
    ///
    /// `.git` と `.dockerignore` に一致するパスは含めない。
    /// シンボリックリンクはたどらず、リンクのまま格納する。
    pub fn create_context(context_path: &Path, dockerfile_path: &Path) -> Result<BuildContext> {
        if !context_path.is_dir() {
            return Err(BuildError::ContextNotFound(context_path.to_path_buf()));
        }
        if !dockerfile_path.is_file() {
            return Err(BuildError::DockerfileNotFound(dockerfile_path.to_path_buf()));
        }

        debug!(context = %context_path.display(), "Creating build context");
        let rules = IgnoreRules::load(context_path)?;

        let mut archive = Vec::new();
        let dockerfile;
        {
            let encoder = GzEncoder::new(&mut archive, Compression::default());
            let mut tar = Builder::new(encoder);
            tar.follow_symlinks(false);

            append_tree(&mut tar, context_path, &rules)?;

            dockerfile = match dockerfile_path.strip_prefix(context_path) {
                Ok(rel) if !rules.is_ignored(rel) => to_archive_path(rel),
                _ => {
                    let mut file = fs::File::open(dockerfile_path)?;
                    tar.append_file(INJECTED_DOCKERFILE, &mut file)?;
                    INJECTED_DOCKERFILE.to_string()
                }
            };

            tar.into_inner()?.finish()?;
        }

        debug!(bytes = archive.len(), %dockerfile, "Build context created");
        if archive.len() > MAX_CONTEXT_SIZE {
            warn!(
                "ビルドコンテキストが大きすぎます（{}MB）。.dockerignore で不要なファイルを除外してください",
                archive.len() / 1024 / 1024
            );
        }

        Ok(BuildContext {
            archive,
            dockerfile,
        })
    }
}

fn append_tree<W: std::io::Write>(
    tar: &mut Builder<W>,
    root: &Path,
    rules: &IgnoreRules,
) -> Result<()> {
    // アーカイブの中身を実行ごとに同じにする
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !entry.file_type().is_dir() || !rules.prunes(relative(root, entry.path()))
        });

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        let rel = relative(root, entry.path());
        if rules.is_ignored(rel) {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            tar.append_dir(rel, entry.path())?;
        } else if file_type.is_file() || file_type.is_symlink() {
            tar.append_path_with_name(entry.path(), rel)?;
        }
    }
    Ok(())
}

fn relative<'a>(root: &Path, path: &'a Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}

fn to_archive_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug)]
struct IgnoreRule {
    pattern: Pattern,
    /// `!` で始まる行（再包含）
    negated: bool,
}

impl IgnoreRule {
    /// パス自身か、その親ディレクトリのいずれかに一致するか
    fn matches(&self, rel: &Path) -> bool {
        rel.ancestors()
            .filter(|p| !p.as_os_str().is_empty())
            .any(|p| self.pattern.matches_with(&to_archive_path(p), MATCH_OPTIONS))
    }
}

/// `.dockerignore` の規則
///
/// 行は上から順に評価し、最後に一致した行が結果を決める。
#[derive(Debug, Default)]
struct IgnoreRules {
    rules: Vec<IgnoreRule>,
}

impl IgnoreRules {
    fn load(context_path: &Path) -> Result<Self> {
        let mut rules = Self::default();
        rules.push(".git", 0)?;

        let file = context_path.join(IGNORE_FILE);
        if file.is_file() {
            for (index, line) in fs::read_to_string(&file)?.lines().enumerate() {
                rules.push(line, index + 1)?;
            }
        }

        debug!(rules = rules.rules.len(), "Loaded ignore rules");
        Ok(rules)
    }

    fn push(&mut self, line: &str, line_number: usize) -> Result<()> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }

        let (negated, body) = match line.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, line),
        };
        let body = clean_pattern(body);
        if body.is_empty() {
            return Ok(());
        }

        let pattern = Pattern::new(body).map_err(|e| BuildError::InvalidIgnorePattern {
            pattern: line.to_string(),
            line: line_number,
            message: e.to_string(),
        })?;
        self.rules.push(IgnoreRule { pattern, negated });
        Ok(())
    }

    fn is_ignored(&self, rel: &Path) -> bool {
        self.rules
            .iter()
            .fold(false, |ignored, rule| if rule.matches(rel) { !rule.negated } else { ignored })
    }

    /// ディレクトリごと読み飛ばしてよいか
    ///
    /// 再包含の行があると配下のファイルが戻る可能性があるため、中まで見る。
    fn prunes(&self, dir: &Path) -> bool {
        self.is_ignored(dir) && !self.rules.iter().any(|rule| rule.negated)
    }
}

/// `./foo/`、`/foo` を `foo` にそろえる
fn clean_pattern(pattern: &str) -> &str {
    let mut pattern = pattern;
    while let Some(rest) = pattern.strip_prefix("./") {
        pattern = rest;
    }
    pattern.trim_start_matches('/').trim_end_matches('/')
}
