//! Docker Engine を使う [`ImageBackend`] 実装

use crate::auth::RegistryAuth;
use crate::backend::{ImageBackend, ImageInfo};
use crate::context::ContextBuilder;
use crate::error::{BuildError, Result};
use crate::progress::BuildProgress;
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{BuildInfo, PushImageInfo};
use bytes::Bytes;
use colored::Colorize;
use futures_util::StreamExt;
use http_body_util::{Either, Full};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

pub struct DockerBackend {
    docker: Docker,
    auth: RegistryAuth,
    verbose: bool,
}

impl DockerBackend {
    pub fn new(docker: Docker) -> Self {
        Self {
            docker,
            auth: RegistryAuth::new(),
            verbose: false,
        }
    }

    /// ローカルの Docker デーモンに接続し、ping で疎通を確認する
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        docker.ping().await?;
        debug!("Connected to Docker daemon");
        Ok(Self::new(docker))
    }

    pub fn with_auth(mut self, auth: RegistryAuth) -> Self {
        self.auth = auth;
        self
    }

    /// ビルドログをすべて出力する
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn handle_build_output(&self, output: BuildInfo, progress: &BuildProgress) -> Result<()> {
        if let Some(detail) = output.error_detail {
            let message = detail
                .message
                .or(output.error)
                .unwrap_or_else(|| "Unknown build error".to_string());
            return Err(BuildError::BuildFailed(message));
        }
        if let Some(error) = output.error {
            return Err(BuildError::BuildFailed(error));
        }

        if let Some(stream) = output.stream {
            if self.verbose {
                let line = stream.trim_end();
                if !line.is_empty() {
                    progress.println(line);
                }
            }
            progress.observe(&stream);
        }
        if let Some(status) = output.status
            && self.verbose
        {
            progress.println(&status.cyan().to_string());
        }
        Ok(())
    }

    fn handle_push_progress(&self, info: &PushImageInfo, last_status: &mut String) {
        let Some(status) = &info.status else {
            return;
        };

        match status.as_str() {
            "Pushing" => {
                if self.verbose {
                    let progress = info.progress.as_deref().unwrap_or("");
                    print!("\r    ↑ {} {}     ", status, progress);
                    std::io::stdout().flush().ok();
                }
            }
            "Pushed" | "Layer already exists" => {
                if self.verbose {
                    println!("\r    {} {}                    ", "✓".green(), status);
                }
            }
            "Preparing" | "Waiting" => {}
            _ => {
                if status != last_status {
                    debug!(%status, "Push status");
                    *last_status = status.clone();
                }
            }
        }
    }
}

#[async_trait]
impl ImageBackend for DockerBackend {
    async fn build(&self, context: &Path, dockerfile: &Path, image_ref: &str) -> Result<()> {
        let (_, tag) = split_image_tag(image_ref);
        validate_tag(&tag)?;

        let (context_dir, dockerfile_path) = (context.to_path_buf(), dockerfile.to_path_buf());
        let build_context = tokio::task::spawn_blocking(move || {
            ContextBuilder::create_context(&context_dir, &dockerfile_path)
        })
        .await
        .map_err(|e| BuildError::BuildFailed(format!("context task failed: {}", e)))??;

        info!(image = image_ref, dockerfile = %build_context.dockerfile, "Building image");

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions {
            dockerfile: build_context.dockerfile.as_str(),
            t: image_ref,
            rm: true,
            forcerm: true,
            pull: true,
            ..Default::default()
        };

        let body = Full::new(Bytes::from(build_context.archive));
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        let progress = BuildProgress::new(image_ref);
        while let Some(message) = stream.next().await {
            let outcome = match message {
                Ok(output) => self.handle_build_output(output, &progress),
                Err(e) => Err(BuildError::DockerConnection(e)),
            };
            if let Err(e) = outcome {
                progress.finish_error(&e.to_string());
                return Err(e);
            }
        }

        progress.finish_success(image_ref);
        info!(image = image_ref, "Image built");
        Ok(())
    }

    async fn tag_local(&self, src: &str, dst: &str) -> Result<()> {
        let (repo, tag) = split_image_tag(dst);
        validate_tag(&tag)?;

        #[allow(deprecated)]
        let options = bollard::image::TagImageOptions {
            repo: repo.as_str(),
            tag: tag.as_str(),
        };

        self.docker
            .tag_image(src, Some(options))
            .await
            .map_err(|e| BuildError::TagFailed {
                source_ref: src.to_string(),
                target_ref: dst.to_string(),
                message: e.to_string(),
            })?;

        debug!(src, dst, "Tagged image");
        Ok(())
    }

    async fn push(&self, image_ref: &str) -> Result<()> {
        let (repo, tag) = split_image_tag(image_ref);
        validate_tag(&tag)?;

        let credentials = self.auth.get_credentials(image_ref)?;

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> { tag: tag.clone() };

        println!("  → {}", image_ref.cyan());
        info!(image = image_ref, "Pushing image");

        #[allow(deprecated)]
        let mut stream = self.docker.push_image(&repo, Some(options), credentials);

        let mut last_status = String::new();
        let mut error_message: Option<String> = None;

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(err) = &info.error {
                        error_message = Some(err.clone());
                    } else {
                        self.handle_push_progress(&info, &mut last_status);
                    }
                }
                Err(e) => {
                    return Err(BuildError::PushFailed {
                        message: e.to_string(),
                    });
                }
            }
        }

        if self.verbose {
            println!();
        }

        if let Some(message) = error_message {
            return Err(BuildError::PushFailed { message });
        }

        info!(image = image_ref, "Image pushed");
        Ok(())
    }

    async fn inspect_local(&self, image_ref: &str) -> Result<ImageInfo> {
        match self.docker.inspect_image(image_ref).await {
            Ok(inspect) => Ok(ImageInfo {
                id: inspect.id.unwrap_or_default(),
                size: inspect.size,
                tags: inspect.repo_tags.unwrap_or_default(),
            }),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(BuildError::ImageNotFound(image_ref.to_string())),
            Err(e) => Err(BuildError::DockerConnection(e)),
        }
    }
}

/// Docker のタグ制約を検証する
///
/// 128 文字以下、英数字と `.` `-` `_` のみ、先頭は `.` `-` 以外。
pub fn validate_tag(tag: &str) -> Result<()> {
    if tag.is_empty() {
        return Err(BuildError::InvalidTag {
            tag: "(empty)".to_string(),
        });
    }

    if tag.len() > 128 {
        return Err(BuildError::InvalidTag {
            tag: format!("Tag too long ({} characters, max 128)", tag.len()),
        });
    }

    if tag.starts_with('.') || tag.starts_with('-') {
        return Err(BuildError::InvalidTag {
            tag: tag.to_string(),
        });
    }

    if let Some(c) = tag
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '-' | '_'))
    {
        return Err(BuildError::InvalidTag {
            tag: format!("Invalid character '{}' in tag: {}", c, tag),
        });
    }

    Ok(())
}

/// イメージ参照をリポジトリとタグに分ける
///
/// - `ghcr.io/acme/mono/api:v1` -> (`ghcr.io/acme/mono/api`, `v1`)
/// - `localhost:5000/api` -> (`localhost:5000/api`, `latest`)
pub fn split_image_tag(image: &str) -> (String, String) {
    if let Some((repo, tag)) = image.rsplit_once(':')
        && !tag.contains('/')
    {
        return (repo.to_string(), tag.to_string());
    }

    (image.to_string(), "latest".to_string())
}
