//! Dockyard build
//!
//! 選択されたアプリのイメージをビルドし、レジストリへプッシュします。
//! Docker Engine とのやり取りは [`ImageBackend`] の背後に隠れています。

pub mod auth;
pub mod backend;
pub mod context;
pub mod docker;
pub mod error;
pub mod fakes;
pub mod orchestrator;
pub mod progress;
pub mod summary;

pub use auth::{RegistryAuth, extract_registry};
pub use backend::{ImageBackend, ImageInfo};
pub use context::{BuildContext, ContextBuilder};
pub use docker::{DockerBackend, split_image_tag, validate_tag};
pub use error::{BuildError, Result};
pub use orchestrator::{BuildOrchestrator, ImageNaming, RunOptions};
pub use progress::BuildProgress;
pub use summary::{BuildResult, Outcome, RunSummary};
