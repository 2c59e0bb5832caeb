//! レジストリ認証
//!
//! Docker CLI の config.json を読み、プッシュ用の認証情報とログイン状態を判定する。

use crate::error::{BuildError, Result};
use base64::Engine;
use bollard::auth::DockerCredentials;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

const DOCKER_HUB: &str = "docker.io";
/// Docker Hub の認証情報は歴史的にこのキーで保存される
const DOCKER_HUB_AUTH_KEY: &str = "https://index.docker.io/v1/";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    /// レジストリごとの credential helper
    #[serde(default)]
    cred_helpers: HashMap<String, String>,
    #[serde(default)]
    creds_store: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    /// Base64 の "username:password"
    auth: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HelperResponse {
    username: String,
    secret: String,
}

#[derive(Debug, Clone)]
pub struct RegistryAuth {
    config_path: PathBuf,
}

impl Default for RegistryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryAuth {
    /// `$DOCKER_CONFIG/config.json`、なければ `~/.docker/config.json`
    pub fn new() -> Self {
        let dir = std::env::var_os("DOCKER_CONFIG")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".docker")))
            .unwrap_or_else(|| PathBuf::from(".docker"));

        Self {
            config_path: dir.join("config.json"),
        }
    }

    pub fn with_config_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// `registry` に対してログイン済みとみなせるか
    ///
    /// auths のエントリかレジストリ別 helper があれば真。
    /// 共通の credsStore は `list` で登録済みのサーバーを確認する。
    pub fn is_logged_in(&self, registry: &str) -> bool {
        let config = match self.load_config() {
            Ok(Some(config)) => config,
            Ok(None) => return false,
            Err(e) => {
                debug!(error = %e, "Could not read docker config");
                return false;
            }
        };

        let keys = auth_keys(registry);
        if keys.iter().any(|key| {
            config.auths.contains_key(*key) || config.cred_helpers.contains_key(*key)
        }) {
            return true;
        }

        let Some(store) = &config.creds_store else {
            return false;
        };
        match list_helper(store) {
            Ok(servers) => servers.iter().any(|server| {
                keys.iter()
                    .any(|key| normalize_server(server) == normalize_server(key))
            }),
            Err(e) => {
                debug!(%registry, helper = %store, error = %e, "Could not list credsStore entries");
                false
            }
        }
    }

    /// イメージ参照からレジストリの認証情報を取得
    ///
    /// 認証情報がなければ `Ok(None)` を返し、匿名でのプッシュを試みる。
    pub fn get_credentials(&self, image: &str) -> Result<Option<DockerCredentials>> {
        let registry = extract_registry(image);

        let Some(config) = self.load_config()? else {
            debug!(path = %self.config_path.display(), "Docker config not found");
            return Ok(None);
        };

        for key in auth_keys(&registry) {
            if let Some(helper) = config.cred_helpers.get(key)
                && let Some(creds) = run_helper(helper, key)?
            {
                debug!(%registry, %helper, "Using registry credential helper");
                return Ok(Some(creds));
            }

            if let Some(entry) = config.auths.get(key)
                && let Some(encoded) = &entry.auth
                && let Some(creds) = decode_auth(encoded, &registry)?
            {
                debug!(%registry, "Using credentials from auths");
                return Ok(Some(creds));
            }
        }

        if let Some(store) = &config.creds_store {
            for key in auth_keys(&registry) {
                // 共通 helper の失敗は致命的にしない
                if let Ok(Some(creds)) = run_helper(store, key) {
                    debug!(%registry, helper = %store, "Using credsStore");
                    return Ok(Some(creds));
                }
            }
        }

        debug!(%registry, "No credentials found");
        Ok(None)
    }

    fn load_config(&self) -> Result<Option<DockerConfig>> {
        if !self.config_path.is_file() {
            return Ok(None);
        }

        let content =
            std::fs::read_to_string(&self.config_path).map_err(|e| BuildError::AuthFailed {
                registry: self.config_path.display().to_string(),
                message: format!("Failed to read config.json: {}", e),
            })?;

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| BuildError::AuthFailed {
                registry: self.config_path.display().to_string(),
                message: format!("Failed to parse config.json: {}", e),
            })
    }
}

/// config.json 上で `registry` を指しうるキー
fn auth_keys(registry: &str) -> Vec<&str> {
    if registry == DOCKER_HUB {
        vec![DOCKER_HUB, DOCKER_HUB_AUTH_KEY]
    } else {
        vec![registry]
    }
}

/// イメージ参照からレジストリのホスト部分を取り出す
///
/// - `ghcr.io/org/app:tag` -> `ghcr.io`
/// - `localhost:5000/app` -> `localhost:5000`
/// - `org/app` -> `docker.io`
pub fn extract_registry(image: &str) -> String {
    match image.split_once('/') {
        Some((first, _)) if first.contains('.') || first.contains(':') || first == "localhost" => {
            first.to_string()
        }
        _ => DOCKER_HUB.to_string(),
    }
}

fn decode_auth(encoded: &str, registry: &str) -> Result<Option<DockerCredentials>> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| BuildError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Failed to decode auth: {}", e),
        })?;

    let text = String::from_utf8(decoded).map_err(|e| BuildError::AuthFailed {
        registry: registry.to_string(),
        message: format!("Invalid UTF-8 in auth: {}", e),
    })?;

    Ok(text
        .split_once(':')
        .map(|(username, password)| DockerCredentials {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            serveraddress: Some(registry.to_string()),
            ..Default::default()
        }))
}

/// `https://ghcr.io/` と `ghcr.io` を同じサーバーとして扱う
fn normalize_server(server: &str) -> &str {
    server
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
}

/// `docker-credential-<helper> <action>` を実行し、成功時の標準出力を返す
fn helper_output(helper: &str, action: &str, input: &str) -> Result<Option<Vec<u8>>> {
    let program = format!("docker-credential-{}", helper);

    let mut child = Command::new(&program)
        .arg(action)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| BuildError::AuthFailed {
            registry: if input.is_empty() { helper } else { input }.to_string(),
            message: format!("Failed to run {}: {}", program, e),
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes())?;
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        debug!(
            %program,
            %action,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "Credential helper returned an error"
        );
        return Ok(None);
    }
    Ok(Some(output.stdout))
}

/// `docker-credential-<helper> get` を実行する
fn run_helper(helper: &str, server: &str) -> Result<Option<DockerCredentials>> {
    let Some(stdout) = helper_output(helper, "get", server)? else {
        return Ok(None);
    };

    let response: HelperResponse =
        serde_json::from_slice(&stdout).map_err(|e| BuildError::AuthFailed {
            registry: server.to_string(),
            message: format!("Unexpected credential helper response: {}", e),
        })?;

    Ok(Some(DockerCredentials {
        username: Some(response.username),
        password: Some(response.secret),
        serveraddress: Some(server.to_string()),
        ..Default::default()
    }))
}

/// `docker-credential-<helper> list` に登録されたサーバー
fn list_helper(helper: &str) -> Result<Vec<String>> {
    let Some(stdout) = helper_output(helper, "list", "")? else {
        return Ok(Vec::new());
    };

    let servers: HashMap<String, String> =
        serde_json::from_slice(&stdout).map_err(|e| BuildError::AuthFailed {
            registry: helper.to_string(),
            message: format!("Unexpected credential helper list: {}", e),
        })?;
    Ok(servers.into_keys().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn auth_with(content: &str) -> (tempfile::TempDir, RegistryAuth) {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, content).unwrap();
        (temp_dir, RegistryAuth::with_config_path(path))
    }

    #[test]
    fn test_extract_registry() {
        assert_eq!(extract_registry("ghcr.io/acme/mono/api:v1"), "ghcr.io");
        assert_eq!(extract_registry("localhost:5000/app"), "localhost:5000");
        assert_eq!(extract_registry("localhost/app"), "localhost");
        assert_eq!(
            extract_registry("123456789.dkr.ecr.ap-northeast-1.amazonaws.com/app"),
            "123456789.dkr.ecr.ap-northeast-1.amazonaws.com"
        );
        assert_eq!(extract_registry("mono/api:local"), "docker.io");
        assert_eq!(extract_registry("nginx"), "docker.io");
    }

    #[test]
    fn test_credentials_from_auths() {
        // "robot:s3cret"
        let (_dir, auth) =
            auth_with(r#"{"auths":{"ghcr.io":{"auth":"cm9ib3Q6czNjcmV0"}}}"#);

        let creds = auth.get_credentials("ghcr.io/acme/api:v1").unwrap().unwrap();
        assert_eq!(creds.username.as_deref(), Some("robot"));
        assert_eq!(creds.password.as_deref(), Some("s3cret"));
        assert_eq!(creds.serveraddress.as_deref(), Some("ghcr.io"));
    }

    #[test]
    fn test_no_config_means_anonymous() {
        let temp_dir = tempfile::tempdir().unwrap();
        let auth = RegistryAuth::with_config_path(temp_dir.path().join("missing.json"));

        assert!(auth.get_credentials("ghcr.io/acme/api:v1").unwrap().is_none());
        assert!(!auth.is_logged_in("ghcr.io"));
    }

    #[test]
    fn test_is_logged_in() {
        let (_dir, auth) = auth_with(
            r#"{
                "auths": {"ghcr.io": {}},
                "credHelpers": {"123.dkr.ecr.us-east-1.amazonaws.com": "ecr-login"}
            }"#,
        );

        assert!(auth.is_logged_in("ghcr.io"));
        assert!(auth.is_logged_in("123.dkr.ecr.us-east-1.amazonaws.com"));
        assert!(!auth.is_logged_in("quay.io"));
    }

    #[test]
    fn test_docker_hub_legacy_key() {
        let (_dir, auth) = auth_with(r#"{"auths":{"https://index.docker.io/v1/":{}}}"#);
        assert!(auth.is_logged_in("docker.io"));
    }

    #[test]
    fn test_creds_store_without_helper_is_not_logged_in() {
        let (_dir, auth) = auth_with(r#"{"credsStore":"dockyard-missing-helper"}"#);
        assert!(!auth.is_logged_in("ghcr.io"));
    }

    #[test]
    fn test_normalize_server() {
        assert_eq!(normalize_server("https://ghcr.io/"), "ghcr.io");
        assert_eq!(normalize_server("ghcr.io"), "ghcr.io");
        assert_eq!(
            normalize_server(DOCKER_HUB_AUTH_KEY),
            "index.docker.io/v1"
        );
    }

    #[cfg(unix)]
    #[test]
    #[serial_test::serial]
    fn test_creds_store_is_scoped_to_registry() {
        use std::os::unix::fs::PermissionsExt;

        let bin_dir = tempfile::tempdir().unwrap();
        let helper = bin_dir.path().join("docker-credential-dockyard-test");
        fs::write(
            &helper,
            r#"#!/bin/sh
case "$1" in
  list)
    echo '{"https://ghcr.io":"robot","https://index.docker.io/v1/":"me"}'
    ;;
  get)
    read -r server
    if [ "$server" = "ghcr.io" ]; then
      echo '{"ServerURL":"ghcr.io","Username":"robot","Secret":"s3cret"}'
    else
      echo "credentials not found in native keychain" >&2
      exit 1
    fi
    ;;
esac
"#,
        )
        .unwrap();
        fs::set_permissions(&helper, fs::Permissions::from_mode(0o755)).unwrap();

        let path = std::env::join_paths(
            std::iter::once(bin_dir.path().to_path_buf())
                .chain(std::env::split_paths(&std::env::var_os("PATH").unwrap_or_default())),
        )
        .unwrap();

        let (_dir, auth) = auth_with(r#"{"credsStore":"dockyard-test"}"#);
        temp_env::with_var("PATH", Some(path), || {
            assert!(auth.is_logged_in("ghcr.io"));
            assert!(auth.is_logged_in("docker.io"));
            assert!(!auth.is_logged_in("quay.io"));

            let creds = auth.get_credentials("ghcr.io/acme/api:v1").unwrap().unwrap();
            assert_eq!(creds.username.as_deref(), Some("robot"));
            assert!(auth.get_credentials("quay.io/acme/api:v1").unwrap().is_none());
        });
    }

    #[test]
    #[serial_test::serial]
    fn test_docker_config_env() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(
            temp_dir.path().join("config.json"),
            r#"{"auths":{"registry.example.com":{}}}"#,
        )
        .unwrap();

        temp_env::with_var("DOCKER_CONFIG", Some(temp_dir.path()), || {
            let auth = RegistryAuth::new();
            assert_eq!(auth.config_path(), temp_dir.path().join("config.json"));
            assert!(auth.is_logged_in("registry.example.com"));
        });
    }

    #[test]
    fn test_malformed_config() {
        let (_dir, auth) = auth_with("{not json");

        assert!(matches!(
            auth.get_credentials("ghcr.io/acme/api:v1"),
            Err(BuildError::AuthFailed { .. })
        ));
        assert!(!auth.is_logged_in("ghcr.io"));
    }
}
