//! Secret loading run once before settings are resolved.
//!
//! Sources are read in order and later ones override earlier ones: mounted
//! secret files, developer-local secret files, then the optional remote
//! store. Nothing here fails startup; unreadable or empty sources are
//! skipped.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SecretError;

// Names looked up as mounted or local secret files
pub const SECRET_NAMES: [&str; 5] = [
    "OPENAI_API_KEY",
    "GOOGLE_API_KEY",
    "API_KEY",
    "DATABASE_URL",
    "REDIS_URL",
];

// (remote secret id, settings name)
pub const REMOTE_SECRETS: [(&str, &str); 2] = [
    ("video-rag/openai", "OPENAI_API_KEY"),
    ("video-rag/google", "GOOGLE_API_KEY"),
];

const REMOTE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct SecretSources {
    pub mounted_dir: PathBuf,
    pub local_dir: PathBuf,
    pub remote: Option<RemoteSecretStore>,
}

// Trimmed file contents, None when missing, unreadable or blank
fn read_secret_file(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let value = contents.trim();
            (!value.is_empty()).then(|| value.to_string())
        }
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = %path.display(), error = %e, "skipping unreadable secret file");
            }
            None
        }
    }
}

/// Mounted secrets: `<dir>/<NAME>`, falling back to `<dir>/<name>`.
pub fn load_mounted(dir: &Path, names: &[&str]) -> HashMap<String, String> {
    names
        .iter()
        .filter_map(|&name| {
            [name.to_string(), name.to_lowercase()]
                .iter()
                .find_map(|candidate| read_secret_file(&dir.join(candidate)))
                .map(|value| (name.to_string(), value))
        })
        .collect()
}

/// Local secrets: `<dir>/<NAME>` only.
pub fn load_local(dir: &Path, names: &[&str]) -> HashMap<String, String> {
    names
        .iter()
        .filter_map(|&name| read_secret_file(&dir.join(name)).map(|value| (name.to_string(), value)))
        .collect()
}

// Body returned by the store for one secret id
#[derive(Deserialize, Debug)]
struct SecretValue {
    #[serde(rename = "SecretString")]
    secret_string: Option<String>,
    #[serde(rename = "SecretBinary")]
    secret_binary: Option<String>,
}

impl SecretValue {
    // String wins; binary is base64 text holding UTF-8
    fn into_secret(self, id: &str) -> Result<String, SecretError> {
        let raw = match self.secret_string.filter(|s| !s.is_empty()) {
            Some(s) => s,
            None => match self.secret_binary.filter(|b| !b.is_empty()) {
                Some(b) => String::from_utf8(STANDARD.decode(b.trim())?)?,
                None => return Err(SecretError::Empty(id.to_string())),
            },
        };
        let value = raw.trim();
        if value.is_empty() {
            return Err(SecretError::Empty(id.to_string()));
        }
        Ok(value.to_string())
    }
}

/// HTTP client for a secrets-manager style store: `GET {base}/secrets/{id}`.
#[derive(Debug, Clone)]
pub struct RemoteSecretStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RemoteSecretStore {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, SecretError> {
        let client = reqwest::Client::builder().timeout(REMOTE_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub async fn fetch(&self, id: &str) -> Result<String, SecretError> {
        let mut request = self.client.get(format!("{}/secrets/{}", self.base_url, id));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let body: SecretValue = request.send().await?.error_for_status()?.json().await?;
        body.into_secret(id)
    }
}

/// Fetch each `(id, name)` pair, skipping any that fail.
pub async fn load_remote(store: &RemoteSecretStore, pairs: &[(&str, &str)]) -> HashMap<String, String> {
    let mut found = HashMap::new();
    for &(id, name) in pairs {
        match store.fetch(id).await {
            Ok(value) => {
                found.insert(name.to_string(), value);
            }
            Err(e) => tracing::warn!(secret = id, error = %e, "remote secret unavailable"),
        }
    }
    found
}

/// Run every configured source and merge them, later sources winning.
pub async fn collect(sources: &SecretSources) -> HashMap<String, String> {
    let mounted = load_mounted(&sources.mounted_dir, &SECRET_NAMES);
    let local = load_local(&sources.local_dir, &SECRET_NAMES);
    let remote = match &sources.remote {
        Some(store) => load_remote(store, &REMOTE_SECRETS).await,
        None => HashMap::new(),
    };

    tracing::info!(
        mounted = mounted.len(),
        local = local.len(),
        remote = remote.len(),
        "secrets loaded"
    );

    let mut merged = mounted;
    merged.extend(local);
    merged.extend(remote);
    merged
}
