use clap::Parser;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::rate_limit::{LimiterConfig, Limits};
use crate::secrets::{RemoteSecretStore, SecretSources};

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "videorag-gateway")]
#[command(about = "API key and rate limit gate for the Video-RAG backend")]
pub struct Args {
    // Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Dotenv file read before the process environment
    #[arg(long, default_value = ".env")]
    pub env_file: PathBuf,

    // Mounted secrets (Docker / Kubernetes)
    #[arg(long, env = "SECRETS_DIR", default_value = "/run/secrets")]
    pub secrets_dir: PathBuf,

    // Developer-local secret files, one per name
    #[arg(long, default_value = ".secrets")]
    pub local_secrets_dir: PathBuf,

    // Remote secret store base url, skipped when unset
    #[arg(long, env = "SECRET_STORE_URL")]
    pub secret_store_url: Option<String>,

    #[arg(long, env = "SECRET_STORE_TOKEN", hide_env_values = true)]
    pub secret_store_token: Option<String>,

    // Max requests per window, per policy
    #[arg(long, default_value_t = 30)]
    pub chat_limit: u32,

    #[arg(long, default_value_t = 10)]
    pub quiz_limit: u32,

    #[arg(long, default_value_t = 5)]
    pub process_limit: u32,

    // Rate limit window in seconds
    #[arg(long, default_value_t = 60)]
    pub rate_window: u64,

    // How often idle rate windows are evicted, in seconds
    #[arg(long, default_value_t = 60)]
    pub sweep_interval: u64,
}

impl Args {
    pub fn limits(&self) -> Result<Limits, ConfigError> {
        let window = Duration::from_secs(self.rate_window);
        Ok(Limits {
            chat: LimiterConfig::new(self.chat_limit, window)?,
            quiz: LimiterConfig::new(self.quiz_limit, window)?,
            process: LimiterConfig::new(self.process_limit, window)?,
        })
    }

    pub fn sweep_every(&self) -> Result<Duration, ConfigError> {
        if self.sweep_interval == 0 {
            return Err(ConfigError::InvalidValue {
                key: "sweep-interval",
                value: "0".into(),
                expected: "a positive number of seconds",
            });
        }
        Ok(Duration::from_secs(self.sweep_interval))
    }

    pub fn secret_sources(&self) -> SecretSources {
        let remote = self.secret_store_url.as_deref().and_then(|url| {
            RemoteSecretStore::new(url, self.secret_store_token.clone())
                .inspect_err(|e| tracing::warn!(error = %e, "remote secret store disabled"))
                .ok()
        });
        SecretSources {
            mounted_dir: self.secrets_dir.clone(),
            local_dir: self.local_secrets_dir.clone(),
            remote,
        }
    }
}

/// Application settings, resolved once at startup and read-only afterwards.
#[derive(Clone, PartialEq)]
pub struct Settings {
    pub app_name: String,
    pub debug: bool,
    pub database_url: String,
    pub chroma_persist_dir: PathBuf,
    pub openai_api_key: String,
    pub google_api_key: String,
    // "openai" or "google"
    pub llm_provider: String,
    // Key protecting the guarded endpoints; empty disables them
    pub api_key: String,
    pub upload_dir: PathBuf,
    pub max_file_size: u64,
    pub redis_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "Video-RAG API".to_string(),
            debug: true,
            database_url: "sqlite:///./videorag.db".to_string(),
            chroma_persist_dir: PathBuf::from("./chroma_db"),
            openai_api_key: String::new(),
            google_api_key: String::new(),
            llm_provider: "google".to_string(),
            api_key: String::new(),
            upload_dir: PathBuf::from("./uploads"),
            max_file_size: 500 * 1024 * 1024,
            redis_url: "redis://localhost:6379".to_string(),
        }
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            expected: "a boolean",
        }),
    }
}

/// Layer key/value sources, later layers winning. Keys are upper-cased.
pub fn merge_sources<I, L>(layers: L) -> HashMap<String, String>
where
    L: IntoIterator<Item = I>,
    I: IntoIterator<Item = (String, String)>,
{
    let mut merged = HashMap::new();
    for layer in layers {
        for (key, value) in layer {
            merged.insert(key.to_ascii_uppercase(), value);
        }
    }
    merged
}

fn read_env_file(path: &Path) -> Result<Vec<(String, String)>, ConfigError> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let pairs = dotenvy::from_path_iter(path)?.collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(path = %path.display(), entries = pairs.len(), "loaded env file");
    Ok(pairs)
}

impl Settings {
    /// Resolve settings from, lowest to highest: defaults, the env file,
    /// the process environment, then loaded secrets.
    pub fn load(env_file: &Path, secrets: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::load_layers(env_file, std::env::vars().collect(), secrets)
    }

    // Same as load, with the environment layer supplied by the caller
    pub fn load_layers(
        env_file: &Path,
        env: Vec<(String, String)>,
        secrets: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let file = read_env_file(env_file)?;
        let merged = merge_sources([file, env, secrets.into_iter().collect()]);
        Self::from_map(&merged)
    }

    // Values keyed by upper-case names; anything absent keeps its default
    pub fn from_map(values: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut s = Settings::default();
        let get = |k: &str| values.get(k).cloned();

        if let Some(v) = get("APP_NAME") {
            s.app_name = v;
        }
        if let Some(v) = get("DEBUG") {
            s.debug = parse_bool("DEBUG", &v)?;
        }
        if let Some(v) = get("DATABASE_URL") {
            s.database_url = v;
        }
        if let Some(v) = get("CHROMA_PERSIST_DIR") {
            s.chroma_persist_dir = PathBuf::from(v);
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            s.openai_api_key = v;
        }
        if let Some(v) = get("GOOGLE_API_KEY") {
            s.google_api_key = v;
        }
        if let Some(v) = get("LLM_PROVIDER") {
            s.llm_provider = v;
        }
        if let Some(v) = get("API_KEY") {
            s.api_key = v;
        }
        if let Some(v) = get("UPLOAD_DIR") {
            s.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = get("MAX_FILE_SIZE") {
            s.max_file_size = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "MAX_FILE_SIZE",
                value: v.clone(),
                expected: "a byte count",
            })?;
        }
        if let Some(v) = get("REDIS_URL") {
            s.redis_url = v;
        }
        Ok(s)
    }

    // Upload and vector store directories must exist before serving
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.upload_dir)?;
        std::fs::create_dir_all(&self.chroma_persist_dir)?;
        Ok(())
    }
}

fn redact(value: &str) -> &str {
    if value.is_empty() { "" } else { "<redacted>" }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("app_name", &self.app_name)
            .field("debug", &self.debug)
            .field("database_url", &redact(&self.database_url))
            .field("chroma_persist_dir", &self.chroma_persist_dir)
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("google_api_key", &redact(&self.google_api_key))
            .field("llm_provider", &self.llm_provider)
            .field("api_key", &redact(&self.api_key))
            .field("upload_dir", &self.upload_dir)
            .field("max_file_size", &self.max_file_size)
            .field("redis_url", &redact(&self.redis_url))
            .finish()
    }
}
