//! quizsync configuration and backend factories.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use quizsync_core::store::{ResultStoreConfig, DEFAULT_HISTORY_KEY};
use quizsync_core::traits::{QuestionSource, RemoteStore};

use crate::firestore::FirestoreRemote;
use crate::questions::HttpQuestionSource;

/// Values shipped in the starter config; treated as "not configured".
const PLACEHOLDER_API_KEY: &str = "YOUR_API_KEY_HERE";
const PLACEHOLDER_PROJECT_ID: &str = "your-project-id";

/// Connection parameters for the remote store.
///
/// Note: Custom Debug impl masks secrets to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RemoteConfig {
    Firestore {
        project_id: String,
        api_key: String,
        #[serde(default)]
        auth_domain: Option<String>,
        #[serde(default)]
        storage_bucket: Option<String>,
        #[serde(default)]
        messaging_sender_id: Option<String>,
        #[serde(default)]
        app_id: Option<String>,
        #[serde(default = "default_database")]
        database: String,
        #[serde(default)]
        base_url: Option<String>,
        /// ID token of the signed-in user, sent as a bearer token.
        #[serde(default)]
        auth_token: Option<String>,
    },
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteConfig::Firestore {
                project_id,
                api_key: _,
                auth_domain,
                storage_bucket,
                messaging_sender_id,
                app_id,
                database,
                base_url,
                auth_token,
            } => f
                .debug_struct("Firestore")
                .field("project_id", project_id)
                .field("api_key", &"***")
                .field("auth_domain", auth_domain)
                .field("storage_bucket", storage_bucket)
                .field("messaging_sender_id", messaging_sender_id)
                .field("app_id", app_id)
                .field("database", database)
                .field("base_url", base_url)
                .field("auth_token", &auth_token.as_ref().map(|_| "***"))
                .finish(),
        }
    }
}

impl RemoteConfig {
    /// Whether the config names a real project and key rather than the
    /// starter placeholders or empty strings.
    pub fn is_usable(&self) -> bool {
        match self {
            RemoteConfig::Firestore {
                project_id,
                api_key,
                ..
            } => {
                !api_key.trim().is_empty()
                    && api_key != PLACEHOLDER_API_KEY
                    && !project_id.trim().is_empty()
                    && project_id != PLACEHOLDER_PROJECT_ID
            }
        }
    }
}

fn default_database() -> String {
    "(default)".to_string()
}

/// Top-level quizsync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizsyncConfig {
    /// Directory holding the local history.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Storage key of the history array.
    #[serde(default = "default_history_key")]
    pub history_key: String,
    /// Base URL question banks are served from (`{base}/data/{name}`).
    #[serde(default = "default_question_base_url")]
    pub question_base_url: String,
    /// Timeout for every remote and question bank request.
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    /// Max concurrent uploads during a sync sweep.
    #[serde(default = "default_sync_parallelism")]
    pub sync_parallelism: usize,
    /// Remote store; absent means local-only.
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./.quizsync")
}
fn default_history_key() -> String {
    DEFAULT_HISTORY_KEY.to_string()
}
fn default_question_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_sync_parallelism() -> usize {
    4
}

impl Default for QuizsyncConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            history_key: default_history_key(),
            question_base_url: default_question_base_url(),
            request_timeout_secs: default_timeout(),
            sync_parallelism: default_sync_parallelism(),
            remote: None,
        }
    }
}

impl QuizsyncConfig {
    pub fn store_config(&self) -> ResultStoreConfig {
        ResultStoreConfig {
            history_key: self.history_key.clone(),
            sync_parallelism: self.sync_parallelism.max(1),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn resolve_opt(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|v| resolve_env_vars(v))
        .filter(|v| !v.is_empty())
}

/// Resolve env vars in a remote config.
fn resolve_remote_config(config: &RemoteConfig) -> RemoteConfig {
    match config {
        RemoteConfig::Firestore {
            project_id,
            api_key,
            auth_domain,
            storage_bucket,
            messaging_sender_id,
            app_id,
            database,
            base_url,
            auth_token,
        } => RemoteConfig::Firestore {
            project_id: resolve_env_vars(project_id),
            api_key: resolve_env_vars(api_key),
            auth_domain: resolve_opt(auth_domain),
            storage_bucket: resolve_opt(storage_bucket),
            messaging_sender_id: resolve_opt(messaging_sender_id),
            app_id: resolve_opt(app_id),
            database: resolve_env_vars(database),
            base_url: resolve_opt(base_url),
            auth_token: resolve_opt(auth_token),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `quizsync.toml` in the current directory
/// 2. `~/.config/quizsync/config.toml`
///
/// Environment variable overrides: `QUIZSYNC_PROJECT_ID`, `QUIZSYNC_API_KEY`,
/// `QUIZSYNC_AUTH_TOKEN`.
pub fn load_config() -> Result<QuizsyncConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<QuizsyncConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("quizsync.toml");
        if local.exists() {
            Some(local)
        } else if let Some(home) = dirs_path() {
            let global = home.join("config.toml");
            if global.exists() {
                Some(global)
            } else {
                None
            }
        } else {
            None
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<QuizsyncConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => QuizsyncConfig::default(),
    };

    apply_env_overrides(&mut config);
    config.remote = config.remote.as_ref().map(resolve_remote_config);

    Ok(config)
}

fn apply_env_overrides(config: &mut QuizsyncConfig) {
    let project = std::env::var("QUIZSYNC_PROJECT_ID").ok();
    let key = std::env::var("QUIZSYNC_API_KEY").ok();
    let token = std::env::var("QUIZSYNC_AUTH_TOKEN").ok();

    if config.remote.is_none() && (project.is_some() || key.is_some()) {
        config.remote = Some(RemoteConfig::Firestore {
            project_id: String::new(),
            api_key: String::new(),
            auth_domain: None,
            storage_bucket: None,
            messaging_sender_id: None,
            app_id: None,
            database: default_database(),
            base_url: None,
            auth_token: None,
        });
    }

    if let Some(RemoteConfig::Firestore {
        project_id,
        api_key,
        auth_token,
        ..
    }) = config.remote.as_mut()
    {
        if let Some(project) = project {
            *project_id = project;
        }
        if let Some(key) = key {
            *api_key = key;
        }
        if let Some(token) = token {
            *auth_token = Some(token);
        }
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("quizsync"))
}

/// Create the remote store, or `None` when no usable remote is configured.
///
/// A missing or placeholder configuration is not an error: the caller runs
/// in local-only mode.
pub fn create_remote(config: &QuizsyncConfig) -> Result<Option<Arc<dyn RemoteStore>>> {
    let Some(remote) = &config.remote else {
        warn!("no remote store configured, running in offline mode");
        return Ok(None);
    };
    if !remote.is_usable() {
        warn!("remote store configuration is incomplete, running in offline mode");
        return Ok(None);
    }

    match remote {
        RemoteConfig::Firestore {
            project_id,
            api_key,
            database,
            base_url,
            auth_token,
            ..
        } => {
            let mut firestore = FirestoreRemote::new(
                project_id,
                api_key,
                base_url.clone(),
                config.request_timeout_secs,
            )?
            .with_database(database);
            if let Some(token) = auth_token {
                firestore = firestore.with_auth_token(token);
            }
            info!(project = %project_id, "remote store initialized");
            Ok(Some(Arc::new(firestore)))
        }
    }
}

/// Create the HTTP question bank source.
pub fn create_question_source(config: &QuizsyncConfig) -> Result<Arc<dyn QuestionSource>> {
    let source = HttpQuestionSource::new(&config.question_base_url, config.request_timeout_secs)?;
    Ok(Arc::new(source))
}
