use std::{env, path::PathBuf, str::FromStr, time::Duration};

use reqwest::blocking::Client as HttpClient;
use teams_aad_core::{CatalogError, PermissionCatalog};

use crate::{
    backend::{DEFAULT_APP_STUDIO_BASE_URL, DEFAULT_GRAPH_BASE_URL, DEFAULT_HTTP_TIMEOUT, Endpoints},
    context::{
        ClientCredentialsTokenProvider, DEFAULT_LOGIN_BASE_URL, StaticTokenProvider, TokenProvider,
    },
    retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, RetryPolicy},
};

pub const DEFAULT_ENV: &str = "dev";
pub const DEFAULT_STATE_DIR_NAME: &str = ".teams-aad";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// How translated permissions are applied to an existing registration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PermissionPolicy {
    /// Overwrite `requiredResourceAccess` with the declared list.
    #[default]
    Replace,
    /// Add declared entries while keeping everything already granted.
    Merge,
}

impl FromStr for PermissionPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(PermissionPolicy::Replace),
            "merge" => Ok(PermissionPolicy::Merge),
            other => Err(ConfigError::InvalidConfig(format!(
                "AAD_PERMISSION_POLICY must be `replace` or `merge`, got `{other}`"
            ))),
        }
    }
}

/// Where bearer tokens come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenSettings {
    Static {
        graph_token: Option<String>,
        app_studio_token: Option<String>,
        tenant_id: Option<String>,
    },
    ClientCredentials {
        login_base_url: String,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

impl TokenSettings {
    pub fn provider(&self, timeout: Duration) -> Result<Box<dyn TokenProvider>, ConfigError> {
        Ok(match self {
            TokenSettings::Static {
                graph_token,
                app_studio_token,
                tenant_id,
            } => Box::new(StaticTokenProvider {
                graph_token: graph_token.clone(),
                app_studio_token: app_studio_token.clone(),
                tenant_id: tenant_id.clone(),
            }),
            TokenSettings::ClientCredentials {
                login_base_url,
                tenant_id,
                client_id,
                client_secret,
            } => {
                let http = HttpClient::builder()
                    .timeout(timeout)
                    .build()
                    .map_err(|err| ConfigError::InvalidConfig(format!("http client: {err}")))?;
                Box::new(ClientCredentialsTokenProvider::new(
                    http,
                    login_base_url.clone(),
                    tenant_id.clone(),
                    client_id.clone(),
                    client_secret.clone(),
                ))
            }
        })
    }
}

/// Runtime settings for the provisioner, read from `AAD_*` environment variables.
#[derive(Clone, Debug)]
pub struct Settings {
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub env: String,
    pub retry: RetryPolicy,
    pub endpoints: Endpoints,
    pub permission_policy: PermissionPolicy,
    /// Replacement for the bundled well-known permission table.
    pub catalog_file: Option<PathBuf>,
    pub tokens: TokenSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let project_root = get("AAD_PROJECT_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let state_dir = get("AAD_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| project_root.join(DEFAULT_STATE_DIR_NAME));

        let max_attempts = match get("AAD_RETRY_MAX_ATTEMPTS") {
            Some(raw) => parse_number::<u32>("AAD_RETRY_MAX_ATTEMPTS", &raw)?,
            None => DEFAULT_MAX_ATTEMPTS,
        };
        let delay = match get("AAD_RETRY_DELAY_MS") {
            Some(raw) => Duration::from_millis(parse_number("AAD_RETRY_DELAY_MS", &raw)?),
            None => DEFAULT_RETRY_DELAY,
        };

        let endpoints = Endpoints {
            graph_base_url: get("AAD_GRAPH_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string()),
            app_studio_base_url: get("AAD_APP_STUDIO_BASE_URL")
                .unwrap_or_else(|| DEFAULT_APP_STUDIO_BASE_URL.to_string()),
            timeout: DEFAULT_HTTP_TIMEOUT,
        };
        for (key, value) in [
            ("AAD_GRAPH_BASE_URL", &endpoints.graph_base_url),
            ("AAD_APP_STUDIO_BASE_URL", &endpoints.app_studio_base_url),
        ] {
            url::Url::parse(value)
                .map_err(|err| ConfigError::InvalidConfig(format!("{key}: {err}")))?;
        }

        let permission_policy = match get("AAD_PERMISSION_POLICY") {
            Some(raw) => raw.parse()?,
            None => PermissionPolicy::default(),
        };

        let catalog_file = get("AAD_PERMISSION_CATALOG").map(PathBuf::from);

        let tokens = match get("AAD_CLIENT_ID") {
            Some(client_id) => TokenSettings::ClientCredentials {
                login_base_url: get("AAD_LOGIN_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_LOGIN_BASE_URL.to_string()),
                tenant_id: get("AAD_TENANT_ID").ok_or(ConfigError::MissingEnv("AAD_TENANT_ID"))?,
                client_id,
                client_secret: get("AAD_CLIENT_SECRET")
                    .ok_or(ConfigError::MissingEnv("AAD_CLIENT_SECRET"))?,
            },
            None => TokenSettings::Static {
                graph_token: get("AAD_GRAPH_TOKEN"),
                app_studio_token: get("AAD_APP_STUDIO_TOKEN"),
                tenant_id: get("AAD_TENANT_ID"),
            },
        };

        Ok(Self {
            project_root,
            state_dir,
            env: get("AAD_ENV").unwrap_or_else(|| DEFAULT_ENV.to_string()),
            retry: RetryPolicy::new(max_attempts, delay),
            endpoints,
            permission_policy,
            catalog_file,
            tokens,
        })
    }

    pub fn permission_catalog(&self) -> Result<PermissionCatalog, CatalogError> {
        match &self.catalog_file {
            Some(path) => PermissionCatalog::load(path),
            None => PermissionCatalog::builtin(),
        }
    }
}

fn parse_number<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::InvalidConfig(format!("{key} must be a non-negative integer, got `{raw}`")))
}
