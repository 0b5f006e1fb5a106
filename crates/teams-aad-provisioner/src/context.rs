//! Per-run identity: which backend audience is used, its bearer token and the tenant.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use reqwest::blocking::Client as HttpClient;
use serde_json::Value;
use thiserror::Error;

use crate::storage::{StateStore, env_state::EnvScope};

pub const DEFAULT_LOGIN_BASE_URL: &str = "https://login.microsoftonline.com";
const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Backend API surface used to reach the directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Audience {
    Graph,
    AppStudio,
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Audience::Graph => f.write_str("graph"),
            Audience::AppStudio => f.write_str("app-studio"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("no access token is available for any supported audience")]
    NoToken,
    #[error("no access token is available for audience {0}")]
    NoTokenForAudience(Audience),
    #[error("token request failed: {0}")]
    Request(String),
    #[error("invalid token response: {0}")]
    InvalidResponse(String),
    #[error("tenant id is unknown: configure it or use a token carrying a `tid` claim")]
    MissingTenant,
}

/// Source of bearer tokens for the directory backends.
pub trait TokenProvider: Send + Sync {
    /// Token for `audience`, or `None` when this provider cannot serve it.
    fn access_token(&self, audience: Audience) -> Result<Option<String>, TokenError>;

    /// Tenant configured alongside the credentials, if any.
    fn tenant_id(&self) -> Option<String> {
        None
    }
}

/// Explicit per-run context handed to every backend call.
#[derive(Clone)]
pub struct RunContext {
    audience: Audience,
    token: String,
    tenant_id: String,
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("audience", &self.audience)
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

impl RunContext {
    pub fn new(audience: Audience, token: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            audience,
            token: token.into(),
            tenant_id: tenant_id.into(),
        }
    }

    /// Ask the provider once, preferring Graph over AppStudio.
    pub fn resolve(provider: &dyn TokenProvider) -> Result<Self, TokenError> {
        for audience in [Audience::Graph, Audience::AppStudio] {
            if let Some(token) = provider.access_token(audience)? {
                return Self::with_token(provider, audience, token);
            }
        }
        Err(TokenError::NoToken)
    }

    /// Context for a fixed audience, for operations only one backend supports.
    pub fn for_audience(provider: &dyn TokenProvider, audience: Audience) -> Result<Self, TokenError> {
        let token = provider
            .access_token(audience)?
            .ok_or(TokenError::NoTokenForAudience(audience))?;
        Self::with_token(provider, audience, token)
    }

    fn with_token(
        provider: &dyn TokenProvider,
        audience: Audience,
        token: String,
    ) -> Result<Self, TokenError> {
        let tenant_id = provider
            .tenant_id()
            .or_else(|| tenant_from_token(&token))
            .ok_or(TokenError::MissingTenant)?;
        Ok(Self::new(audience, token, tenant_id))
    }

    pub fn audience(&self) -> Audience {
        self.audience
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }
}

/// Read the `tid` claim from a JWT payload without verifying it.
pub fn tenant_from_token(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("tid")?.as_str().map(str::to_string)
}

/// Tokens acquired elsewhere, typically passed in through the environment.
#[derive(Clone, Default)]
pub struct StaticTokenProvider {
    pub graph_token: Option<String>,
    pub app_studio_token: Option<String>,
    pub tenant_id: Option<String>,
}

impl TokenProvider for StaticTokenProvider {
    fn access_token(&self, audience: Audience) -> Result<Option<String>, TokenError> {
        Ok(match audience {
            Audience::Graph => self.graph_token.clone(),
            Audience::AppStudio => self.app_studio_token.clone(),
        })
    }

    fn tenant_id(&self) -> Option<String> {
        self.tenant_id.clone()
    }
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Client-credentials flow against the login endpoint; serves the Graph audience only.
pub struct ClientCredentialsTokenProvider {
    http: HttpClient,
    login_base_url: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
}

impl ClientCredentialsTokenProvider {
    pub fn new(
        http: HttpClient,
        login_base_url: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            login_base_url: login_base_url.into().trim_end_matches('/').to_string(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: Mutex::new(None),
        }
    }

    fn fetch_token(&self) -> Result<String, TokenError> {
        if let Ok(guard) = self.token.lock()
            && let Some(token) = guard.as_ref()
            && token.expires_at > Instant::now() + Duration::from_secs(30)
        {
            return Ok(token.value.clone());
        }

        let token_url = format!("{}/{}/oauth2/v2.0/token", self.login_base_url, self.tenant_id);
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", GRAPH_DEFAULT_SCOPE),
        ];
        let response = self
            .http
            .post(token_url)
            .form(&form)
            .send()
            .map_err(|err| TokenError::Request(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(TokenError::Request(format!("{status}: {body}")));
        }

        let body: Value = response
            .json()
            .map_err(|err| TokenError::InvalidResponse(err.to_string()))?;
        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| TokenError::InvalidResponse("missing access_token".into()))?
            .to_string();
        let expires_in = body.get("expires_in").and_then(Value::as_u64).unwrap_or(3600);

        if let Ok(mut guard) = self.token.lock() {
            *guard = Some(AccessToken {
                value: access_token.clone(),
                expires_at: Instant::now() + Duration::from_secs(expires_in),
            });
        }
        Ok(access_token)
    }
}

impl TokenProvider for ClientCredentialsTokenProvider {
    fn access_token(&self, audience: Audience) -> Result<Option<String>, TokenError> {
        match audience {
            Audience::Graph => self.fetch_token().map(Some),
            Audience::AppStudio => Ok(None),
        }
    }

    fn tenant_id(&self) -> Option<String> {
        Some(self.tenant_id.clone())
    }
}

/// Everything one provisioning run reads and writes besides the remote directory.
pub struct ProvisionContext<'a> {
    run: &'a RunContext,
    state: &'a dyn StateStore,
    scope: EnvScope,
    project_root: PathBuf,
}

impl<'a> ProvisionContext<'a> {
    pub fn new(
        run: &'a RunContext,
        state: &'a dyn StateStore,
        scope: EnvScope,
        project_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            run,
            state,
            scope,
            project_root: project_root.into(),
        }
    }

    pub fn run(&self) -> &'a RunContext {
        self.run
    }

    pub fn tenant(&self) -> &str {
        self.run.tenant_id()
    }

    pub fn state(&self) -> &'a dyn StateStore {
        self.state
    }

    pub fn scope(&self) -> &EnvScope {
        &self.scope
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }
}
