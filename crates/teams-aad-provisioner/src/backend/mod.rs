//! Remote directory backends: Microsoft Graph and the AppStudio proxy.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use teams_aad_core::{AadApplication, ProvisionError, RemoteStep};
use thiserror::Error;

use crate::context::{Audience, RunContext};

mod app_studio;
mod graph;
mod http;

pub use app_studio::AppStudioBackend;
pub use graph::GraphBackend;

pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_APP_STUDIO_BASE_URL: &str = "https://dev.teams.microsoft.com";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Failure of a single REST call, before it is attributed to a provisioning step.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API error {status}: {body}")]
    Http {
        status: u16,
        code: Option<String>,
        body: String,
    },
    #[error("API call failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("{operation} reached the retry limit")]
    RetryLimit { operation: String },
}

impl ApiError {
    pub(crate) fn http(status: u16, body: String) -> Self {
        let code = error_code(&body);
        ApiError::Http { status, code, body }
    }

    /// Transport failures, throttling and server errors; used to annotate retry logs.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Http { status, .. } => *status == 429 || *status >= 500,
            ApiError::InvalidResponse(_) | ApiError::RetryLimit { .. } => false,
        }
    }

    /// Attribute the failure to `step`, keeping status and directory error code.
    pub fn into_provision(self, step: RemoteStep) -> ProvisionError {
        match self {
            ApiError::Http { status, code, body } => ProvisionError::Remote {
                step,
                status: Some(status),
                detail: error_message(&body).unwrap_or(body),
                code,
            },
            ApiError::Transport(err) => ProvisionError::Remote {
                step,
                status: None,
                code: None,
                detail: err.to_string(),
            },
            ApiError::InvalidResponse(detail) => ProvisionError::InvalidResponse { step, detail },
            ApiError::RetryLimit { operation } => ProvisionError::RetryLimit { operation },
        }
    }
}

// Graph and AppStudio both wrap failures as {"error": {"code", "message"}}.
fn error_field(body: &str, field: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get(field)?
        .as_str()
        .map(str::to_string)
}

fn error_code(body: &str) -> Option<String> {
    error_field(body, "code")
}

fn error_message(body: &str) -> Option<String> {
    error_field(body, "message")
}

/// Application registration operations every backend supports.
pub trait AadBackend: Send + Sync {
    fn audience(&self) -> Audience;

    /// Create the registration and return it as stored remotely.
    fn create_app(&self, app: &AadApplication) -> Result<AadApplication, ApiError>;

    fn get_app(&self, object_id: &str) -> Result<AadApplication, ApiError>;

    /// Apply a partial update. Only fields set on `patch` are sent.
    fn update_app(&self, object_id: &str, patch: &AadApplication) -> Result<(), ApiError>;

    /// Add a client secret and return its value, which is never readable again.
    fn create_secret(&self, object_id: &str, display_name: &str) -> Result<String, ApiError>;
}

/// Directory user as returned by owner listings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
}

/// Ownership operations on an application; only Graph exposes them.
pub trait OwnerDirectory: Send + Sync {
    fn list_owners(&self, object_id: &str) -> Result<Vec<DirectoryUser>, ApiError>;

    fn add_owner(&self, object_id: &str, user_object_id: &str) -> Result<(), ApiError>;

    fn signed_in_user(&self) -> Result<DirectoryUser, ApiError>;
}

/// Base URLs and timeout shared by both backends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    pub graph_base_url: String,
    pub app_studio_base_url: String,
    pub timeout: Duration,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            graph_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            app_studio_base_url: DEFAULT_APP_STUDIO_BASE_URL.to_string(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

/// Pick the backend for the audience resolved at the start of the run.
pub fn backend_for(run: &RunContext, endpoints: &Endpoints) -> Result<Box<dyn AadBackend>, ApiError> {
    Ok(match run.audience() {
        Audience::Graph => Box::new(GraphBackend::new(
            &endpoints.graph_base_url,
            run.token(),
            endpoints.timeout,
        )?),
        Audience::AppStudio => Box::new(AppStudioBackend::new(
            &endpoints.app_studio_base_url,
            run.token(),
            endpoints.timeout,
        )?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_carries_directory_code() {
        let body = r#"{"error":{"code":"Authorization_RequestDenied","message":"Insufficient privileges"}}"#;
        let err = ApiError::http(403, body.to_string()).into_provision(RemoteStep::CreateApp);
        assert_eq!(
            err,
            ProvisionError::Remote {
                step: RemoteStep::CreateApp,
                status: Some(403),
                code: Some("Authorization_RequestDenied".into()),
                detail: "Insufficient privileges".into(),
            }
        );
        assert_eq!(err.name(), "CreateAppError");
        assert!(err.help_link().is_some());
    }

    #[test]
    fn unstructured_body_is_kept_verbatim() {
        let err = ApiError::http(502, "bad gateway".into()).into_provision(RemoteStep::GetApp);
        assert!(matches!(
            err,
            ProvisionError::Remote { status: Some(502), code: None, ref detail, .. } if detail == "bad gateway"
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn factory_follows_audience() {
        let endpoints = Endpoints::default();
        let graph = backend_for(&RunContext::new(Audience::Graph, "t", "tenant"), &endpoints).unwrap();
        assert_eq!(graph.audience(), Audience::Graph);
        let studio =
            backend_for(&RunContext::new(Audience::AppStudio, "t", "tenant"), &endpoints).unwrap();
        assert_eq!(studio.audience(), Audience::AppStudio);
    }
}
