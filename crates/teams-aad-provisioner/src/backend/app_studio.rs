use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use teams_aad_core::AadApplication;

use super::{AadBackend, ApiError, http::RestClient};
use crate::context::Audience;

/// Teams developer portal proxy for tenants where Graph access is not granted.
pub struct AppStudioBackend {
    client: RestClient,
}

#[derive(Deserialize)]
struct Password {
    value: Option<String>,
}

impl AppStudioBackend {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self {
            client: RestClient::new(base_url, token, timeout)?.with_query("teamstoolkit", "true"),
        })
    }
}

impl AadBackend for AppStudioBackend {
    fn audience(&self) -> Audience {
        Audience::AppStudio
    }

    fn create_app(&self, app: &AadApplication) -> Result<AadApplication, ApiError> {
        self.client
            .send_json(self.client.request(Method::POST, "/api/aadapp/v2").json(app))
    }

    fn get_app(&self, object_id: &str) -> Result<AadApplication, ApiError> {
        self.client.send_json(
            self.client
                .request(Method::GET, &format!("/api/aadapp/v2/{object_id}")),
        )
    }

    fn update_app(&self, object_id: &str, patch: &AadApplication) -> Result<(), ApiError> {
        self.client.send_no_content(
            self.client
                .request(Method::POST, &format!("/api/aadapp/{object_id}"))
                .json(patch),
        )
    }

    // The proxy names secrets itself.
    fn create_secret(&self, object_id: &str, _display_name: &str) -> Result<String, ApiError> {
        let password: Password = self.client.send_json(
            self.client
                .request(Method::POST, &format!("/api/aadapp/{object_id}/passwords")),
        )?;
        password
            .value
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse("password response has no value".into()))
    }
}
