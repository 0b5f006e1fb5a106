use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use teams_aad_core::AadApplication;

use super::{AadBackend, ApiError, DirectoryUser, OwnerDirectory, http::RestClient};
use crate::context::Audience;

/// Microsoft Graph `v1.0` application endpoints.
pub struct GraphBackend {
    client: RestClient,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordCredential {
    secret_text: Option<String>,
}

#[derive(Deserialize)]
struct ListResponse<T> {
    value: Vec<T>,
}

impl GraphBackend {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self {
            client: RestClient::new(base_url, token, timeout)?,
        })
    }
}

impl AadBackend for GraphBackend {
    fn audience(&self) -> Audience {
        Audience::Graph
    }

    fn create_app(&self, app: &AadApplication) -> Result<AadApplication, ApiError> {
        self.client
            .send_json(self.client.request(Method::POST, "/applications").json(app))
    }

    fn get_app(&self, object_id: &str) -> Result<AadApplication, ApiError> {
        self.client.send_json(
            self.client
                .request(Method::GET, &format!("/applications/{object_id}")),
        )
    }

    fn update_app(&self, object_id: &str, patch: &AadApplication) -> Result<(), ApiError> {
        self.client.send_no_content(
            self.client
                .request(Method::PATCH, &format!("/applications/{object_id}"))
                .json(patch),
        )
    }

    fn create_secret(&self, object_id: &str, display_name: &str) -> Result<String, ApiError> {
        let body = json!({ "passwordCredential": { "displayName": display_name } });
        let credential: PasswordCredential = self.client.send_json(
            self.client
                .request(Method::POST, &format!("/applications/{object_id}/addPassword"))
                .json(&body),
        )?;
        credential
            .secret_text
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse("addPassword returned no secretText".into()))
    }
}

impl OwnerDirectory for GraphBackend {
    fn list_owners(&self, object_id: &str) -> Result<Vec<DirectoryUser>, ApiError> {
        let owners: ListResponse<DirectoryUser> = self.client.send_json(
            self.client
                .request(Method::GET, &format!("/applications/{object_id}/owners")),
        )?;
        Ok(owners.value)
    }

    fn add_owner(&self, object_id: &str, user_object_id: &str) -> Result<(), ApiError> {
        let body = json!({
            "@odata.id": format!("{}/directoryObjects/{user_object_id}", self.client.base_url())
        });
        self.client.send_no_content(
            self.client
                .request(Method::POST, &format!("/applications/{object_id}/owners/$ref"))
                .json(&body),
        )
    }

    fn signed_in_user(&self) -> Result<DirectoryUser, ApiError> {
        self.client.send_json(self.client.request(Method::GET, "/me"))
    }
}
