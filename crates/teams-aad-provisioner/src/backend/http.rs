use std::time::Duration;

use reqwest::{
    Method,
    blocking::{Client as HttpClient, RequestBuilder},
};
use serde::de::DeserializeOwned;

use super::ApiError;

/// Bearer-authenticated JSON client bound to one base URL.
pub(crate) struct RestClient {
    http: HttpClient,
    base_url: String,
    token: String,
    query: Vec<(&'static str, &'static str)>,
}

impl RestClient {
    pub(crate) fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            query: Vec::new(),
        })
    }

    /// Append a fixed query pair to every request.
    pub(crate) fn with_query(mut self, key: &'static str, value: &'static str) -> Self {
        self.query.push((key, value));
        self
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        if self.query.is_empty() {
            builder
        } else {
            builder.query(&self.query)
        }
    }

    pub(crate) fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = builder
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()?;
        let status = response.status();
        if status.is_success() {
            response
                .json::<T>()
                .map_err(|err| ApiError::InvalidResponse(err.to_string()))
        } else {
            Err(ApiError::http(status.as_u16(), response.text().unwrap_or_default()))
        }
    }

    pub(crate) fn send_no_content(&self, builder: RequestBuilder) -> Result<(), ApiError> {
        let response = builder.bearer_auth(&self.token).send()?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ApiError::http(status.as_u16(), response.text().unwrap_or_default()))
        }
    }
}
