//! HTTP client for the inventory backend.
//!
//! All calls carry the bearer token from the configured [`TokenStore`] and an
//! `X-Request-Id` for correlation with backend logs. A `401` clears the
//! stored credentials and redirects the operator to the login route.

mod locations;
mod putaway;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    auth::TokenStore,
    config::AppConfig,
    errors::ServiceError,
    navigation::Navigator,
};

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: Arc<dyn TokenStore>,
    navigator: Arc<Navigator>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        tokens: Arc<dyn TokenStore>,
        navigator: Arc<Navigator>,
    ) -> Result<Self, ServiceError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            ServiceError::ValidationError(format!("Invalid API base URL '{}': {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::ValidationError(format!(
                "API base URL '{}' cannot carry a path",
                base_url
            )));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("pharmacy-putaway/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            tokens,
            navigator,
        })
    }

    pub fn from_config(
        config: &AppConfig,
        tokens: Arc<dyn TokenStore>,
        navigator: Arc<Navigator>,
    ) -> Result<Self, ServiceError> {
        Self::new(
            &config.api_base_url,
            config.request_timeout(),
            tokens,
            navigator,
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn navigator(&self) -> &Arc<Navigator> {
        &self.navigator
    }

    /// Builds `<base>/<segments...>`, percent-encoding each segment.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::InvalidState("API base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&'static str, String)],
    ) -> Result<T, ServiceError> {
        let url = self.endpoint(segments)?;
        self.execute(self.http.request(Method::GET, url).query(query))
            .await
    }

    pub(crate) async fn put_json<B, T>(&self, segments: &[&str], body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        self.execute(self.http.request(Method::PUT, url).json(body))
            .await
    }

    pub(crate) async fn post_json<B, T>(&self, segments: &[&str], body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        self.execute(self.http.request(Method::POST, url).json(body))
            .await
    }

    #[instrument(skip(self, builder))]
    async fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ServiceError> {
        let request_id = Uuid::new_v4().to_string();
        let mut builder = builder.header(REQUEST_ID_HEADER, &request_id);
        if let Some(token) = self.tokens.token() {
            builder = builder.bearer_auth(token);
        }

        let request = builder
            .build()
            .map_err(|e| ServiceError::InvalidState(format!("Failed to build request: {}", e)))?;
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, %request_id, "sending request");

        let response = self.http.execute(request).await.map_err(|e| {
            warn!(%method, %url, %request_id, "request failed: {}", e);
            ServiceError::NetworkError(e.to_string())
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.handle_unauthorized();
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = ServiceError::from_response(status, &body);
            warn!(%method, %url, %request_id, status = status.as_u16(), "request rejected: {}", err);
            return Err(err);
        }

        let bytes = response.bytes().await?;
        debug!(%method, %url, %request_id, status = status.as_u16(), bytes = bytes.len(), "response received");
        serde_json::from_slice(&bytes).map_err(|e| {
            ServiceError::SerializationError(format!("Unexpected response from {}: {}", url, e))
        })
    }

    fn handle_unauthorized(&self) {
        if let Err(err) = self.tokens.clear() {
            warn!("failed to clear stored credentials: {}", err);
        }
        if self.navigator.redirect_to_login() {
            warn!("session expired, redirecting to login");
        }
    }
}

/// Rejects a 2xx response whose body reports `success: false`.
pub(crate) fn ensure_success(
    success: Option<bool>,
    message: Option<String>,
    fallback: &str,
) -> Result<(), ServiceError> {
    match success {
        Some(false) => Err(ServiceError::Rejected(
            message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| fallback.to_string()),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(
            base,
            Duration::from_secs(5),
            Arc::new(MemoryTokenStore::new()),
            Arc::new(Navigator::default()),
        )
        .unwrap()
    }

    #[test]
    fn endpoint_appends_segments_to_base_path() {
        let api = client("http://localhost:5000/api");
        assert_eq!(
            api.endpoint(&["purchases", "abc123", "putaway"]).unwrap().as_str(),
            "http://localhost:5000/api/purchases/abc123/putaway"
        );

        let api = client("http://localhost:5000/api/");
        assert_eq!(
            api.endpoint(&["locations"]).unwrap().as_str(),
            "http://localhost:5000/api/locations"
        );
    }

    #[test]
    fn endpoint_encodes_ids() {
        let api = client("http://localhost:5000/api");
        assert_eq!(
            api.endpoint(&["sales", "returns", "SR 1/2", "putaway"]).unwrap().as_str(),
            "http://localhost:5000/api/sales/returns/SR%201%2F2/putaway"
        );
    }

    #[test]
    fn invalid_base_url_is_a_validation_error() {
        let result = ApiClient::new(
            "not a url",
            Duration::from_secs(5),
            Arc::new(MemoryTokenStore::new()),
            Arc::new(Navigator::default()),
        );
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));
    }

    #[test]
    fn success_false_is_a_rejection() {
        let err = ensure_success(Some(false), None, "Put-away failed").unwrap_err();
        assert_eq!(err.alert_message(), "Put-away failed");
        assert!(ensure_success(None, None, "x").is_ok());
    }
}
