//! Thin client for the REST backend.
//!
//! Calls are fire-and-forget with a boolean outcome. Nothing here feeds back
//! into playback or chat.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, header};
use serde::{Deserialize, Serialize};
use stream_types::PageOrigin;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Result, ViewError};

/// Credentials attached to every backend request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    /// Session cookie, sent verbatim as the `Cookie` header.
    Cookie { value: String },
    Bearer { token: String },
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base: Url,
    credentials: Option<Credentials>,
}

impl BackendClient {
    /// Client for the backend served under `{origin}/api/`.
    pub fn new(
        origin: &PageOrigin,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Result<Self> {
        stream_types::install_rustls_provider();
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, origin.api_base()?, credentials))
    }

    pub fn with_client(client: Client, base: Url, credentials: Option<Credentials>) -> Self {
        Self {
            client,
            base,
            credentials,
        }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn set_credentials(&mut self, credentials: Option<Credentials>) {
        self.credentials = credentials;
    }

    pub async fn subscribe(&self, channel_id: &str) -> bool {
        self.fire(Method::POST, &subscription_path(channel_id), None)
            .await
    }

    pub async fn unsubscribe(&self, channel_id: &str) -> bool {
        self.fire(Method::DELETE, &subscription_path(channel_id), None)
            .await
    }

    /// Issue one request and report whether it succeeded.
    pub async fn fire(&self, method: Method, path: &str, body: Option<&serde_json::Value>) -> bool {
        match self.execute(method.clone(), path, body).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%method, path, error = %e, "Backend request failed");
                false
            }
        }
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<()> {
        let url = self.resolve(path)?;
        let mut request = self.authorize(self.client.request(method, url));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?.error_for_status()?;
        debug!(status = %response.status(), path, "Backend request succeeded");
        Ok(())
    }

    /// Paths are relative to the API base; a leading `/` does not escape it.
    fn resolve(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ViewError::backend_path(path, e.to_string()))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(Credentials::Cookie { value }) => request.header(header::COOKIE, value),
            Some(Credentials::Bearer { token }) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn subscription_path(channel_id: &str) -> String {
    format!("subscriptions/{}", urlencoding::encode(channel_id))
}
