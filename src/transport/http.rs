//! reqwest-backed collaborators.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::auth::{AuthError, Credential, CredentialRefresher, Reachability, SessionStore};
use crate::poll::{FetchError, StatusFetcher, StatusReport, StatusValue};
use crate::util::timeout::with_timeout;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: Option<String>,
}

/// Renews credentials by POSTing the refresh token as JSON.
///
/// # Example
/// ```
/// use lapse::transport::HttpRefresher;
///
/// let refresher = HttpRefresher::builder()
///     .refresh_url("https://auth.example.com/token/refresh")
///     .build();
/// assert_eq!(refresher.refresh_url(), "https://auth.example.com/token/refresh");
/// ```
#[derive(Debug, Clone, Builder)]
pub struct HttpRefresher {
    #[builder(into)]
    refresh_url: String,
    #[builder(default)]
    client: reqwest::Client,
    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    timeout: Duration,
}

impl HttpRefresher {
    pub fn refresh_url(&self) -> &str {
        &self.refresh_url
    }

    async fn exchange(&self, refresh_token: &str) -> Result<Credential, AuthError> {
        let resp = self
            .client
            .post(&self.refresh_url)
            .header("Accept", "application/json")
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        let status = resp.status();
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::CredentialRejected(format!(
                "refresh endpoint returned {status}: {}",
                body.trim()
            )));
        }
        if !status.is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "refresh endpoint returned {status}"
            )));
        }

        let payload: RefreshResponse = resp.json().await?;
        if payload.access_token.is_empty() {
            return Err(AuthError::InvalidResponse(
                "refresh response carried an empty access token".into(),
            ));
        }
        Ok(Credential::new(
            payload.access_token,
            payload
                .refresh_token
                .unwrap_or_else(|| refresh_token.to_string()),
        ))
    }
}

#[async_trait]
impl CredentialRefresher for HttpRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential, AuthError> {
        with_timeout(self.timeout, self.exchange(refresh_token)).await
    }
}

/// Fetches `GET {base_url}/{resource_id}` and reads `status` from the body.
///
/// Every other top-level field of the body is kept in
/// [`StatusReport::fields`]. When a session is attached its access token is
/// sent as a bearer token.
#[derive(Builder)]
pub struct HttpStatusFetcher<S> {
    #[builder(into)]
    base_url: String,
    #[builder(default)]
    client: reqwest::Client,
    session: Option<Arc<SessionStore>>,
    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    timeout: Duration,
    #[builder(skip)]
    _status: PhantomData<fn() -> S>,
}

impl<S> HttpStatusFetcher<S> {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn resource_url(&self, resource_id: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), resource_id)
    }
}

impl<S: StatusValue + DeserializeOwned> HttpStatusFetcher<S> {
    async fn get(&self, resource_id: &str) -> Result<StatusReport<S>, FetchError> {
        let mut request = self
            .client
            .get(self.resource_url(resource_id))
            .header("Accept", "application/json");
        if let Some(token) = self.session.as_ref().and_then(|s| s.access_token()) {
            request = request.bearer_auth(token);
        }
        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: body.trim().to_string(),
            });
        }

        let mut fields: Map<String, Value> = resp.json().await?;
        let raw = fields
            .remove("status")
            .ok_or_else(|| FetchError::InvalidResponse("response has no status field".into()))?;
        let status = serde_json::from_value(raw)
            .map_err(|e| FetchError::InvalidResponse(format!("unrecognized status: {e}")))?;
        debug!(resource_id, "Fetched resource status");
        Ok(StatusReport { status, fields })
    }
}

#[async_trait]
impl<S: StatusValue + DeserializeOwned> StatusFetcher<S> for HttpStatusFetcher<S> {
    async fn fetch_status(&self, resource_id: &str) -> Result<StatusReport<S>, FetchError> {
        with_timeout(self.timeout, self.get(resource_id)).await
    }
}

/// Treats the network as reachable when a HEAD probe gets any HTTP response.
#[derive(Debug, Clone, Builder)]
pub struct HttpReachability {
    #[builder(into)]
    probe_url: String,
    #[builder(default)]
    client: reqwest::Client,
    #[builder(default = DEFAULT_PROBE_TIMEOUT)]
    timeout: Duration,
}

#[async_trait]
impl Reachability for HttpReachability {
    async fn is_reachable(&self) -> bool {
        let probe = self.client.head(&self.probe_url).send();
        match tokio::time::timeout(self.timeout, probe).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(error = %e, "Reachability probe failed");
                false
            }
            Err(_) => {
                debug!("Reachability probe timed out");
                false
            }
        }
    }
}
