//! Shared HTTP plumbing: base URL, bearer token, timeouts, JSON bodies.

use std::time::Duration;

use proctor_core::error::ServiceError;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

use crate::error::{check_status, from_reqwest};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A configured client for one API base URL.
#[derive(Clone)]
pub struct ApiClient {
    base_url: Url,
    api_token: Option<String>,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &self.api_token.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ServiceError::Network(format!("invalid base URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::Network(format!(
                "invalid base URL {base_url}: not a hierarchical URL"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url,
            api_token: api_token.filter(|t| !t.is_empty()),
            timeout_secs: timeout.as_secs(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Resolve path segments against the base URL, percent-encoding each one.
    pub(crate) fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub(crate) fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let req = self
            .client
            .request(method, self.url(segments))
            .header("accept", "application/json");
        match &self.api_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Send and reject non-success statuses.
    pub(crate) async fn send(&self, req: RequestBuilder) -> Result<Response, ServiceError> {
        let response = req
            .send()
            .await
            .map_err(|e| from_reqwest(e, self.timeout_secs))?;
        check_status(response).await
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
    ) -> Result<T, ServiceError> {
        let response = self.send(req).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::InvalidResponse(format!("failed to parse response: {e}")))
    }

    /// Like [`send_json`](Self::send_json) for endpoints whose body may be empty.
    pub(crate) async fn send_optional_json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
    ) -> Result<Option<T>, ServiceError> {
        let response = self.send(req).await?;
        let body = response
            .text()
            .await
            .map_err(|e| from_reqwest(e, self.timeout_secs))?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| ServiceError::InvalidResponse(format!("failed to parse response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(base, None, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn ids_are_encoded_as_single_segments() {
        let api = client("https://exams.example.com");
        let url = api.url(&["api", "admin", "questions", "a/b?c#d"]);
        assert_eq!(
            url.as_str(),
            "https://exams.example.com/api/admin/questions/a%2Fb%3Fc%23d"
        );
    }

    #[test]
    fn base_path_is_kept() {
        let api = client("https://example.com/proctor/");
        let url = api.url(&["api", "student", "attempts", "att-1", "submit"]);
        assert_eq!(
            url.as_str(),
            "https://example.com/proctor/api/student/attempts/att-1/submit"
        );
    }

    #[test]
    fn rejects_unparseable_base_url() {
        assert!(ApiClient::new("not a url", None, Duration::from_secs(5)).is_err());
        assert!(ApiClient::new("mailto:admin@example.com", None, Duration::from_secs(5)).is_err());
    }

    #[test]
    fn debug_masks_token() {
        let api = ApiClient::new("http://localhost:8080", Some("secret".into()), Duration::from_secs(5))
            .unwrap();
        let debug = format!("{api:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("***"));
    }
}
