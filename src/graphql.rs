//! GraphQL request envelope and HTTP executor for the Techem analytics endpoint.

use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::CountryEndpoint;
use crate::error::ApiError;

/// The endpoint rejects requests without a browser-like user agent.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36";

/// Response bodies longer than this are truncated in debug logs.
const LOG_BODY_LIMIT: usize = 500;

/// GraphQL POST body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlRequest {
    pub query: &'static str,
    pub variables: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<&'static str>,
}

impl GraphQlRequest {
    pub fn new(query: &'static str, variables: Value) -> Self {
        Self {
            query,
            variables,
            operation_name: None,
        }
    }

    pub fn operation(mut self, name: &'static str) -> Self {
        self.operation_name = Some(name);
        self
    }
}

/// GraphQL response envelope.
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlErrorItem>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlErrorItem {
    pub message: String,
}

impl<T> GraphQlResponse<T> {
    /// Take `data`, turning a missing payload into an error.
    pub fn into_data(self) -> Result<T, ApiError> {
        match self.data {
            Some(data) => Ok(data),
            None if !self.errors.is_empty() => Err(ApiError::GraphQl(
                self.errors.into_iter().map(|e| e.message).collect(),
            )),
            None => Err(ApiError::MissingData("data")),
        }
    }
}

/// HTTP executor for GraphQL documents against one country endpoint.
#[derive(Clone)]
pub struct GraphQlClient {
    endpoint: CountryEndpoint,
    http_client: Client,
}

impl GraphQlClient {
    /// Create a new GraphQL client.
    ///
    /// # Errors
    /// Returns `ApiError::HttpClientInit` if the HTTP client cannot be created.
    pub fn new(endpoint: CountryEndpoint, timeout: std::time::Duration) -> Result<Self, ApiError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::HttpClientInit(e.to_string()))?;

        Ok(Self {
            endpoint,
            http_client,
        })
    }

    pub fn endpoint(&self) -> &CountryEndpoint {
        &self.endpoint
    }

    /// Headers sent with every request.
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        if let Ok(referer) = HeaderValue::from_str(&self.endpoint.referer) {
            headers.insert(REFERER, referer);
        }
        headers
    }

    /// Base headers plus `Authorization` and `Origin`.
    fn authenticated_headers(&self, token: &str) -> Result<HeaderMap, ApiError> {
        let mut headers = self.headers();
        let authorization = HeaderValue::from_str(&format!("JWT {}", token))
            .map_err(|_| ApiError::InvalidToken)?;
        headers.insert(AUTHORIZATION, authorization);
        if let Ok(origin) = HeaderValue::from_str(self.endpoint.origin()) {
            headers.insert(ORIGIN, origin);
        }
        Ok(headers)
    }

    /// POST an unauthenticated document and return the raw HTTP response.
    pub async fn send(
        &self,
        request: &GraphQlRequest,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.post(request, self.headers()).await
    }

    async fn post(
        &self,
        request: &GraphQlRequest,
        headers: HeaderMap,
    ) -> Result<reqwest::Response, reqwest::Error> {
        tracing::debug!(
            url = %self.endpoint.url,
            operation = request.operation_name.unwrap_or("anonymous"),
            "GraphQL POST request"
        );

        self.http_client
            .post(&self.endpoint.url)
            .headers(headers)
            .json(request)
            .send()
            .await
    }

    /// POST an authenticated document and parse the `data` payload.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: &GraphQlRequest,
        token: &str,
    ) -> Result<T, ApiError> {
        let headers = self.authenticated_headers(token)?;
        let response = self.post(request, headers).await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::debug!(status = %status, body = %truncate(&body), "GraphQL error response");
            return Err(ApiError::HttpError { status, body });
        }

        tracing::debug!(body = %truncate(&body), "GraphQL response");
        let envelope: GraphQlResponse<T> = serde_json::from_str(&body)?;
        envelope.into_data()
    }
}

impl std::fmt::Debug for GraphQlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphQlClient")
            .field("url", &self.endpoint.url)
            .finish()
    }
}

/// Truncate a response body for logging.
pub(crate) fn truncate(body: &str) -> String {
    if body.len() <= LOG_BODY_LIMIT {
        return body.to_string();
    }
    let mut end = LOG_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &body[..end])
}
