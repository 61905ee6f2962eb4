//! Email/password login against the Techem analytics endpoint.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Credentials;
use crate::error::AuthError;
use crate::graphql::{truncate, GraphQlClient, GraphQlRequest, GraphQlResponse};

const LOGIN_MUTATION: &str = r#"
    mutation nucleolusLogin($credentials: CredentialsInput!) {
        loginWithEmailAndPassword(credentials: $credentials) {
            ok { token }
        }
    }
"#;

/// Bearer token returned by the login mutation.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Expiry from the JWT `exp` claim, if the token is a decodable JWT.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        #[derive(Deserialize)]
        struct Claims {
            exp: Option<i64>,
        }

        let payload = self.0.split('.').nth(1)?;
        let decoded = BASE64_URL.decode(payload.trim_end_matches('=')).ok()?;
        let claims: Claims = serde_json::from_slice(&decoded).ok()?;
        DateTime::from_timestamp(claims.exp?, 0)
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    login_with_email_and_password: Option<LoginResult>,
}

#[derive(Debug, Deserialize)]
struct LoginResult {
    ok: Option<LoginOk>,
}

#[derive(Debug, Deserialize)]
struct LoginOk {
    #[serde(default)]
    token: Option<String>,
}

/// Cached token with expiration tracking.
#[derive(Debug, Clone)]
struct CachedToken {
    token: AuthToken,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Check if token is expired (with buffer).
    fn is_expired(&self, buffer: Duration) -> bool {
        Utc::now() + buffer >= self.expires_at
    }
}

/// Token cache policy.
#[derive(Debug, Clone, Copy)]
pub struct TokenPolicy {
    /// Keep the token between fetches
    pub cache: bool,
    /// Lifetime assumed when the token has no `exp` claim
    pub ttl: Duration,
    /// Refresh this long before expiry
    pub buffer: Duration,
}

impl Default for TokenPolicy {
    /// Log in on every fetch.
    fn default() -> Self {
        Self {
            cache: false,
            ttl: Duration::seconds(900),
            buffer: Duration::seconds(30),
        }
    }
}

/// Performs the login mutation and optionally caches the token.
#[derive(Clone)]
pub struct Authenticator {
    graphql: GraphQlClient,
    credentials: Credentials,
    policy: TokenPolicy,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl Authenticator {
    pub fn new(graphql: GraphQlClient, credentials: Credentials, policy: TokenPolicy) -> Self {
        Self {
            graphql,
            credentials,
            policy,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get a token, reusing the cached one when caching is enabled and it is still fresh.
    ///
    /// The flag is true when the token came from the cache.
    pub async fn get_token(&self) -> Result<(AuthToken, bool), AuthError> {
        if self.policy.cache {
            let cache = self.token_cache.read().await;
            if let Some(ref cached) = *cache {
                if !cached.is_expired(self.policy.buffer) {
                    return Ok((cached.token.clone(), true));
                }
            }
        }

        let token = self.login().await?;

        if self.policy.cache {
            let expires_at = token
                .expires_at()
                .unwrap_or_else(|| Utc::now() + self.policy.ttl);
            tracing::debug!(
                expires_at = %expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
                "Caching login token"
            );
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.clone(),
                expires_at,
            });
        }

        Ok((token, false))
    }

    /// Drop the cached token so the next call logs in again.
    pub async fn invalidate(&self) {
        let mut cache = self.token_cache.write().await;
        *cache = None;
    }

    #[cfg(test)]
    pub(crate) async fn seed_cache(&self, token: AuthToken, expires_at: DateTime<Utc>) {
        let mut cache = self.token_cache.write().await;
        *cache = Some(CachedToken { token, expires_at });
    }

    /// Send the login mutation and extract the token.
    pub async fn login(&self) -> Result<AuthToken, AuthError> {
        let request = GraphQlRequest::new(
            LOGIN_MUTATION,
            json!({
                "credentials": {
                    "username": self.credentials.email,
                    "password": self.credentials.password,
                    "targetResource": "tenant"
                }
            }),
        );

        tracing::debug!(url = %self.graphql.endpoint().url, "Attempting login");

        let response = self.graphql.send(&request).await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::debug!(status = %status, body = %truncate(&body), "Login request failed");
            return Err(AuthError::LoginFailed { status, body });
        }

        let envelope: GraphQlResponse<LoginData> = serde_json::from_str(&body)?;
        let token = envelope
            .data
            .and_then(|d| d.login_with_email_and_password)
            .and_then(|r| r.ok)
            .and_then(|ok| ok.token)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        tracing::info!("Successfully authenticated");
        Ok(AuthToken::new(token))
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("email", &self.credentials.email)
            .field("cache", &self.policy.cache)
            .finish()
    }
}
