//! Token endpoint client (authorization-code and refresh grants).

use async_trait::async_trait;
use std::fmt;

use super::wire::TokenResponse;
use super::{SpotifyError, TokenExchange, TokenGrant};

/// Default base URL of the accounts service.
pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.spotify.com";

/// Token endpoint client authenticated with the application's client credentials.
#[derive(Clone)]
pub struct SpotifyAccounts {
    http: reqwest::Client,
    accounts_url: String,
    client_id: String,
    client_secret: String,
}

impl SpotifyAccounts {
    pub fn new(
        accounts_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            accounts_url: accounts_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    fn token_url(&self) -> String {
        format!("{}/api/token", self.accounts_url)
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenGrant, SpotifyError> {
        let response = self
            .http
            .post(self.token_url())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await
            .map_err(|e| SpotifyError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SpotifyError::Status(response.status().as_u16()));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| SpotifyError::Decode(e.to_string()))?;

        if body.expires_in <= 0 {
            return Err(SpotifyError::Decode(format!(
                "non-positive expires_in: {}",
                body.expires_in
            )));
        }

        Ok(TokenGrant {
            access_token: body.access_token,
            expires_in_secs: body.expires_in,
            refresh_token: body.refresh_token,
        })
    }
}

#[async_trait]
impl TokenExchange for SpotifyAccounts {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, SpotifyError> {
        self.request_token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, SpotifyError> {
        self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }
}

impl fmt::Debug for SpotifyAccounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyAccounts")
            .field("accounts_url", &self.accounts_url)
            .field("client_id", &self.client_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::post,
        Form, Json, Router,
    };
    use std::collections::HashMap;

    async fn spawn_mock(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn token_endpoint() -> Router {
        Router::new().route(
            "/api/token",
            post(
                |headers: HeaderMap, Form(form): Form<HashMap<String, String>>| async move {
                    // "id:secret" base64-encoded
                    if headers.get("authorization").and_then(|h| h.to_str().ok())
                        != Some("Basic aWQ6c2VjcmV0")
                    {
                        return StatusCode::UNAUTHORIZED.into_response();
                    }
                    match form.get("grant_type").map(String::as_str) {
                        Some("refresh_token") if form.get("refresh_token").map(String::as_str) == Some("R1") => {
                            Json(serde_json::json!({
                                "access_token": "T2",
                                "token_type": "Bearer",
                                "expires_in": 3600
                            }))
                            .into_response()
                        }
                        Some("authorization_code") if form.get("code").map(String::as_str) == Some("C0") => {
                            Json(serde_json::json!({
                                "access_token": "T0",
                                "token_type": "Bearer",
                                "expires_in": 0,
                                "refresh_token": "R0"
                            }))
                            .into_response()
                        }
                        Some("authorization_code") if form.get("code").map(String::as_str) == Some("C1") => {
                            Json(serde_json::json!({
                                "access_token": "T1",
                                "token_type": "Bearer",
                                "expires_in": 3600,
                                "refresh_token": "R1"
                            }))
                            .into_response()
                        }
                        _ => StatusCode::BAD_REQUEST.into_response(),
                    }
                },
            ),
        )
    }

    #[tokio::test]
    async fn test_refresh_grant() {
        let base = spawn_mock(token_endpoint()).await;
        let accounts = SpotifyAccounts::new(base, "id", "secret");

        let grant = accounts.refresh("R1").await.unwrap();

        assert_eq!(grant.access_token, "T2");
        assert_eq!(grant.expires_in_secs, 3600);
        assert!(grant.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let base = spawn_mock(token_endpoint()).await;
        let accounts = SpotifyAccounts::new(base, "id", "secret");

        let result = accounts.refresh("revoked").await;
        assert!(matches!(result, Err(SpotifyError::Status(400))));
    }

    #[tokio::test]
    async fn test_exchange_code_grant() {
        let base = spawn_mock(token_endpoint()).await;
        let accounts = SpotifyAccounts::new(base, "id", "secret");

        let grant = accounts
            .exchange_code("C1", "http://localhost/callback")
            .await
            .unwrap();

        assert_eq!(grant.access_token, "T1");
        assert_eq!(grant.refresh_token.as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_non_positive_lifetime_is_malformed() {
        let base = spawn_mock(token_endpoint()).await;
        let accounts = SpotifyAccounts::new(base, "id", "secret");

        let result = accounts
            .exchange_code("C0", "http://localhost/callback")
            .await;

        assert!(matches!(result, Err(SpotifyError::Decode(_))));
    }

    #[tokio::test]
    async fn test_wrong_client_secret() {
        let base = spawn_mock(token_endpoint()).await;
        let accounts = SpotifyAccounts::new(base, "id", "wrong");

        let result = accounts.refresh("R1").await;
        assert!(matches!(result, Err(SpotifyError::Status(401))));
    }

    #[test]
    fn test_debug_hides_secret() {
        let accounts = SpotifyAccounts::new(DEFAULT_ACCOUNTS_URL, "id", "very-secret");
        let debug = format!("{:?}", accounts);
        assert!(!debug.contains("very-secret"));
    }
}
