//! Keycloak トークンエンドポイントのトレイトと HTTP 実装。

use crate::config::KeycloakConfig;
use crate::error::KeycloakError;
use crate::token::AccessToken;
use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info};

#[cfg(feature = "mock")]
use mockall::automock;

/// TokenEndpoint は Client Credentials フローでトークンを発行するエンドポイントを抽象化するトレイト。
///
/// `KeycloakAuthClient` がデフォルト実装。テスト時は `MockTokenEndpoint` が使用可能。
#[async_trait]
#[cfg_attr(feature = "mock", automock)]
pub trait TokenEndpoint: Send + Sync {
    /// クライアントクレデンシャルフローでトークンを 1 回取得する。リトライは行わない。
    ///
    /// 資格情報が拒否された場合は `AuthDenied`、それ以外の失敗は `AuthUnavailable` を返す。
    async fn request_token(&self, config: &KeycloakConfig) -> Result<AccessToken, KeycloakError>;

    /// 下位のトランスポートを解放する。複数回呼び出しても安全。
    fn close(&self);
}

/// トークンエンドポイントのレスポンス（OAuth2 標準形式）。
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: u64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// OAuth2 エラーレスポンス（`{"error": "...", "error_description": "..."}`）。
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// HTTP クライアントのライフサイクル状態。
enum Transport {
    /// 未生成（初回の `get_client` で生成する）。
    Idle,
    Open(reqwest::Client),
    Closed,
}

/// KeycloakAuthClient は reqwest を使った TokenEndpoint の HTTP 実装。
///
/// 内部の `reqwest::Client` は初回利用時に生成され、下流サービスへの呼び出し用に
/// `get_client` で呼び出し元へも共有される。`close` 後の呼び出しは即座に `AuthUnavailable` を返す。
pub struct KeycloakAuthClient {
    config: Arc<KeycloakConfig>,
    transport: Mutex<Transport>,
}

impl KeycloakAuthClient {
    /// 新しい KeycloakAuthClient を生成する。HTTP クライアントはまだ生成しない。
    pub fn new(config: Arc<KeycloakConfig>) -> Self {
        Self {
            config,
            transport: Mutex::new(Transport::Idle),
        }
    }

    pub fn config(&self) -> &KeycloakConfig {
        &self.config
    }

    /// 共有 HTTP クライアントを返す。初回呼び出し時に生成し、以降は同じ接続プールを返す。
    ///
    /// `reqwest::Client` は内部で `Arc` を保持しているため、clone しても同じプールを共有する。
    pub fn get_client(&self) -> Result<reqwest::Client, KeycloakError> {
        let mut transport = self.transport.lock().unwrap_or_else(PoisonError::into_inner);
        match &*transport {
            Transport::Open(client) => Ok(client.clone()),
            Transport::Closed => Err(KeycloakError::AuthUnavailable(
                "認証クライアントはクローズ済みです".to_string(),
            )),
            Transport::Idle => {
                let client = reqwest::Client::builder()
                    .timeout(self.config.timeout())
                    .connect_timeout(self.config.connect_timeout())
                    .build()
                    .map_err(|e| {
                        error!(error = %e, "HTTP クライアントの生成に失敗しました");
                        KeycloakError::AuthUnavailable(e.to_string())
                    })?;
                debug!(client_id = %self.config.client_id, "HTTP クライアントを生成しました");
                *transport = Transport::Open(client.clone());
                Ok(client)
            }
        }
    }

    /// HTTP クライアントを解放する。
    ///
    /// 実行中のリクエストは各自が保持する clone で完了まで処理され、以降の呼び出しは失敗する。
    pub fn close(&self) {
        let mut transport = self.transport.lock().unwrap_or_else(PoisonError::into_inner);
        if !matches!(*transport, Transport::Closed) {
            info!(client_id = %self.config.client_id, "認証クライアントをクローズします");
        }
        *transport = Transport::Closed;
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            *self.transport.lock().unwrap_or_else(PoisonError::into_inner),
            Transport::Closed
        )
    }
}

#[async_trait]
impl TokenEndpoint for KeycloakAuthClient {
    async fn request_token(&self, config: &KeycloakConfig) -> Result<AccessToken, KeycloakError> {
        let client = self.get_client()?;
        let token_endpoint = config.token_endpoint();

        debug!(
            client_id = %config.client_id,
            token_endpoint = %token_endpoint,
            "Client Credentials フローでトークンを取得します"
        );

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose_secret().as_str()),
        ];

        let response = client
            .post(&token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "トークンエンドポイントへの HTTP リクエストに失敗しました");
                KeycloakError::AuthUnavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "トークン取得に失敗しました");
            return Err(classify_failure(status, &body));
        }

        let token_resp: TokenResponse = response.json().await.map_err(|e| {
            error!(error = %e, "トークンレスポンスの解析に失敗しました");
            KeycloakError::AuthUnavailable(format!("トークンレスポンスの解析に失敗しました: {e}"))
        })?;

        if token_resp.access_token.is_empty() {
            return Err(KeycloakError::AuthUnavailable(
                "access_token が空のレスポンスを受信しました".to_string(),
            ));
        }

        debug!(
            client_id = %config.client_id,
            expires_in = token_resp.expires_in,
            "トークンを取得しました"
        );

        Ok(AccessToken::new(
            token_resp.access_token,
            token_resp.token_type,
            token_resp.expires_in,
        ))
    }

    fn close(&self) {
        KeycloakAuthClient::close(self);
    }
}

/// 失敗レスポンスをエラー種別に振り分ける。
///
/// 400 / 401 / 403 は資格情報やクライアント設定の拒否であり再試行しても回復しないため `AuthDenied`。
/// 429・5xx・その他は一時的な障害として `AuthUnavailable` とする。
fn classify_failure(status: StatusCode, body: &str) -> KeycloakError {
    let detail = match serde_json::from_str::<OAuthErrorResponse>(body) {
        Ok(oauth) => match oauth.error_description {
            Some(desc) => format!("HTTP {status} - {}: {desc}", oauth.error),
            None => format!("HTTP {status} - {}", oauth.error),
        },
        Err(_) => format!("HTTP {status}"),
    };

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            KeycloakError::AuthDenied(detail)
        }
        _ => KeycloakError::AuthUnavailable(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN_PATH: &str = "/realms/phoenix/protocol/openid-connect/token";

    fn make_config(url: &str) -> Arc<KeycloakConfig> {
        Arc::new(KeycloakConfig::new(url, "phoenix", "order-service", "s3cr3t"))
    }

    fn token_json(expires_in: u64) -> serde_json::Value {
        serde_json::json!({
            "access_token": "eyJ.service.token",
            "expires_in": expires_in,
            "token_type": "Bearer",
            "scope": "profile email"
        })
    }

    #[tokio::test]
    async fn test_request_token_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=order-service"))
            .and(body_string_contains("client_secret=s3cr3t"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_json(300)))
            .expect(1)
            .mount(&server)
            .await;

        let config = make_config(&server.uri());
        let client = KeycloakAuthClient::new(config.clone());
        let token = client.request_token(&config).await.unwrap();

        assert_eq!(token.access_token, "eyJ.service.token");
        assert_eq!(token.token_type, "Bearer");
        assert!(token.is_valid(config.refresh_margin()));
    }

    #[tokio::test]
    async fn test_request_token_defaults_token_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "abc", "expires_in": 60})),
            )
            .mount(&server)
            .await;

        let config = make_config(&server.uri());
        let client = KeycloakAuthClient::new(config.clone());
        let token = client.request_token(&config).await.unwrap();
        assert_eq!(token.token_type, "Bearer");
    }

    #[tokio::test]
    async fn test_request_token_unauthorized_is_denied() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "unauthorized_client",
                "error_description": "Invalid client or Invalid client credentials"
            })))
            .mount(&server)
            .await;

        let config = make_config(&server.uri());
        let client = KeycloakAuthClient::new(config.clone());
        let result = client.request_token(&config).await;

        match result {
            Err(KeycloakError::AuthDenied(msg)) => assert!(msg.contains("unauthorized_client")),
            other => panic!("AuthDenied が期待される: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_token_invalid_client_is_denied() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "invalid_client"})),
            )
            .mount(&server)
            .await;

        let config = make_config(&server.uri());
        let client = KeycloakAuthClient::new(config.clone());
        let result = client.request_token(&config).await;
        assert!(matches!(result, Err(KeycloakError::AuthDenied(_))));
    }

    #[tokio::test]
    async fn test_request_token_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let config = make_config(&server.uri());
        let client = KeycloakAuthClient::new(config.clone());
        let result = client.request_token(&config).await;

        match result {
            Err(KeycloakError::AuthUnavailable(msg)) => assert!(msg.contains("503")),
            other => panic!("AuthUnavailable が期待される: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_token_invalid_body_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .mount(&server)
            .await;

        let config = make_config(&server.uri());
        let client = KeycloakAuthClient::new(config.clone());
        let result = client.request_token(&config).await;
        assert!(matches!(result, Err(KeycloakError::AuthUnavailable(_))));
    }

    #[tokio::test]
    async fn test_request_token_connection_refused_is_unavailable() {
        let config = make_config("http://127.0.0.1:1");
        let client = KeycloakAuthClient::new(config.clone());
        let result = client.request_token(&config).await;
        assert!(matches!(result, Err(KeycloakError::AuthUnavailable(_))));
    }

    #[test]
    fn test_get_client_is_lazy_and_idempotent() {
        let client = KeycloakAuthClient::new(make_config("https://auth.example.com"));
        assert!(!client.is_closed());
        assert!(client.get_client().is_ok());
        assert!(client.get_client().is_ok());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_fails_fast() {
        let config = make_config("https://auth.example.com");
        let client = KeycloakAuthClient::new(config.clone());
        client.get_client().unwrap();

        client.close();
        client.close();

        assert!(client.is_closed());
        assert!(matches!(
            client.get_client(),
            Err(KeycloakError::AuthUnavailable(_))
        ));
        assert!(matches!(
            client.request_token(&config).await,
            Err(KeycloakError::AuthUnavailable(_))
        ));
    }

    #[test]
    fn test_close_before_first_use() {
        let client = KeycloakAuthClient::new(make_config("https://auth.example.com"));
        client.close();
        assert!(client.get_client().is_err());
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure(StatusCode::FORBIDDEN, ""),
            KeycloakError::AuthDenied(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::TOO_MANY_REQUESTS, ""),
            KeycloakError::AuthUnavailable(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::NOT_FOUND, "{\"error\":\"Realm does not exist\"}"),
            KeycloakError::AuthUnavailable(_)
        ));
    }
}
