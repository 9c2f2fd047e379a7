//! サービスアカウントトークンのキャッシュと単一フライトリフレッシュ。

use crate::client::{KeycloakAuthClient, TokenEndpoint};
use crate::config::KeycloakConfig;
use crate::error::KeycloakError;
use crate::retry::RetryPolicy;
use crate::token::AccessToken;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// 進行中リフレッシュの結果。完了前は `None`。
type RefreshOutcome = Option<Result<AccessToken, KeycloakError>>;

#[derive(Default)]
struct CacheState {
    current: Option<AccessToken>,
    /// 進行中のリフレッシュ。存在する間は新たなリフレッシュを開始しない。
    inflight: Option<watch::Receiver<RefreshOutcome>>,
    closed: bool,
}

struct Inner<E> {
    config: Arc<KeycloakConfig>,
    endpoint: Arc<E>,
    policy: RetryPolicy,
    state: Mutex<CacheState>,
}

/// TokenProvider はサービスアカウントのアクセストークンをキャッシュし、期限前に自動で更新する。
///
/// - キャッシュ済みトークンが安全マージンを差し引いて有効なら、そのまま返す。
/// - 無効なら最初の呼び出し元がリフレッシュタスクを起動し、並行する呼び出し元は同じ結果を待つ。
///   トークンエンドポイントへの同時リクエストは常に 1 本に抑えられる。
/// - リフレッシュタスクは待機者から独立して動くため、待機者がタイムアウトで離脱しても中断されない。
/// - リフレッシュが失敗した場合に期限切れのトークンを代わりに返すことはない。
///
/// clone するとキャッシュを共有するハンドルが得られる。
pub struct TokenProvider<E = KeycloakAuthClient> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for TokenProvider<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl TokenProvider<KeycloakAuthClient> {
    /// 設定を検証し、Keycloak の HTTP クライアントを使う TokenProvider を生成する。
    pub fn new(config: KeycloakConfig) -> Result<Self, KeycloakError> {
        config.validate()?;
        let config = Arc::new(config);
        let client = Arc::new(KeycloakAuthClient::new(Arc::clone(&config)));
        Ok(Self::with_endpoint(config, client))
    }
}

impl<E: TokenEndpoint + 'static> TokenProvider<E> {
    /// 任意の TokenEndpoint を使う TokenProvider を生成する。リトライ設定は config から導出する。
    pub fn with_endpoint(config: Arc<KeycloakConfig>, endpoint: Arc<E>) -> Self {
        let policy = RetryPolicy::from_config(&config);
        Self::with_policy(config, endpoint, policy)
    }

    /// リトライポリシーを明示して TokenProvider を生成する。
    pub fn with_policy(config: Arc<KeycloakConfig>, endpoint: Arc<E>, policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                endpoint,
                policy,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    pub fn config(&self) -> &KeycloakConfig {
        &self.inner.config
    }

    /// 下流サービスの呼び出しにも使える認証クライアントを返す。
    pub fn auth_client(&self) -> Arc<E> {
        Arc::clone(&self.inner.endpoint)
    }

    /// 有効なアクセストークンを返す（期限切れなら自動更新）。
    ///
    /// リトライ上限まで失敗した場合は `AuthUnavailable`、資格情報が拒否された場合は
    /// リトライせずに `AuthDenied` を返す。
    pub async fn get_token(&self) -> Result<AccessToken, KeycloakError> {
        let mut rx = {
            let mut state = self.inner.lock_state();
            if state.closed {
                return Err(closed_error());
            }

            let margin = self.inner.config.refresh_margin();
            if let Some(token) = state.current.as_ref().filter(|t| t.is_valid(margin)) {
                debug!("キャッシュ済みトークンを返します");
                return Ok(token.clone());
            }

            // 送信側が破棄済み（タスクが異常終了した）チャネルは進行中とみなさない
            let live = state.inflight.as_ref().filter(|rx| rx.has_changed().is_ok());
            if let Some(rx) = live {
                debug!("進行中のリフレッシュの完了を待機します");
                rx.clone()
            } else {
                debug!("トークンをリフレッシュします");
                let (tx, rx) = watch::channel(None);
                state.inflight = Some(rx.clone());
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    inner.run_refresh(tx).await;
                });
                rx
            }
        };

        let outcome = {
            let value = rx.wait_for(Option::is_some).await.map_err(|_| {
                KeycloakError::AuthUnavailable(
                    "リフレッシュタスクが結果を返さずに終了しました".to_string(),
                )
            })?;
            (*value).clone()
        };

        outcome.unwrap_or_else(|| {
            Err(KeycloakError::AuthUnavailable(
                "リフレッシュ結果を取得できませんでした".to_string(),
            ))
        })
    }

    /// Authorization ヘッダー用の `"Bearer <access_token>"` 文字列を返す。
    pub async fn get_token_string(&self) -> Result<String, KeycloakError> {
        Ok(self.get_token().await?.bearer_header())
    }

    /// キャッシュ済みトークンを破棄する。次回の `get_token` でリフレッシュされる。
    ///
    /// 下流サービスが 401 を返した場合など、トークンの失効が判明したときに使用する。
    pub fn invalidate(&self) {
        let mut state = self.inner.lock_state();
        if state.current.take().is_some() {
            debug!("キャッシュ済みトークンを破棄しました");
        }
    }

    /// トークンキャッシュを破棄し、認証クライアントのトランスポートを解放する。
    ///
    /// 複数回呼び出しても安全。以降の `get_token` は即座に `AuthUnavailable` を返す。
    pub fn close(&self) {
        {
            let mut state = self.inner.lock_state();
            if state.closed {
                return;
            }
            state.closed = true;
            state.current = None;
        }
        self.inner.endpoint.close();
        info!(client_id = %self.inner.config.client_id, "トークンプロバイダーをクローズしました");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock_state().closed
    }
}

impl<E> Inner<E> {
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: TokenEndpoint> Inner<E> {
    /// リフレッシュを実行し、成功すればキャッシュを置き換えてから待機者へ結果を通知する。
    async fn run_refresh(self: Arc<Self>, tx: watch::Sender<RefreshOutcome>) {
        let result = self.refresh_with_retry().await;
        {
            let mut state = self.lock_state();
            if let Ok(token) = &result {
                if !state.closed {
                    state.current = Some(token.clone());
                }
            }
            state.inflight = None;
        }
        tx.send_replace(Some(result));
    }

    async fn refresh_with_retry(&self) -> Result<AccessToken, KeycloakError> {
        let max_attempts = self.policy.max_attempts;
        let margin = self.config.refresh_margin();
        let mut last_error: Option<KeycloakError> = None;

        for attempt in 0..max_attempts {
            if self.lock_state().closed {
                return Err(closed_error());
            }

            let outcome = match tokio::time::timeout(
                self.config.timeout(),
                self.endpoint.request_token(&self.config),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(KeycloakError::AuthUnavailable(format!(
                    "トークン取得が {} 秒以内に完了しませんでした",
                    self.config.timeout_secs
                ))),
            };

            match outcome {
                Ok(token) => {
                    if !token.is_valid(margin) {
                        warn!(
                            expires_at = %token.expires_at,
                            refresh_margin_secs = self.config.refresh_margin_secs,
                            "取得したトークンの残り有効時間が安全マージン未満です"
                        );
                    }
                    info!(
                        client_id = %self.config.client_id,
                        attempt = attempt + 1,
                        expires_at = %token.expires_at,
                        "トークンをリフレッシュしました"
                    );
                    return Ok(token);
                }
                Err(e) if !e.is_retryable() => {
                    error!(error = %e, "トークン取得が拒否されました。リトライしません");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = max_attempts,
                        error = %e,
                        "トークン取得に失敗しました"
                    );
                    last_error = Some(e);
                    if attempt + 1 < max_attempts {
                        tokio::time::sleep(self.policy.compute_delay(attempt)).await;
                    }
                }
            }
        }

        let detail = last_error.map_or_else(|| "試行なし".to_string(), |e| e.to_string());
        error!(
            client_id = %self.config.client_id,
            attempts = max_attempts,
            "すべてのリトライが失敗しました"
        );
        Err(KeycloakError::AuthUnavailable(format!(
            "すべてのリトライが失敗しました ({max_attempts} 回): {detail}"
        )))
    }
}

fn closed_error() -> KeycloakError {
    KeycloakError::AuthUnavailable("トークンプロバイダーはクローズ済みです".to_string())
}
