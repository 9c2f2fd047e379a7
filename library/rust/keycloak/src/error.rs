//! Keycloak 認証ヘルパーのエラー定義。

/// KeycloakError はトークン取得・デコード処理で発生するエラーを表す。
///
/// 単一フライトのリフレッシュ結果を複数の待機者で共有するため `Clone` を実装する。
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KeycloakError {
    /// Keycloak に到達できない、タイムアウトした、またはサーバーエラーを返した。
    /// リトライ上限まで再試行した後に呼び出し元へ返される。
    #[error("認証サーバー利用不可: {0}")]
    AuthUnavailable(String),

    /// Keycloak がクライアント資格情報を明示的に拒否した。リトライしない。
    #[error("認証拒否: {0}")]
    AuthDenied(String),

    /// ベアラートークンの構造が不正でデコードできない。
    #[error("不正なトークン: {0}")]
    TokenMalformed(String),

    /// 設定値が不正。
    #[error("設定エラー: {0}")]
    InvalidConfig(String),
}

impl KeycloakError {
    /// リトライで回復し得るエラーかどうかを返す。
    pub fn is_retryable(&self) -> bool {
        matches!(self, KeycloakError::AuthUnavailable(_))
    }
}
