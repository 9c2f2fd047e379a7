//! サービスアカウントのアクセストークン。

use chrono::{DateTime, Duration, Utc};

/// Client Credentials フローで取得したアクセストークン。
///
/// 有効期限は取得時点の `expires_in` から絶対時刻に変換して保持する。
/// リフレッシュ時は丸ごと置き換えられ、生成後に変更されることはない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Bearer アクセストークン文字列。
    pub access_token: String,

    /// トークン種別（通常は "Bearer"）。
    pub token_type: String,

    /// トークンの有効期限（UTC）。
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// 現在時刻から `expires_in` 秒後に失効する AccessToken を生成する。
    pub fn new(access_token: String, token_type: String, expires_in: u64) -> Self {
        let secs = i64::try_from(expires_in)
            .unwrap_or(MAX_LIFETIME_SECS)
            .min(MAX_LIFETIME_SECS);
        Self::with_expiry(access_token, token_type, Utc::now() + Duration::seconds(secs))
    }

    /// 有効期限を直接指定して AccessToken を生成する。
    pub fn with_expiry(access_token: String, token_type: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token,
            token_type,
            expires_at,
        }
    }

    /// 安全マージンを差し引いても現在時刻で有効かどうかを返す。
    pub fn is_valid(&self, margin: std::time::Duration) -> bool {
        self.is_valid_at(Utc::now(), margin)
    }

    /// 指定時刻 `now` が `expires_at - margin` より前であれば有効とみなす。
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: std::time::Duration) -> bool {
        self.expires_at
            .checked_sub_signed(to_chrono(margin))
            .is_some_and(|deadline| now < deadline)
    }

    /// 安全マージン差し引き後の残り有効時間を返す。失効済みなら負の値になる。
    pub fn remaining(&self, margin: std::time::Duration) -> Duration {
        (self.expires_at - Utc::now())
            .checked_sub(&to_chrono(margin))
            .unwrap_or(Duration::MIN)
    }

    /// Authorization ヘッダー用の Bearer 文字列を返す。
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// expires_in の上限（10 年）。異常値による時刻演算のオーバーフローを防ぐ。
const MAX_LIFETIME_SECS: i64 = 10 * 365 * 24 * 60 * 60;

fn to_chrono(d: std::time::Duration) -> Duration {
    Duration::from_std(d).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn token_expiring_in(secs: i64) -> AccessToken {
        AccessToken::with_expiry(
            "tok".to_string(),
            "Bearer".to_string(),
            Utc::now() + Duration::seconds(secs),
        )
    }

    #[test]
    fn test_fresh_token_is_valid() {
        let token = AccessToken::new("tok".to_string(), "Bearer".to_string(), 300);
        assert!(token.is_valid(StdDuration::from_secs(30)));
    }

    #[test]
    fn test_token_within_margin_is_invalid() {
        // 残り 20 秒、マージン 30 秒 → 無効
        let token = token_expiring_in(20);
        assert!(!token.is_valid(StdDuration::from_secs(30)));
        assert!(token.remaining(StdDuration::from_secs(30)) < Duration::zero());
    }

    #[test]
    fn test_expired_token_is_invalid() {
        let token = token_expiring_in(-5);
        assert!(!token.is_valid(StdDuration::ZERO));
    }

    #[test]
    fn test_boundary_is_invalid() {
        // now == expires_at - margin は無効（厳密に手前である必要がある）
        let now = Utc::now();
        let token = AccessToken::with_expiry(
            "tok".to_string(),
            "Bearer".to_string(),
            now + Duration::seconds(30),
        );
        assert!(!token.is_valid_at(now, StdDuration::from_secs(30)));
        assert!(token.is_valid_at(now - Duration::seconds(1), StdDuration::from_secs(30)));
    }

    #[test]
    fn test_zero_lifetime_token_is_immediately_invalid() {
        let token = AccessToken::new("tok".to_string(), "Bearer".to_string(), 0);
        assert!(!token.is_valid(StdDuration::from_secs(30)));
    }

    #[test]
    fn test_new_sets_expiry_from_expires_in() {
        let before = Utc::now();
        let token = AccessToken::new("tok".to_string(), "Bearer".to_string(), 900);
        let after = Utc::now();

        assert!(token.expires_at >= before + Duration::seconds(900));
        assert!(token.expires_at <= after + Duration::seconds(900));
    }

    #[test]
    fn test_bearer_header() {
        let token = AccessToken::new("my-access-token".to_string(), "bearer".to_string(), 900);
        assert_eq!(token.bearer_header(), "Bearer my-access-token");
    }
}
