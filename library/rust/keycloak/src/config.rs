//! Keycloak サービスアカウント認証の設定構造体。

use crate::error::KeycloakError;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

/// timeout_secs のデフォルト値（10 秒）。
fn default_timeout_secs() -> u64 {
    10
}

/// connect_timeout_secs のデフォルト値（5 秒）。
fn default_connect_timeout_secs() -> u64 {
    5
}

/// refresh_margin_secs のデフォルト値（30 秒）。
fn default_refresh_margin_secs() -> u64 {
    30
}

/// max_attempts のデフォルト値（3 回）。
fn default_max_attempts() -> u32 {
    3
}

/// initial_backoff_ms のデフォルト値（200 ミリ秒）。
fn default_initial_backoff_ms() -> u64 {
    200
}

/// max_backoff_ms のデフォルト値（5 秒）。
fn default_max_backoff_ms() -> u64 {
    5_000
}

/// KeycloakConfig は Keycloak クライアントの設定を表す。
///
/// プロセス起動時に一度だけ生成し、`Arc` で各コンポーネントと共有する。
/// YAML / JSON から serde でデシリアライズ可能。環境変数からは [`KeycloakConfig::from_env`] で読み込む。
#[derive(Debug, Clone, Deserialize)]
pub struct KeycloakConfig {
    /// Keycloak のベース URL（例: `https://auth.example.com`）。
    pub server_url: String,

    /// Realm 名。
    pub realm: String,

    /// OAuth2 クライアント ID（サービスアカウント）。
    pub client_id: String,

    /// OAuth2 クライアントシークレット。Debug 出力では伏せ字になる。
    pub client_secret: SecretString,

    /// トークンエンドポイント 1 回あたりのタイムアウト秒数（デフォルト: 10 秒）。
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// TCP 接続確立のタイムアウト秒数（デフォルト: 5 秒）。
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// 有効期限の何秒前からトークンを無効とみなすか（デフォルト: 30 秒）。
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,

    /// リフレッシュ時の最大試行回数（デフォルト: 3 回）。
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// リトライ初回の待機ミリ秒（デフォルト: 200 ミリ秒）。
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// リトライ待機の上限ミリ秒（デフォルト: 5000 ミリ秒）。
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl KeycloakConfig {
    /// 必須項目のみで KeycloakConfig を生成する。その他はデフォルト値が使用される。
    pub fn new(server_url: &str, realm: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            realm: realm.to_string(),
            client_id: client_id.to_string(),
            client_secret: SecretString::new(client_secret.to_string()),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            refresh_margin_secs: default_refresh_margin_secs(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }

    /// 環境変数から設定を読み込む。
    ///
    /// 必須: `KEYCLOAK_SERVER_URL`, `KEYCLOAK_REALM`, `KEYCLOAK_CLIENT_ID`, `KEYCLOAK_CLIENT_SECRET`
    ///
    /// 任意: `KEYCLOAK_TIMEOUT_SECS`, `KEYCLOAK_CONNECT_TIMEOUT_SECS`, `KEYCLOAK_REFRESH_MARGIN_SECS`,
    /// `KEYCLOAK_MAX_ATTEMPTS`, `KEYCLOAK_INITIAL_BACKOFF_MS`, `KEYCLOAK_MAX_BACKOFF_MS`
    pub fn from_env() -> Result<Self, KeycloakError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意のキー参照関数から設定を組み立てる。`from_env` とテストで共有する。
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, KeycloakError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| KeycloakError::InvalidConfig(format!("{key} が設定されていません")))
        };

        let mut config = Self::new(
            &required("KEYCLOAK_SERVER_URL")?,
            &required("KEYCLOAK_REALM")?,
            &required("KEYCLOAK_CLIENT_ID")?,
            &required("KEYCLOAK_CLIENT_SECRET")?,
        );

        if let Some(v) = parse_optional(&lookup, "KEYCLOAK_TIMEOUT_SECS")? {
            config.timeout_secs = v;
        }
        if let Some(v) = parse_optional(&lookup, "KEYCLOAK_CONNECT_TIMEOUT_SECS")? {
            config.connect_timeout_secs = v;
        }
        if let Some(v) = parse_optional(&lookup, "KEYCLOAK_REFRESH_MARGIN_SECS")? {
            config.refresh_margin_secs = v;
        }
        if let Some(v) = parse_optional(&lookup, "KEYCLOAK_MAX_ATTEMPTS")? {
            config.max_attempts = v;
        }
        if let Some(v) = parse_optional(&lookup, "KEYCLOAK_INITIAL_BACKOFF_MS")? {
            config.initial_backoff_ms = v;
        }
        if let Some(v) = parse_optional(&lookup, "KEYCLOAK_MAX_BACKOFF_MS")? {
            config.max_backoff_ms = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// タイムアウト秒数を設定する。
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// 接続タイムアウト秒数を設定する。
    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// 安全マージン秒数を設定する。
    pub fn with_refresh_margin_secs(mut self, secs: u64) -> Self {
        self.refresh_margin_secs = secs;
        self
    }

    /// 最大試行回数を設定する。
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// バックオフの初期値と上限（ミリ秒）を設定する。
    pub fn with_backoff_ms(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.initial_backoff_ms = initial_ms;
        self.max_backoff_ms = max_ms;
        self
    }

    /// 設定値のバリデーション。
    pub fn validate(&self) -> Result<(), KeycloakError> {
        if self.server_url.is_empty() {
            return Err(KeycloakError::InvalidConfig("server_url is required".into()));
        }
        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            return Err(KeycloakError::InvalidConfig(format!(
                "server_url must start with http:// or https://: {}",
                self.server_url
            )));
        }
        if self.realm.is_empty() {
            return Err(KeycloakError::InvalidConfig("realm is required".into()));
        }
        if self.client_id.is_empty() {
            return Err(KeycloakError::InvalidConfig("client_id is required".into()));
        }
        if self.client_secret.expose_secret().is_empty() {
            return Err(KeycloakError::InvalidConfig("client_secret is required".into()));
        }
        if self.max_attempts == 0 {
            return Err(KeycloakError::InvalidConfig("max_attempts must be > 0".into()));
        }
        if self.timeout_secs == 0 {
            return Err(KeycloakError::InvalidConfig("timeout_secs must be > 0".into()));
        }
        Ok(())
    }

    /// Realm の発行者 URL（`{server_url}/realms/{realm}`）を返す。
    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.server_url.trim_end_matches('/'), self.realm)
    }

    /// Client Credentials フローのトークンエンドポイント URL を返す。
    pub fn token_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.issuer())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }
}

fn parse_optional<F, T>(lookup: &F, key: &str) -> Result<Option<T>, KeycloakError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            KeycloakError::InvalidConfig(format!("{key} の値が不正です: {raw}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("KEYCLOAK_SERVER_URL", "https://auth.example.com/"),
        ("KEYCLOAK_REALM", "phoenix"),
        ("KEYCLOAK_CLIENT_ID", "order-service"),
        ("KEYCLOAK_CLIENT_SECRET", "s3cr3t"),
    ];

    #[test]
    fn test_new_sets_defaults() {
        let config = KeycloakConfig::new("https://auth.example.com", "phoenix", "svc", "sec");
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.refresh_margin_secs, 30);
        assert_eq!(config.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_token_endpoint() {
        let config = KeycloakConfig::new("https://auth.example.com/", "phoenix", "svc", "sec");
        assert_eq!(
            config.token_endpoint(),
            "https://auth.example.com/realms/phoenix/protocol/openid-connect/token"
        );
        assert_eq!(config.issuer(), "https://auth.example.com/realms/phoenix");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = KeycloakConfig::new("https://auth.example.com", "phoenix", "svc", "top-secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("top-secret"));
    }

    #[test]
    fn test_from_lookup_required_only() {
        let config = KeycloakConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();
        assert_eq!(config.server_url, "https://auth.example.com");
        assert_eq!(config.realm, "phoenix");
        assert_eq!(config.client_id, "order-service");
        assert_eq!(config.client_secret.expose_secret(), "s3cr3t");
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("KEYCLOAK_TIMEOUT_SECS", "3"));
        pairs.push(("KEYCLOAK_REFRESH_MARGIN_SECS", "60"));
        pairs.push(("KEYCLOAK_MAX_ATTEMPTS", "5"));
        pairs.push(("KEYCLOAK_INITIAL_BACKOFF_MS", "10"));
        let config = KeycloakConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.timeout_secs, 3);
        assert_eq!(config.refresh_margin_secs, 60);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_backoff_ms, 10);
    }

    #[test]
    fn test_from_lookup_missing_required() {
        let result = KeycloakConfig::from_lookup(lookup_from(&REQUIRED[..3]));
        match result {
            Err(KeycloakError::InvalidConfig(msg)) => assert!(msg.contains("KEYCLOAK_CLIENT_SECRET")),
            other => panic!("InvalidConfig が期待される: {other:?}"),
        }
    }

    #[test]
    fn test_from_lookup_invalid_number() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("KEYCLOAK_MAX_ATTEMPTS", "many"));
        let result = KeycloakConfig::from_lookup(lookup_from(&pairs));
        assert!(matches!(result, Err(KeycloakError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = KeycloakConfig::new("https://auth.example.com", "phoenix", "svc", "sec")
            .with_max_attempts(0);
        assert!(matches!(config.validate(), Err(KeycloakError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let config = KeycloakConfig::new("auth.example.com", "phoenix", "svc", "sec");
        assert!(matches!(config.validate(), Err(KeycloakError::InvalidConfig(_))));
    }

    #[test]
    fn test_serde_defaults_applied() {
        let json = r#"{
            "server_url": "https://auth.example.com",
            "realm": "phoenix",
            "client_id": "svc",
            "client_secret": "sec"
        }"#;

        let config: KeycloakConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.refresh_margin_secs, 30);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_backoff_ms, 200);
        assert_eq!(config.max_backoff_ms, 5_000);
    }
}
