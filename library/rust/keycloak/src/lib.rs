//! sucrim-keycloak: Keycloak サービスアカウント認証ライブラリ。
//!
//! OAuth2 Client Credentials フローによるアクセストークンの取得とキャッシュ、
//! 並行呼び出しを 1 本にまとめる単一フライトリフレッシュ、指数バックオフ付きリトライ、
//! およびアクセストークンからのユーザー情報抽出を提供する。
//!
//! # 使い方
//!
//! ```ignore
//! use sucrim_keycloak::{claims, KeycloakConfig, TokenProvider};
//!
//! let config = KeycloakConfig::from_env()?;
//! let provider = TokenProvider::new(config)?;
//!
//! // キャッシュ付きトークン取得（期限前に自動リフレッシュ）
//! let bearer = provider.get_token_string().await?;
//!
//! // 受信したリクエストのユーザー情報を抽出（署名は検証しない）
//! let identity = claims::decode(authorization_header)?;
//! if identity.has_role("admin") { /* ... */ }
//!
//! provider.close();
//! ```

pub mod claims;
pub mod client;
pub mod config;
pub mod error;
pub mod provider;
pub mod retry;
pub mod token;

pub use claims::{DecodedIdentity, UserIdentity};
pub use client::{KeycloakAuthClient, TokenEndpoint};
pub use config::KeycloakConfig;
pub use error::KeycloakError;
pub use provider::TokenProvider;
pub use retry::RetryPolicy;
pub use token::AccessToken;

#[cfg(feature = "mock")]
pub use client::MockTokenEndpoint;
