//! sucrim-server-common: バックエンドサービス共通のサーバー基盤。
//!
//! 統一レスポンスエンベロープ（`ApiResponse`）、監査フィールド（`BaseAudit`）、
//! HTTP ステータスに対応付けたエラー体系（`ServiceError`）、およびロガー初期化を提供する。
//! `axum` フィーチャーを有効にすると `ServiceError` / `ApiResponse` が `IntoResponse` を実装する。

pub mod audit;
pub mod error;
pub mod logger;
pub mod response;

pub use audit::BaseAudit;
pub use error::{ErrorBody, ErrorDetail, ServiceError};
pub use logger::init_logger;
pub use response::ApiResponse;
