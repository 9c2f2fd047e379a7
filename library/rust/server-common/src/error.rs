//! HTTP ステータスコードに対応付けたサービスエラー体系。
//!
//! すべてのエラーは人間向けメッセージ、発生したプロセス名、任意の詳細リストを持ち、
//! レスポンスボディは `{ "message": ..., "process": ..., "errors": [...] }` になる。

use serde::{Deserialize, Serialize};
use sucrim_keycloak::KeycloakError;
use sucrim_pagination::PaginationError;

/// ErrorDetail はフィールド単位のエラー情報を表す。
///
/// `{ "field": "page", "reason": "must_be_positive", "message": "..." }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub field: String,
    pub reason: String,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(
        field: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// ErrorBody はエラーレスポンスのペイロード。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub process: String,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

impl ErrorBody {
    fn new(message: impl Into<String>, process: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            process: process.into(),
            errors: vec![],
        }
    }
}

impl std::fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.process, self.message)
    }
}

/// ServiceError is a high-level error type that maps to HTTP status codes.
///
/// `Display` は `"{process}: {message}"`。
/// When the `axum` feature is enabled, ServiceError implements `IntoResponse`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// 400 Bad Request
    #[error("{0}")]
    BadRequest(ErrorBody),

    /// 400 Bad Request (入力値検証エラー)
    #[error("{0}")]
    Validation(ErrorBody),

    /// 401 Unauthorized
    #[error("{0}")]
    Unauthorized(ErrorBody),

    /// 403 Forbidden
    #[error("{0}")]
    Forbidden(ErrorBody),

    /// 404 Not Found
    #[error("{0}")]
    NotFound(ErrorBody),

    /// 409 Conflict
    #[error("{0}")]
    Conflict(ErrorBody),

    /// 422 Unprocessable Entity
    #[error("{0}")]
    UnprocessableEntity(ErrorBody),

    /// 業務ルール違反。ステータスコードは呼び出し元が指定する（既定 400）。
    #[error("{body}")]
    Business { status: u16, body: ErrorBody },

    /// 500 Internal Server Error
    #[error("{0}")]
    Internal(ErrorBody),

    /// 503 Service Unavailable
    #[error("{0}")]
    ServiceUnavailable(ErrorBody),
}

impl ServiceError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(ErrorBody::new(message, "Bad Request"))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(ErrorBody::new(message, "Validation Error"))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(ErrorBody::new(message, "Unauthorized"))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(ErrorBody::new(message, "Forbidden"))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(ErrorBody::new(message, "Resource Not Found"))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(ErrorBody::new(message, "Resource Conflict"))
    }

    pub fn unprocessable_entity(message: impl Into<String>) -> Self {
        Self::UnprocessableEntity(ErrorBody::new(message, "Unprocessable Entity"))
    }

    /// 業務エラー（400）。業務エラーはプロセス名の指定が必須。
    pub fn business(message: impl Into<String>, process: impl Into<String>) -> Self {
        Self::business_with_status(message, process, 400)
    }

    pub fn business_with_status(
        message: impl Into<String>,
        process: impl Into<String>,
        status: u16,
    ) -> Self {
        Self::Business {
            status,
            body: ErrorBody::new(message, process),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(ErrorBody::new(message, "Internal Server Error"))
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(ErrorBody::new(message, "Service Unavailable"))
    }

    /// プロセス名を置き換える。
    pub fn with_process(mut self, process: impl Into<String>) -> Self {
        self.body_mut().process = process.into();
        self
    }

    /// 詳細エラーを設定する。
    pub fn with_errors(mut self, errors: Vec<ErrorDetail>) -> Self {
        self.body_mut().errors = errors;
        self
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) | Self::Validation(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::UnprocessableEntity(_) => 422,
            Self::Business { status, .. } => *status,
            Self::Internal(_) => 500,
            Self::ServiceUnavailable(_) => 503,
        }
    }

    pub fn body(&self) -> &ErrorBody {
        match self {
            Self::BadRequest(body)
            | Self::Validation(body)
            | Self::Unauthorized(body)
            | Self::Forbidden(body)
            | Self::NotFound(body)
            | Self::Conflict(body)
            | Self::UnprocessableEntity(body)
            | Self::Business { body, .. }
            | Self::Internal(body)
            | Self::ServiceUnavailable(body) => body,
        }
    }

    fn body_mut(&mut self) -> &mut ErrorBody {
        match self {
            Self::BadRequest(body)
            | Self::Validation(body)
            | Self::Unauthorized(body)
            | Self::Forbidden(body)
            | Self::NotFound(body)
            | Self::Conflict(body)
            | Self::UnprocessableEntity(body)
            | Self::Business { body, .. }
            | Self::Internal(body)
            | Self::ServiceUnavailable(body) => body,
        }
    }

    /// JSON レスポンスボディに変換する。
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::to_value(self.body()).unwrap_or(serde_json::Value::Null)
    }
}

impl From<KeycloakError> for ServiceError {
    fn from(e: KeycloakError) -> Self {
        let message = e.to_string();
        match e {
            KeycloakError::AuthDenied(_) | KeycloakError::TokenMalformed(_) => {
                Self::unauthorized(message)
            }
            KeycloakError::AuthUnavailable(_) => Self::service_unavailable(message),
            KeycloakError::InvalidConfig(_) => Self::internal(message),
        }
        .with_process("Keycloak Authentication")
    }
}

impl From<PaginationError> for ServiceError {
    fn from(e: PaginationError) -> Self {
        let (field, reason) = match e {
            PaginationError::InvalidPage(_) => ("page", "must_be_positive"),
            PaginationError::InvalidPageSize(_) => ("page_size", "must_be_positive"),
        };
        let message = e.to_string();
        Self::validation(message.clone()).with_errors(vec![ErrorDetail::new(field, reason, message)])
    }
}

// --- axum integration ---

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let status = axum::http::StatusCode::from_u16(self.status_code())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "サーバーエラーを返却します");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "クライアントエラーを返却します");
        }
        (status, axum::Json(self.body().clone())).into_response()
    }
}
