//! 統一レスポンスエンベロープ。

use serde::{Deserialize, Serialize};
use sucrim_pagination::Pagination;

/// ApiResponse は成功レスポンスの `{ "data": ..., "pagination": ... }` エンベロープ。
///
/// `None` のフィールドは JSON の `null` として出力する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            pagination: None,
        }
    }

    /// データを持たない成功レスポンス（`{"data": null, "pagination": null}`）。
    pub fn empty() -> Self {
        Self {
            data: None,
            pagination: None,
        }
    }
}

impl<T> ApiResponse<Vec<T>> {
    pub fn ok_with_pagination(data: Vec<T>, pagination: Pagination) -> Self {
        Self {
            data: Some(data),
            pagination: Some(pagination),
        }
    }

    /// ページ取得結果からレスポンスを生成する。`total_elements` が指定されれば総ページ数も更新する。
    pub fn ok_from_page(
        page_result: Vec<T>,
        mut pagination: Pagination,
        total_elements: Option<u64>,
    ) -> Self {
        if let Some(total) = total_elements {
            pagination.set_total_elements(total);
        }
        Self::ok_with_pagination(page_result, pagination)
    }
}

#[cfg(feature = "axum")]
impl<T: Serialize> axum::response::IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        (axum::http::StatusCode::OK, axum::Json(self)).into_response()
    }
}
