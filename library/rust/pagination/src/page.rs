use crate::error::PaginationError;
use serde::{Deserialize, Serialize};

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    10
}

fn default_sort_by() -> Option<String> {
    Some("created_at".to_string())
}

fn default_sort_direction() -> Option<String> {
    Some("desc".to_string())
}

/// API の入出力に使うページ情報。`page` は 1 始まり。
///
/// `total_elements` が設定されると `total_pages` は切り上げ除算で算出される。
/// デシリアライズ時に `total_elements` が含まれていれば同様に再計算する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PaginationFields")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub sort_by: Option<String>,
    pub sort_direction: Option<String>,
    pub total_elements: Option<u64>,
    pub total_pages: Option<u64>,
}

#[derive(Deserialize)]
struct PaginationFields {
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_page_size")]
    page_size: u32,
    #[serde(default = "default_sort_by")]
    sort_by: Option<String>,
    #[serde(default = "default_sort_direction")]
    sort_direction: Option<String>,
    #[serde(default)]
    total_elements: Option<u64>,
    #[serde(default)]
    total_pages: Option<u64>,
}

impl From<PaginationFields> for Pagination {
    fn from(f: PaginationFields) -> Self {
        let mut pagination = Self {
            page: f.page,
            page_size: f.page_size,
            sort_by: f.sort_by,
            sort_direction: f.sort_direction,
            total_elements: None,
            total_pages: f.total_pages,
        };
        if let Some(total) = f.total_elements {
            pagination.set_total_elements(total);
        }
        pagination
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
            sort_by: default_sort_by(),
            sort_direction: default_sort_direction(),
            total_elements: None,
            total_pages: None,
        }
    }
}

impl Pagination {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size,
            ..Default::default()
        }
    }

    pub fn with_sort(mut self, sort_by: impl Into<String>, sort_direction: impl Into<String>) -> Self {
        self.sort_by = Some(sort_by.into());
        self.sort_direction = Some(sort_direction.into());
        self
    }

    /// `page >= 1` かつ `page_size > 0` であることを検証する。
    pub fn validate(&self) -> Result<(), PaginationError> {
        if self.page < 1 {
            return Err(PaginationError::InvalidPage(self.page));
        }
        if self.page_size == 0 {
            return Err(PaginationError::InvalidPageSize(self.page_size));
        }
        Ok(())
    }

    /// 総件数を設定し、総ページ数を再計算する。`page_size` が 0 の場合は総ページ数を変更しない。
    pub fn set_total_elements(&mut self, total: u64) {
        self.total_elements = Some(total);
        if self.page_size > 0 {
            self.total_pages = Some(total.div_ceil(u64::from(self.page_size)));
        }
    }
}
