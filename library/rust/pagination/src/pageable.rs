use crate::page::Pagination;
use crate::sort::{create_sort, SortInfo};
use serde::{Deserialize, Serialize};

/// データアクセス層に渡すページ指定。`page_index` は 0 始まり。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pageable {
    pub page_index: u32,
    pub page_size: u32,
    pub sort: Vec<SortInfo>,
}

impl Pageable {
    /// `Pagination` の `sort_by` / `sort_direction` も含めて変換する。
    pub fn from_pagination(pagination: &Pagination) -> Self {
        let (page_index, page_size, sort) = create_pageable_with_sort(pagination);
        Self {
            page_index,
            page_size,
            sort,
        }
    }

    /// 先頭からの読み飛ばし件数（OFFSET）。
    pub fn offset(&self) -> u64 {
        u64::from(self.page_index) * u64::from(self.page_size)
    }
}

impl From<&Pagination> for Pageable {
    fn from(pagination: &Pagination) -> Self {
        Self::from_pagination(pagination)
    }
}

/// 1 始まりの `page` を 0 始まりに変換し、`(page_index, page_size)` を返す。`page` が 0 でも 0 に丸める。
pub fn create_pageable_params(pagination: &Pagination) -> (u32, u32) {
    (pagination.page.saturating_sub(1), pagination.page_size)
}

/// `(page_index, page_size, sort)` を返す。
pub fn create_pageable_with_sort(pagination: &Pagination) -> (u32, u32, Vec<SortInfo>) {
    let (page_index, page_size) = create_pageable_params(pagination);
    let sort = create_sort(
        pagination.sort_by.as_deref(),
        pagination.sort_direction.as_deref(),
    );
    (page_index, page_size, sort)
}
