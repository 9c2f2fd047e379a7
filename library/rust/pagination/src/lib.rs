//! sucrim-pagination: ページネーションとソート指定のユーティリティ。
//!
//! 1 始まりの `Pagination`（API 入出力用）と、0 始まりの `Pageable`（クエリ用）の相互変換、
//! および `"name:asc,createdAt:desc"` 形式のソート文字列の解析を提供する。

pub mod error;
pub mod page;
pub mod pageable;
pub mod sort;

pub use error::PaginationError;
pub use page::Pagination;
pub use pageable::{create_pageable_params, create_pageable_with_sort, Pageable};
pub use sort::{create_sort, parse_sort, to_sort_params, SortDirection, SortInfo};
