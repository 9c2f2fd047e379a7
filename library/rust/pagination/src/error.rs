use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaginationError {
    #[error("invalid page: {0} (must be >= 1)")]
    InvalidPage(u32),

    #[error("invalid page_size: {0} (must be > 0)")]
    InvalidPageSize(u32),
}
