//! 作成者・更新者と日時を記録する監査フィールド。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// BaseAudit は DTO に埋め込む監査フィールド。日時は RFC 3339 形式でシリアライズされる。
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct OrderDto {
///     id: String,
///     #[serde(flatten)]
///     audit: BaseAudit,
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseAudit {
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_by: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl BaseAudit {
    /// 作成者と現在時刻を記録する。
    pub fn mark_created(&mut self, user: impl Into<String>) {
        self.created_by = Some(user.into());
        self.created_at = Some(Utc::now());
    }

    /// 更新者と現在時刻を記録する。作成情報は変更しない。
    pub fn mark_updated(&mut self, user: impl Into<String>) {
        self.updated_by = Some(user.into());
        self.updated_at = Some(Utc::now());
    }
}
