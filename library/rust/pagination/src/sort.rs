use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// 大文字小文字・前後の空白を無視して解釈する。`asc` / `desc` 以外は `None`。
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("asc") {
            Some(Self::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Some(Self::Desc)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1 つのソートキーと方向。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortInfo {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortInfo {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Desc)
    }
}

/// `"name:asc,createdAt:desc"` 形式のソート文字列を解析する。
///
/// - 方向を省略したフィールドは昇順。
/// - `asc` / `desc` 以外の方向は昇順として扱う。
/// - 空の要素やフィールド名が空の要素は読み飛ばす。`":desc"` から `field` が空の
///   `SortInfo` は生成しない。
pub fn parse_sort(sort: &str) -> Vec<SortInfo> {
    sort.split(',')
        .filter_map(|part| {
            let part = part.trim();
            let (field, direction) = match part.split_once(':') {
                Some((field, direction)) => (
                    field.trim(),
                    SortDirection::parse(direction).unwrap_or_default(),
                ),
                None => (part, SortDirection::Asc),
            };
            (!field.is_empty()).then(|| SortInfo::new(field, direction))
        })
        .collect()
}

/// `sort_by` と既定の方向からソート指定を生成する。
///
/// `sort_by` に `,` または `:` を含む場合は [`parse_sort`] と同じ規則で解析し、
/// `default_direction` は使用しない。単一フィールドの場合は `default_direction`
/// （未指定・不正値なら昇順）を適用する。
pub fn create_sort(sort_by: Option<&str>, default_direction: Option<&str>) -> Vec<SortInfo> {
    let Some(sort_by) = sort_by.map(str::trim).filter(|s| !s.is_empty()) else {
        return Vec::new();
    };

    if sort_by.contains(',') || sort_by.contains(':') {
        return parse_sort(sort_by);
    }

    let direction = default_direction
        .and_then(SortDirection::parse)
        .unwrap_or_default();
    vec![SortInfo::new(sort_by, direction)]
}

/// ソート指定を `(field, direction)` の組に変換する。クエリビルダーへの受け渡し用。
pub fn to_sort_params(sort: &[SortInfo]) -> Vec<(String, &'static str)> {
    sort.iter()
        .map(|s| (s.field.clone(), s.direction.as_str()))
        .collect()
}
