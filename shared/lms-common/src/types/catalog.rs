//! Catalog Types

use serde::{Deserialize, Serialize};

/// Where a lesson video is hosted. Derived from the video URL on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "video_source", rename_all = "SCREAMING_SNAKE_CASE")
)]
pub enum VideoSource {
    Youtube,
    GoogleDrive,
    DirectUpload,
}

/// Pagination metadata returned alongside list results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    /// Total number of matching rows.
    pub total: i64,
    /// 1-based page number.
    pub page: i64,
    /// Page size.
    pub limit: i64,
    /// Number of pages at this page size.
    pub total_pages: i64,
}

impl PageMeta {
    /// Build metadata for a page of `limit` rows out of `total`.
    #[must_use]
    pub const fn new(total: i64, page: i64, limit: i64) -> Self {
        let total_pages = if limit > 0 {
            (total + limit - 1) / limit
        } else {
            0
        };
        Self {
            total,
            page,
            limit,
            total_pages,
        }
    }
}

/// A page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_rounds_up() {
        assert_eq!(PageMeta::new(10, 1, 9).total_pages, 2);
        assert_eq!(PageMeta::new(9, 1, 9).total_pages, 1);
        assert_eq!(PageMeta::new(0, 1, 9).total_pages, 0);
    }

    #[test]
    fn test_meta_wire_format() {
        let json = serde_json::to_value(PageMeta::new(20, 2, 9)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"total": 20, "page": 2, "limit": 9, "totalPages": 3})
        );
    }

    #[test]
    fn test_video_source_wire_format() {
        assert_eq!(
            serde_json::to_string(&VideoSource::GoogleDrive).unwrap(),
            "\"GOOGLE_DRIVE\""
        );
    }
}
