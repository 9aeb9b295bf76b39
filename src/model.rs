use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One tutorial video's metadata plus user-assigned flags, keyed by the
/// platform video identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tutorial {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub channel_name: String,
    pub channel_id: String,
    pub published_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub view_count: i64,
    pub like_count: i64,
    pub thumbnail_url: String,
    pub video_url: String,
    pub programming_language: Option<String>,
    pub subject: Option<String>,
    pub country_code: Option<String>,
    /// Stamped by the store at first insertion; `None` until then.
    pub added_at: Option<DateTime<Utc>>,
    pub is_favorite: bool,
    pub is_watched: bool,
}

/// Upload-recency window applied to search queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UploadDateFilter {
    Hour,
    Today,
    Week,
    Month,
    Year,
    Any,
}

impl UploadDateFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadDateFilter::Hour => "hour",
            UploadDateFilter::Today => "today",
            UploadDateFilter::Week => "week",
            UploadDateFilter::Month => "month",
            UploadDateFilter::Year => "year",
            UploadDateFilter::Any => "any",
        }
    }

    /// Earliest acceptable publish time for the window ending at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let lookback = match self {
            UploadDateFilter::Hour => Duration::hours(1),
            UploadDateFilter::Today => Duration::days(1),
            UploadDateFilter::Week => Duration::weeks(1),
            UploadDateFilter::Month => Duration::days(30),
            UploadDateFilter::Year => Duration::days(365),
            UploadDateFilter::Any => Duration::days(365 * 10),
        };
        now - lookback
    }

    /// RFC 3339 UTC timestamp with second precision, as the search API
    /// expects for its `publishedAfter` parameter.
    pub fn published_after(&self, now: DateTime<Utc>) -> String {
        self.cutoff(now).format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

/// Per-category row counts over the stored collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoriesSummary {
    pub total: i64,
    pub by_language: BTreeMap<String, i64>,
    pub by_subject: BTreeMap<String, i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn date_filter_windows() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 30, 45).unwrap();
        assert_eq!(
            UploadDateFilter::Hour.published_after(now),
            "2024-03-15T11:30:45Z"
        );
        assert_eq!(
            UploadDateFilter::Today.published_after(now),
            "2024-03-14T12:30:45Z"
        );
        assert_eq!(
            UploadDateFilter::Week.published_after(now),
            "2024-03-08T12:30:45Z"
        );
        assert_eq!(
            UploadDateFilter::Month.published_after(now),
            "2024-02-14T12:30:45Z"
        );
        assert_eq!(
            UploadDateFilter::Year.published_after(now),
            "2023-03-16T12:30:45Z"
        );
    }

    #[test]
    fn date_filter_any_reaches_far_back() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        let cutoff = UploadDateFilter::Any.cutoff(now);
        assert!(now - cutoff >= Duration::days(3650));
    }

    #[test]
    fn date_filter_parses_from_yaml() {
        let f: UploadDateFilter = serde_yaml::from_str("month").unwrap();
        assert_eq!(f, UploadDateFilter::Month);
        assert_eq!(f.as_str(), "month");
    }

    #[test]
    fn summary_default_is_empty() {
        let s = CategoriesSummary::default();
        assert_eq!(s.total, 0);
        assert!(s.by_language.is_empty());
        assert!(s.by_subject.is_empty());
    }
}
