//! Embedded relational adapter backed by SQLite.

use super::TutorialStore;
use crate::model::{CategoriesSummary, Tutorial};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{instrument, warn};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and migrate. Fails fast on an unreachable database; that is
    /// the startup configuration check for this backend.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let normalized = prepare_sqlite_url(database_url);
        let pool = SqlitePool::connect(&normalized).await.with_context(|| {
            format!("failed to open SQLite database at {normalized}; check storage.sqlite.database_url")
        })?;
        // Enable WAL and stricter durability.
        sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=FULL;").execute(&pool).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    async fn fetch_or_empty<'a>(
        &self,
        query: sqlx::query::Query<'a, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'a>>,
        what: &str,
    ) -> Vec<Tutorial> {
        match query.fetch_all(&self.pool).await {
            Ok(rows) => rows.iter().map(row_to_tutorial).collect(),
            Err(err) => {
                warn!(?err, what, "tutorial query failed");
                Vec::new()
            }
        }
    }
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    // Pass through non-sqlite schemes
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // In-memory URLs like sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    // Strip prefix and optional //
    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    // Separate query string if any
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        // nothing to normalize
        return url.to_string();
    }

    // Expand leading ~/ to HOME
    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    // Ensure parent directory exists if any
    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    // Rebuild URL, prefer sqlite:// form
    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

fn row_to_tutorial(row: &SqliteRow) -> Tutorial {
    Tutorial {
        video_id: row.get("video_id"),
        title: row.get("title"),
        description: row.get("description"),
        channel_name: row.get("channel_name"),
        channel_id: row.get("channel_id"),
        published_at: row.get("published_at"),
        duration_seconds: row.get("duration_seconds"),
        view_count: row.get("view_count"),
        like_count: row.get("like_count"),
        thumbnail_url: row.get("thumbnail_url"),
        video_url: row.get("video_url"),
        programming_language: row.get("programming_language"),
        subject: row.get("subject"),
        country_code: row.get("country_code"),
        added_at: row.get("added_at"),
        is_favorite: row.get("is_favorite"),
        is_watched: row.get("is_watched"),
    }
}

#[async_trait]
impl TutorialStore for SqliteStore {
    #[instrument(skip_all, fields(video_id = %tutorial.video_id))]
    async fn add_tutorial(&self, tutorial: &Tutorial) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO tutorials (
                video_id, title, description, channel_name, channel_id,
                published_at, duration_seconds, view_count, like_count,
                thumbnail_url, video_url, programming_language, subject,
                country_code, added_at, is_favorite, is_watched
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0)
             ON CONFLICT(video_id) DO NOTHING",
        )
        .bind(&tutorial.video_id)
        .bind(&tutorial.title)
        .bind(&tutorial.description)
        .bind(&tutorial.channel_name)
        .bind(&tutorial.channel_id)
        .bind(tutorial.published_at)
        .bind(tutorial.duration_seconds)
        .bind(tutorial.view_count)
        .bind(tutorial.like_count)
        .bind(&tutorial.thumbnail_url)
        .bind(&tutorial.video_url)
        .bind(&tutorial.programming_language)
        .bind(&tutorial.subject)
        .bind(&tutorial.country_code)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to insert tutorial")?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip_all)]
    async fn tutorials_by_language(&self, language: &str) -> Vec<Tutorial> {
        let query = sqlx::query(
            "SELECT * FROM tutorials WHERE programming_language = ? ORDER BY view_count DESC",
        )
        .bind(language);
        self.fetch_or_empty(query, "by_language").await
    }

    #[instrument(skip_all)]
    async fn tutorials_by_subject(&self, subject: &str) -> Vec<Tutorial> {
        let query =
            sqlx::query("SELECT * FROM tutorials WHERE subject = ? ORDER BY view_count DESC")
                .bind(subject);
        self.fetch_or_empty(query, "by_subject").await
    }

    #[instrument(skip_all)]
    async fn all_tutorials(&self) -> Vec<Tutorial> {
        let query = sqlx::query("SELECT * FROM tutorials ORDER BY added_at DESC");
        self.fetch_or_empty(query, "all").await
    }

    #[instrument(skip_all)]
    async fn search_tutorials(&self, query: &str) -> Vec<Tutorial> {
        let query = sqlx::query(
            "SELECT * FROM tutorials
             WHERE lower(title) LIKE '%' || lower(?) || '%'
                OR lower(description) LIKE '%' || lower(?) || '%'
             ORDER BY view_count DESC",
        )
        .bind(query)
        .bind(query);
        self.fetch_or_empty(query, "search").await
    }

    #[instrument(skip_all)]
    async fn categories_summary(&self) -> CategoriesSummary {
        let mut summary = CategoriesSummary::default();

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tutorials")
            .fetch_one(&self.pool)
            .await;
        summary.total = match total {
            Ok(n) => n,
            Err(err) => {
                warn!(?err, "summary count failed");
                return CategoriesSummary::default();
            }
        };

        for (column, target) in [
            ("programming_language", &mut summary.by_language),
            ("subject", &mut summary.by_subject),
        ] {
            let rows = sqlx::query(&format!(
                "SELECT {column} AS category, COUNT(*) AS n FROM tutorials
                 WHERE {column} IS NOT NULL GROUP BY {column}"
            ))
            .fetch_all(&self.pool)
            .await;
            match rows {
                Ok(rows) => {
                    for row in rows {
                        target.insert(row.get("category"), row.get("n"));
                    }
                }
                Err(err) => {
                    warn!(?err, column, "summary group count failed");
                    return CategoriesSummary::default();
                }
            }
        }

        summary
    }

    #[instrument(skip_all)]
    async fn mark_watched(&self, video_id: &str) {
        let result = sqlx::query("UPDATE tutorials SET is_watched = 1 WHERE video_id = ?")
            .bind(video_id)
            .execute(&self.pool)
            .await;
        match result {
            Ok(r) if r.rows_affected() == 0 => warn!(video_id, "tutorial not found"),
            Ok(_) => {}
            Err(err) => warn!(?err, video_id, "failed to mark watched"),
        }
    }

    #[instrument(skip_all)]
    async fn mark_favorite(&self, video_id: &str, value: bool) {
        let result = sqlx::query("UPDATE tutorials SET is_favorite = ? WHERE video_id = ?")
            .bind(value)
            .bind(video_id)
            .execute(&self.pool)
            .await;
        match result {
            Ok(r) if r.rows_affected() == 0 => warn!(video_id, "tutorial not found"),
            Ok(_) => {}
            Err(err) => warn!(?err, video_id, "failed to mark favorite"),
        }
    }

    #[instrument(skip_all)]
    async fn delete_tutorial(&self, video_id: &str) {
        let result = sqlx::query("DELETE FROM tutorials WHERE video_id = ?")
            .bind(video_id)
            .execute(&self.pool)
            .await;
        match result {
            Ok(r) if r.rows_affected() == 0 => warn!(video_id, "tutorial not found"),
            Ok(_) => {}
            Err(err) => warn!(?err, video_id, "failed to delete tutorial"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    async fn setup_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    fn sample(video_id: &str, language: Option<&str>, views: i64) -> Tutorial {
        Tutorial {
            video_id: video_id.to_string(),
            title: format!("{video_id} title"),
            description: format!("{video_id} description"),
            channel_name: "Test Channel".to_string(),
            channel_id: "UC-test".to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            duration_seconds: 600,
            view_count: views,
            like_count: views / 10,
            thumbnail_url: format!("https://img/{video_id}.jpg"),
            video_url: format!("https://www.youtube.com/watch?v={video_id}"),
            programming_language: language.map(str::to_string),
            subject: None,
            country_code: Some("en".to_string()),
            added_at: None,
            is_favorite: false,
            is_watched: false,
        }
    }

    #[tokio::test]
    async fn add_is_idempotent_by_video_id() {
        let store = setup_store().await;
        let t = sample("abc123", Some("Python"), 100);

        assert!(store.add_tutorial(&t).await.unwrap());
        assert!(!store.add_tutorial(&t).await.unwrap());

        let all = store.all_tutorials().await;
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn round_trip_preserves_descriptive_fields() {
        let store = setup_store().await;
        let mut t = sample("abc123", Some("Python"), 1500);
        t.subject = None;
        store.add_tutorial(&t).await.unwrap();

        let stored = store.all_tutorials().await.remove(0);
        assert!(stored.added_at.is_some());
        assert!(!stored.is_favorite);
        assert!(!stored.is_watched);

        // Everything except the store-assigned fields matches the input.
        let mut normalized = stored.clone();
        normalized.added_at = None;
        assert_eq!(normalized, t);
    }

    #[tokio::test]
    async fn by_language_orders_by_view_count() {
        let store = setup_store().await;
        store
            .add_tutorial(&sample("a", Some("Python"), 100))
            .await
            .unwrap();
        store
            .add_tutorial(&sample("b", Some("Python"), 500))
            .await
            .unwrap();
        store
            .add_tutorial(&sample("c", Some("Python"), 10))
            .await
            .unwrap();
        store
            .add_tutorial(&sample("d", Some("Go"), 9999))
            .await
            .unwrap();

        let views: Vec<i64> = store
            .tutorials_by_language("Python")
            .await
            .iter()
            .map(|t| t.view_count)
            .collect();
        assert_eq!(views, vec![500, 100, 10]);
    }

    #[tokio::test]
    async fn by_subject_filters_on_subject() {
        let store = setup_store().await;
        let mut t = sample("a", None, 100);
        t.subject = Some("Docker".to_string());
        store.add_tutorial(&t).await.unwrap();
        store
            .add_tutorial(&sample("b", Some("Python"), 50))
            .await
            .unwrap();

        let found = store.tutorials_by_subject("Docker").await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].video_id, "a");
    }

    #[tokio::test]
    async fn all_orders_by_added_at_desc() {
        let store = setup_store().await;
        for id in ["first", "second", "third"] {
            store.add_tutorial(&sample(id, None, 1)).await.unwrap();
        }
        // Pin distinct ingestion times to make the ordering observable.
        for (id, ts) in [
            ("first", "2024-01-01T00:00:00Z"),
            ("second", "2024-01-02T00:00:00Z"),
            ("third", "2024-01-03T00:00:00Z"),
        ] {
            sqlx::query("UPDATE tutorials SET added_at = ? WHERE video_id = ?")
                .bind(ts)
                .bind(id)
                .execute(&store.pool)
                .await
                .unwrap();
        }

        let ids: Vec<String> = store
            .all_tutorials()
            .await
            .into_iter()
            .map(|t| t.video_id)
            .collect();
        assert_eq!(ids, vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_over_title_and_description() {
        let store = setup_store().await;
        let mut a = sample("a", None, 10);
        a.title = "Advanced Rust Macros".to_string();
        a.description = "derive and proc macros".to_string();
        let mut b = sample("b", None, 90);
        b.title = "Cooking show".to_string();
        b.description = "nothing about RUST at all... or is it".to_string();
        let mut c = sample("c", None, 50);
        c.title = "Python basics".to_string();
        c.description = "loops and lists".to_string();
        for t in [&a, &b, &c] {
            store.add_tutorial(t).await.unwrap();
        }

        let ids: Vec<String> = store
            .search_tutorials("rust")
            .await
            .into_iter()
            .map(|t| t.video_id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn summary_over_empty_store_is_zero() {
        let store = setup_store().await;
        let summary = store.categories_summary().await;
        assert_eq!(summary, CategoriesSummary::default());
    }

    #[tokio::test]
    async fn summary_counts_non_null_categories() {
        let store = setup_store().await;
        store
            .add_tutorial(&sample("a", Some("Python"), 1))
            .await
            .unwrap();
        store
            .add_tutorial(&sample("b", Some("Python"), 2))
            .await
            .unwrap();
        store
            .add_tutorial(&sample("c", Some("Go"), 3))
            .await
            .unwrap();
        let mut d = sample("d", None, 4);
        d.subject = Some("Docker".to_string());
        store.add_tutorial(&d).await.unwrap();

        let summary = store.categories_summary().await;
        assert_eq!(summary.total, 4);
        assert_eq!(summary.by_language.get("Python"), Some(&2));
        assert_eq!(summary.by_language.get("Go"), Some(&1));
        assert_eq!(summary.by_language.len(), 2);
        assert_eq!(summary.by_subject.get("Docker"), Some(&1));
        assert_eq!(summary.by_subject.len(), 1);
    }

    #[tokio::test]
    async fn flags_mutate_in_place_and_are_idempotent() {
        let store = setup_store().await;
        store
            .add_tutorial(&sample("abc123", Some("Python"), 1))
            .await
            .unwrap();

        store.mark_watched("abc123").await;
        store.mark_watched("abc123").await;
        store.mark_favorite("abc123", true).await;

        let t = store.all_tutorials().await.remove(0);
        assert!(t.is_watched);
        assert!(t.is_favorite);

        store.mark_favorite("abc123", false).await;
        let t = store.all_tutorials().await.remove(0);
        assert!(!t.is_favorite);
        assert!(t.is_watched);
    }

    #[tokio::test]
    async fn mutations_on_missing_key_are_noops() {
        let store = setup_store().await;
        store.mark_favorite("abc123", true).await;
        store.mark_watched("abc123").await;
        store.delete_tutorial("abc123").await;
        assert!(store.all_tutorials().await.is_empty());
        assert!(!store
            .all_tutorials()
            .await
            .iter()
            .any(|t| t.video_id == "abc123"));
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = setup_store().await;
        store
            .add_tutorial(&sample("abc123", Some("Python"), 1))
            .await
            .unwrap();
        store.delete_tutorial("abc123").await;
        assert!(store.all_tutorials().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_insert_preserves_flags_and_added_at() {
        let store = setup_store().await;
        let t = sample("abc123", Some("Python"), 1);
        store.add_tutorial(&t).await.unwrap();
        store.mark_favorite("abc123", true).await;
        let before = store.all_tutorials().await.remove(0);

        assert!(!store.add_tutorial(&t).await.unwrap());
        let after = store.all_tutorials().await.remove(0);
        assert!(after.is_favorite);
        assert_eq!(after.added_at, before.added_at);
    }
}
