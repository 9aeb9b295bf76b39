//! Tutorial store: durable keyed storage with category indices and mutable
//! user flags, backend-agnostic.
//!
//! Two adapters implement the contract: an embedded SQLite store and a
//! hosted partitioned document store. Callers depend only on the trait; the
//! backend is picked from configuration at startup.

use crate::config::{Backend, Storage};
use crate::model::{CategoriesSummary, Tutorial};
use anyhow::{anyhow, Result};
use async_trait::async_trait;

pub mod docstore;
pub mod sqlite;

pub use docstore::DocStore;
pub use sqlite::SqliteStore;

/// Persistence contract for tutorial records.
///
/// Read and aggregate operations recover from backend failures internally
/// (logged, empty/zero result) so presentation layers never crash on a
/// transient storage issue. `add_tutorial` keeps its `Result` because a
/// duplicate (Ok(false)) is a normal outcome that must stay distinguishable
/// from a true insertion failure (Err).
#[async_trait]
pub trait TutorialStore: Send + Sync {
    /// Insert a record unless its `video_id` is already on file. Stamps
    /// `added_at` store-side on first insertion.
    async fn add_tutorial(&self, tutorial: &Tutorial) -> Result<bool>;

    /// Records for one programming language, most viewed first.
    async fn tutorials_by_language(&self, language: &str) -> Vec<Tutorial>;

    /// Records for one subject, most viewed first.
    async fn tutorials_by_subject(&self, subject: &str) -> Vec<Tutorial>;

    /// Every record, most recently ingested first.
    async fn all_tutorials(&self) -> Vec<Tutorial>;

    /// Case-insensitive substring match over title or description, most
    /// viewed first.
    async fn search_tutorials(&self, query: &str) -> Vec<Tutorial>;

    async fn categories_summary(&self) -> CategoriesSummary;

    /// Idempotent flag mutations; a missing key is logged and ignored.
    async fn mark_watched(&self, video_id: &str);
    async fn mark_favorite(&self, video_id: &str, value: bool);

    async fn delete_tutorial(&self, video_id: &str);
}

/// Open the configured backend.
pub async fn connect(storage: &Storage) -> Result<Box<dyn TutorialStore>> {
    match storage.backend {
        Backend::Sqlite => {
            let store = SqliteStore::connect(&storage.sqlite.database_url).await?;
            Ok(Box::new(store))
        }
        Backend::Docstore => {
            let cfg = storage
                .docstore
                .as_ref()
                .ok_or_else(|| anyhow!("storage.docstore section is missing"))?;
            let store = DocStore::new(cfg)?;
            store.ensure_provisioned().await?;
            Ok(Box::new(store))
        }
    }
}
