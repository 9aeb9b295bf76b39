//! Hosted partitioned document-store adapter.
//!
//! Speaks a Cosmos-style REST dialect: JSON documents under
//! `dbs/{database}/colls/{container}/docs`, SQL-over-JSON queries, and a
//! partition key on `/programming_language`. Point operations need the
//! partition key, which is not derivable from a video id alone, so the
//! adapter first resolves it with a cross-partition lookup. That extra
//! round-trip stays entirely inside this module.

use super::TutorialStore;
use crate::config::DocStore as DocStoreConfig;
use crate::model::{CategoriesSummary, Tutorial};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use tracing::{instrument, warn};

const API_VERSION: &str = "2018-12-31";
const PARTITION_KEY_PATH: &str = "/programming_language";

pub struct DocStore {
    http: Client,
    base_url: Url,
    key: String,
    database: String,
    container: String,
}

impl fmt::Debug for DocStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocStore")
            .field("base_url", &self.base_url)
            .field("database", &self.database)
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

impl DocStore {
    pub fn new(cfg: &DocStoreConfig) -> Result<Self> {
        if cfg.key.trim().is_empty() {
            bail!(
                "Document store credentials are not configured. Set storage.docstore.key \
                 in config.yaml or the DOCSTORE_KEY environment variable."
            );
        }
        let base_url = Url::parse(&cfg.endpoint).context("invalid storage.docstore.endpoint")?;
        let http = Client::builder()
            .user_agent("tutor-scout/0.1")
            .build()
            .expect("reqwest client");
        Ok(Self {
            http,
            base_url,
            key: cfg.key.clone(),
            database: cfg.database.clone(),
            container: cfg.container.clone(),
        })
    }

    fn docs_url(&self) -> Result<Url> {
        self.base_url
            .join(&format!("dbs/{}/colls/{}/docs", self.database, self.container))
            .context("invalid document store URL")
    }

    fn doc_url(&self, video_id: &str) -> Result<Url> {
        self.base_url
            .join(&format!(
                "dbs/{}/colls/{}/docs/{}",
                self.database, self.container, video_id
            ))
            .context("invalid document store URL")
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("Authorization", &self.key)
            .header("x-ms-version", API_VERSION)
            .header(
                "x-ms-date",
                Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            )
    }

    /// Create the database and container on first use; both calls treat an
    /// already-exists conflict as success.
    pub async fn ensure_provisioned(&self) -> Result<()> {
        let dbs_url = self
            .base_url
            .join("dbs")
            .context("invalid document store URL")?;
        let res = self
            .request(Method::POST, dbs_url)
            .json(&json!({ "id": self.database }))
            .send()
            .await
            .context("failed to reach document store")?;
        if !res.status().is_success() && res.status() != StatusCode::CONFLICT {
            bail!("failed to create database: {}", res.status());
        }

        let colls_url = self
            .base_url
            .join(&format!("dbs/{}/colls", self.database))
            .context("invalid document store URL")?;
        let res = self
            .request(Method::POST, colls_url)
            .json(&json!({
                "id": self.container,
                "partitionKey": { "paths": [PARTITION_KEY_PATH], "kind": "Hash" }
            }))
            .send()
            .await
            .context("failed to reach document store")?;
        if !res.status().is_success() && res.status() != StatusCode::CONFLICT {
            bail!("failed to create container: {}", res.status());
        }
        Ok(())
    }

    pub fn build_create_request(
        &self,
        doc: &Value,
        partition: Option<&str>,
    ) -> Result<reqwest::Request> {
        self.request(Method::POST, self.docs_url()?)
            .header("x-ms-documentdb-partitionkey", partition_key_header(partition))
            .json(doc)
            .build()
            .context("failed to build create request")
    }

    /// `partition` is `Some(pk)` for a single-partition query (where `pk`
    /// itself may be the null partition) and `None` for cross-partition.
    pub fn build_query_request(
        &self,
        body: &Value,
        partition: Option<Option<&str>>,
    ) -> Result<reqwest::Request> {
        let mut builder = self
            .request(Method::POST, self.docs_url()?)
            .header("Content-Type", "application/query+json")
            .header("x-ms-documentdb-isquery", "True");
        builder = match partition {
            Some(pk) => builder.header("x-ms-documentdb-partitionkey", partition_key_header(pk)),
            None => builder.header("x-ms-documentdb-query-enablecrosspartition", "True"),
        };
        builder
            .body(body.to_string())
            .build()
            .context("failed to build query request")
    }

    async fn query_documents(
        &self,
        body: &Value,
        partition: Option<Option<&str>>,
    ) -> Result<Vec<Value>> {
        let request = self.build_query_request(body, partition)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach document store")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("document store error {}: {}", status, body));
        }
        let payload: QueryResponse = res.json().await.context("invalid query response")?;
        Ok(payload.documents)
    }

    /// Resolve the partition key for a point operation. Outer `None` means
    /// the document does not exist; the inner value is the partition key,
    /// which is null for records not scoped to a language.
    async fn resolve_partition_key(&self, video_id: &str) -> Result<Option<Option<String>>> {
        let body = query_body(
            "SELECT c.programming_language FROM c WHERE c.id = @id",
            &[("@id", video_id)],
        );
        let docs = self.query_documents(&body, None).await?;
        let Some(doc) = docs.first() else {
            return Ok(None);
        };
        Ok(Some(
            doc.get("programming_language")
                .and_then(Value::as_str)
                .map(str::to_string),
        ))
    }

    async fn read_document(
        &self,
        video_id: &str,
        partition: Option<&str>,
    ) -> Result<Option<Value>> {
        let res = self
            .request(Method::GET, self.doc_url(video_id)?)
            .header("x-ms-documentdb-partitionkey", partition_key_header(partition))
            .send()
            .await
            .context("failed to reach document store")?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !res.status().is_success() {
            bail!("document store error {}", res.status());
        }
        Ok(Some(res.json().await.context("invalid document")?))
    }

    async fn replace_document(
        &self,
        video_id: &str,
        partition: Option<&str>,
        doc: &Value,
    ) -> Result<()> {
        let res = self
            .request(Method::PUT, self.doc_url(video_id)?)
            .header("x-ms-documentdb-partitionkey", partition_key_header(partition))
            .json(doc)
            .send()
            .await
            .context("failed to reach document store")?;
        if !res.status().is_success() {
            bail!("document store error {}", res.status());
        }
        Ok(())
    }

    async fn set_flag(&self, video_id: &str, flag: &str, value: bool) {
        let partition = match self.resolve_partition_key(video_id).await {
            Ok(Some(partition)) => partition,
            Ok(None) => {
                warn!(video_id, "tutorial not found");
                return;
            }
            Err(err) => {
                warn!(?err, video_id, "failed to resolve partition key");
                return;
            }
        };
        let result = async {
            let Some(mut doc) = self.read_document(video_id, partition.as_deref()).await? else {
                warn!(video_id, "tutorial not found");
                return Ok(());
            };
            doc[flag] = json!(value);
            self.replace_document(video_id, partition.as_deref(), &doc)
                .await
        }
        .await;
        if let Err(err) = result {
            warn!(?err, video_id, flag, "failed to update flag");
        }
    }

    fn collect_counts(docs: Vec<Value>, field: &str) -> std::collections::BTreeMap<String, i64> {
        docs.iter()
            .filter_map(|doc| {
                let category = doc.get(field)?.as_str()?.to_string();
                let count = doc.get("n")?.as_i64()?;
                Some((category, count))
            })
            .collect()
    }
}

/// The partition-key request header: a one-element JSON array, `[null]` for
/// records outside any language partition.
pub fn partition_key_header(value: Option<&str>) -> String {
    json!([value]).to_string()
}

pub fn query_body(query: &str, parameters: &[(&str, &str)]) -> Value {
    json!({
        "query": query,
        "parameters": parameters
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect::<Vec<_>>(),
    })
}

/// Serialize a record as a document, using the video id as the document id
/// and stamping the ingestion time.
pub fn document_from(tutorial: &Tutorial, added_at: DateTime<Utc>) -> Value {
    let mut doc = serde_json::to_value(tutorial).expect("tutorial serializes");
    doc["id"] = json!(tutorial.video_id);
    doc["added_at"] = json!(added_at);
    doc
}

fn parse_tutorials(docs: Vec<Value>) -> Vec<Tutorial> {
    docs.into_iter()
        .filter_map(|doc| match serde_json::from_value::<Tutorial>(doc) {
            Ok(tutorial) => Some(tutorial),
            Err(err) => {
                warn!(?err, "skipping malformed document");
                None
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(rename = "Documents", default)]
    documents: Vec<Value>,
}

#[async_trait]
impl TutorialStore for DocStore {
    #[instrument(skip_all, fields(video_id = %tutorial.video_id))]
    async fn add_tutorial(&self, tutorial: &Tutorial) -> Result<bool> {
        let doc = document_from(tutorial, Utc::now());
        let request =
            self.build_create_request(&doc, tutorial.programming_language.as_deref())?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach document store")?;
        if res.status() == StatusCode::CONFLICT {
            return Ok(false);
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("document store error {}: {}", status, body));
        }
        Ok(true)
    }

    #[instrument(skip_all)]
    async fn tutorials_by_language(&self, language: &str) -> Vec<Tutorial> {
        let body = query_body(
            "SELECT * FROM c WHERE c.programming_language = @language \
             ORDER BY c.view_count DESC",
            &[("@language", language)],
        );
        // The language is the partition key, so this stays single-partition.
        match self.query_documents(&body, Some(Some(language))).await {
            Ok(docs) => parse_tutorials(docs),
            Err(err) => {
                warn!(?err, language, "by-language query failed");
                Vec::new()
            }
        }
    }

    #[instrument(skip_all)]
    async fn tutorials_by_subject(&self, subject: &str) -> Vec<Tutorial> {
        let body = query_body(
            "SELECT * FROM c WHERE c.subject = @subject ORDER BY c.view_count DESC",
            &[("@subject", subject)],
        );
        match self.query_documents(&body, None).await {
            Ok(docs) => parse_tutorials(docs),
            Err(err) => {
                warn!(?err, subject, "by-subject query failed");
                Vec::new()
            }
        }
    }

    #[instrument(skip_all)]
    async fn all_tutorials(&self) -> Vec<Tutorial> {
        let body = query_body("SELECT * FROM c ORDER BY c.added_at DESC", &[]);
        match self.query_documents(&body, None).await {
            Ok(docs) => parse_tutorials(docs),
            Err(err) => {
                warn!(?err, "all-tutorials query failed");
                Vec::new()
            }
        }
    }

    #[instrument(skip_all)]
    async fn search_tutorials(&self, query: &str) -> Vec<Tutorial> {
        let body = query_body(
            "SELECT * FROM c WHERE CONTAINS(LOWER(c.title), LOWER(@query)) \
             OR CONTAINS(LOWER(c.description), LOWER(@query)) \
             ORDER BY c.view_count DESC",
            &[("@query", query)],
        );
        match self.query_documents(&body, None).await {
            Ok(docs) => parse_tutorials(docs),
            Err(err) => {
                warn!(?err, "search query failed");
                Vec::new()
            }
        }
    }

    #[instrument(skip_all)]
    async fn categories_summary(&self) -> CategoriesSummary {
        let result = async {
            let total_docs = self
                .query_documents(&query_body("SELECT VALUE COUNT(1) FROM c", &[]), None)
                .await?;
            let total = total_docs.first().and_then(Value::as_i64).unwrap_or(0);

            let languages = self
                .query_documents(
                    &query_body(
                        "SELECT c.programming_language, COUNT(1) AS n FROM c \
                         WHERE IS_DEFINED(c.programming_language) \
                         AND NOT IS_NULL(c.programming_language) \
                         GROUP BY c.programming_language",
                        &[],
                    ),
                    None,
                )
                .await?;
            let subjects = self
                .query_documents(
                    &query_body(
                        "SELECT c.subject, COUNT(1) AS n FROM c \
                         WHERE IS_DEFINED(c.subject) AND NOT IS_NULL(c.subject) \
                         GROUP BY c.subject",
                        &[],
                    ),
                    None,
                )
                .await?;

            Ok::<_, anyhow::Error>(CategoriesSummary {
                total,
                by_language: Self::collect_counts(languages, "programming_language"),
                by_subject: Self::collect_counts(subjects, "subject"),
            })
        }
        .await;

        match result {
            Ok(summary) => summary,
            Err(err) => {
                warn!(?err, "categories summary failed");
                CategoriesSummary::default()
            }
        }
    }

    #[instrument(skip_all)]
    async fn mark_watched(&self, video_id: &str) {
        self.set_flag(video_id, "is_watched", true).await;
    }

    #[instrument(skip_all)]
    async fn mark_favorite(&self, video_id: &str, value: bool) {
        self.set_flag(video_id, "is_favorite", value).await;
    }

    #[instrument(skip_all)]
    async fn delete_tutorial(&self, video_id: &str) {
        let partition = match self.resolve_partition_key(video_id).await {
            Ok(Some(partition)) => partition,
            Ok(None) => {
                warn!(video_id, "tutorial not found");
                return;
            }
            Err(err) => {
                warn!(?err, video_id, "failed to resolve partition key");
                return;
            }
        };
        let result = async {
            let url = self.doc_url(video_id)?;
            let res = self
                .request(Method::DELETE, url)
                .header(
                    "x-ms-documentdb-partitionkey",
                    partition_key_header(partition.as_deref()),
                )
                .send()
                .await
                .context("failed to reach document store")?;
            if res.status() == StatusCode::NOT_FOUND {
                warn!(video_id, "tutorial not found");
                return Ok(());
            }
            if !res.status().is_success() {
                bail!("document store error {}", res.status());
            }
            Ok(())
        }
        .await;
        if let Err(err) = result {
            warn!(?err, video_id, "failed to delete tutorial");
        }
    }
}
