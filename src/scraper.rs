//! Acquisition pipeline: category-driven search, detail enrichment,
//! content-quality filtering and cross-query deduplication.

use crate::config::App;
use crate::model::{Tutorial, UploadDateFilter};
use crate::youtube::{SearchRequest, VideoApi, VideoDetails, MAX_IDS_PER_DETAIL_REQUEST};
use anyhow::Result;
use chrono::Utc;
use regex::{Regex, RegexBuilder};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

const DESCRIPTION_MAX_CHARS: usize = 500;

/// Synchronous progress hook: `(current, total, message)`, invoked once per
/// query dispatch on the caller's thread of control.
pub type ProgressFn<'a> = dyn FnMut(usize, usize, &str) + 'a;

/// Word-boundary, case-insensitive matcher over regional-language indicator
/// patterns. A content-locale heuristic, not a verified geographic filter.
pub struct LocaleFilter {
    pattern: Option<Regex>,
}

impl LocaleFilter {
    pub fn new(patterns: &[String]) -> Result<Self, regex::Error> {
        if patterns.is_empty() {
            return Ok(Self { pattern: None });
        }
        let joined = patterns.join("|");
        let pattern = RegexBuilder::new(&joined).case_insensitive(true).build()?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.as_ref().is_some_and(|p| p.is_match(text))
    }
}

pub struct TutorialScraper {
    api: Arc<dyn VideoApi>,
    min_duration_seconds: i64,
    max_results_per_query: u32,
    upload_date_filter: UploadDateFilter,
    locale_filter: LocaleFilter,
}

impl TutorialScraper {
    /// Build a scraper over a caller-owned API client. Fails only if a
    /// configured exclusion pattern does not compile.
    pub fn new(api: Arc<dyn VideoApi>, app: &App) -> Result<Self> {
        let locale_filter = LocaleFilter::new(&app.excluded_patterns)?;
        Ok(Self {
            api,
            min_duration_seconds: app.min_duration_seconds,
            max_results_per_query: app.max_results_per_query,
            upload_date_filter: app.upload_date_filter,
            locale_filter,
        })
    }

    pub fn default_max_results(&self) -> u32 {
        self.max_results_per_query
    }

    /// Run one category-scoped query and return the filtered candidates.
    ///
    /// A request-level API failure degrades to an empty list so a single
    /// failed query never aborts a multi-query sweep.
    pub async fn search_tutorials(
        &self,
        language: Option<&str>,
        subject: Option<&str>,
        max_results: u32,
    ) -> Vec<Tutorial> {
        let request = SearchRequest {
            query: build_query(language, subject),
            max_results,
            published_after: self.upload_date_filter.published_after(Utc::now()),
        };

        let hits = match self.api.search_videos(&request).await {
            Ok(hits) => hits,
            Err(err) => {
                warn!(?err, query = %request.query, "search query failed");
                return Vec::new();
            }
        };

        let ids: Vec<String> = hits.iter().map(|h| h.video_id.clone()).collect();
        let details = self.fetch_details(&ids).await;

        let mut tutorials = Vec::new();
        for hit in hits {
            let detail = details.get(&hit.video_id);
            let duration = detail.map(|d| d.duration_seconds).unwrap_or(0);
            if duration < self.min_duration_seconds {
                continue;
            }

            let combined = format!("{} {} {}", hit.title, hit.description, hit.channel_name);
            if self.locale_filter.matches(&combined) {
                debug!(video_id = %hit.video_id, "excluded by locale filter");
                continue;
            }

            tutorials.push(Tutorial {
                video_url: format!("https://www.youtube.com/watch?v={}", hit.video_id),
                video_id: hit.video_id,
                title: hit.title,
                description: truncate_chars(&hit.description, DESCRIPTION_MAX_CHARS),
                channel_name: hit.channel_name,
                channel_id: hit.channel_id,
                published_at: hit.published_at,
                duration_seconds: duration,
                view_count: detail.map(|d| d.view_count).unwrap_or(0),
                like_count: detail.map(|d| d.like_count).unwrap_or(0),
                thumbnail_url: hit.thumbnail_url,
                programming_language: language.map(str::to_string),
                subject: subject.map(str::to_string),
                country_code: detail.and_then(|d| d.country_code.clone()),
                added_at: None,
                is_favorite: false,
                is_watched: false,
            });
        }
        tutorials
    }

    /// Detail lookups are capped per request, so chunk the id list. A failed
    /// chunk leaves its ids without details instead of failing the query.
    async fn fetch_details(&self, ids: &[String]) -> HashMap<String, VideoDetails> {
        let mut details = HashMap::new();
        for chunk in ids.chunks(MAX_IDS_PER_DETAIL_REQUEST) {
            match self.api.list_videos(chunk).await {
                Ok(batch) => {
                    for detail in batch {
                        details.insert(detail.video_id.clone(), detail);
                    }
                }
                Err(err) => {
                    warn!(?err, ids = chunk.len(), "video detail lookup failed");
                }
            }
        }
        details
    }

    /// Full sweep: one language-scoped query per configured language, then
    /// one subject-scoped query per configured subject, deduplicated by
    /// video id keeping first-occurrence order.
    pub async fn scrape_all_categories(
        &self,
        languages: &[String],
        subjects: &[String],
        mut progress: Option<&mut ProgressFn<'_>>,
    ) -> Vec<Tutorial> {
        let total = languages.len() + subjects.len();
        let mut current = 0;
        let mut all = Vec::new();

        for language in languages {
            current += 1;
            if let Some(cb) = progress.as_deref_mut() {
                cb(
                    current,
                    total,
                    &format!("Searching {language} tutorials..."),
                );
            }
            all.extend(
                self.search_tutorials(Some(language), None, self.max_results_per_query)
                    .await,
            );
        }

        for subject in subjects {
            current += 1;
            if let Some(cb) = progress.as_deref_mut() {
                cb(current, total, &format!("Searching {subject} tutorials..."));
            }
            all.extend(
                self.search_tutorials(None, Some(subject), self.max_results_per_query)
                    .await,
            );
        }

        dedupe_by_video_id(all)
    }
}

fn build_query(language: Option<&str>, subject: Option<&str>) -> String {
    let mut parts = Vec::new();
    if let Some(language) = language {
        parts.push(format!("{language} programming"));
    }
    if let Some(subject) = subject {
        parts.push(subject.to_string());
    }
    parts.push("tutorial".to_string());
    parts.join(" ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn dedupe_by_video_id(tutorials: Vec<Tutorial>) -> Vec<Tutorial> {
    let mut seen = HashSet::new();
    tutorials
        .into_iter()
        .filter(|t| seen.insert(t.video_id.clone()))
        .collect()
}
