//! JSON-file record store for fetched articles.
//!
//! The whole store is one JSON document loaded by [`ArticleStore::open`] and
//! written back by [`ArticleStore::save`] / [`ArticleStore::close`]. Writes go
//! to a sibling temp file that is then renamed over the original, so a crash
//! mid-write leaves the previous state intact.
//!
//! Links are unique: inserting a second article with the same link fails.

use crate::models::{AnalysisResult, StoreStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store file is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("an article with link {0} already exists")]
    DuplicateLink(String),

    #[error("no article with id {0}")]
    NotFound(u64),
}

/// One persisted article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArticle {
    pub id: u64,
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub content: Option<String>,
    pub source: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub analysis: Option<AnalysisResult>,
    #[serde(default)]
    pub pushed: bool,
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
}

/// Fields supplied when inserting an article.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub link: String,
    pub content: Option<String>,
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ArticleUpdate {
    pub analysis: Option<AnalysisResult>,
    /// Marking as pushed also stamps `pushed_at` with the current time.
    pub pushed: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    next_id: u64,
    articles: Vec<StoredArticle>,
}

#[derive(Debug)]
pub struct ArticleStore {
    path: PathBuf,
    data: StoreFile,
    dirty: bool,
}

impl ArticleStore {
    /// Load the store at `path`, starting empty if the file does not exist.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let data = match fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => StoreFile::default(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No store file yet, starting empty");
                StoreFile::default()
            }
            Err(e) => return Err(e.into()),
        };
        info!(articles = data.articles.len(), "Opened article store");
        Ok(Self {
            path,
            data,
            dirty: false,
        })
    }

    /// Persist pending changes, if any.
    pub async fn save(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(&self.data)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        self.dirty = false;
        debug!(path = %self.path.display(), articles = self.data.articles.len(), "Saved article store");
        Ok(())
    }

    /// Persist and release the store.
    pub async fn close(mut self) -> Result<(), StoreError> {
        self.save().await
    }

    pub fn get(&self, id: u64) -> Option<&StoredArticle> {
        self.data.articles.iter().find(|a| a.id == id)
    }

    pub fn get_by_link(&self, link: &str) -> Option<&StoredArticle> {
        self.data.articles.iter().find(|a| a.link == link)
    }

    /// Insert a new article and return its id.
    pub fn insert(&mut self, article: NewArticle) -> Result<u64, StoreError> {
        if self.get_by_link(&article.link).is_some() {
            return Err(StoreError::DuplicateLink(article.link));
        }
        self.data.next_id += 1;
        let id = self.data.next_id;
        self.data.articles.push(StoredArticle {
            id,
            title: article.title,
            link: article.link,
            content: article.content,
            source: article.source,
            published_at: article.published_at,
            fetched_at: Utc::now(),
            analysis: None,
            pushed: false,
            pushed_at: None,
        });
        self.dirty = true;
        Ok(id)
    }

    pub fn update(&mut self, id: u64, update: ArticleUpdate) -> Result<(), StoreError> {
        let article = self
            .data
            .articles
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound(id))?;

        if let Some(analysis) = update.analysis {
            article.analysis = Some(analysis);
        }
        if let Some(pushed) = update.pushed {
            article.pushed = pushed;
            article.pushed_at = pushed.then(Utc::now);
        }
        self.dirty = true;
        Ok(())
    }

    /// Up to `limit` articles without an analysis, newest publication first.
    ///
    /// Articles without a publication date come last; ties go to the most
    /// recently inserted.
    pub fn pending_analysis(&self, limit: usize) -> Vec<StoredArticle> {
        let mut pending: Vec<&StoredArticle> = self
            .data
            .articles
            .iter()
            .filter(|a| a.analysis.is_none())
            .collect();
        pending.sort_by_key(|a| (Reverse(a.published_at), Reverse(a.id)));
        pending.into_iter().take(limit).cloned().collect()
    }

    pub fn stats(&self) -> StoreStats {
        let total = self.data.articles.len();
        let analyzed = self.data.articles.iter().filter(|a| a.analysis.is_some()).count();
        StoreStats {
            total,
            analyzed,
            unanalyzed: total - analyzed,
            pushed: self.data.articles.iter().filter(|a| a.pushed).count(),
        }
    }
}
