//! Bibliographic metadata of the papers being discussed.
//!
//! Lookups are delegated to a [`MetadataResolver`]; [`CachingResolver`] keeps
//! successful answers around for a while so a page showing a paper does not
//! hit the lookup service every time.

use std::{
  collections::HashMap,
  time::{Duration, Instant},
};

use futures_util::{future::BoxFuture, FutureExt};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

/// [`MetadataResolver`] error
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
  #[error("{0} is not a DOI")]
  InvalidDoi(String),
  #[error("no paper with DOI {0}")]
  NotFound(String),
  #[error("metadata lookup failed: {0}")]
  Lookup(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperMetadata {
  pub title: String,
  pub authors: Vec<String>,
  pub venue: Option<String>,
  /// `YYYY`, `YYYY-MM` or `YYYY-MM-DD`, as precise as the source knows.
  pub published_date: Option<String>,
}

impl PaperMetadata {
  /// Reads the `message` object of a CrossRef `/works/<doi>` response.
  ///
  /// A work without a title is unusable and is reported as a lookup
  /// failure.
  pub fn from_crossref_work(work: &Value) -> Result<Self, MetadataError> {
    let title = first_string(&work["title"])
      .ok_or_else(|| MetadataError::Lookup(String::from("missing title")))?;

    let authors = work["author"]
      .as_array()
      .map(|authors| {
        authors
          .iter()
          .filter_map(|author| {
            let name = [&author["given"], &author["family"]]
              .iter()
              .filter_map(|part| part.as_str())
              .collect::<Vec<&str>>()
              .join(" ");
            if name.is_empty() {
              author["name"].as_str().map(str::to_string)
            } else {
              Some(name)
            }
          })
          .collect()
      })
      .unwrap_or_default();

    let published_date = work["published"]["date-parts"][0]
      .as_array()
      .map(|parts| {
        parts
          .iter()
          .filter_map(Value::as_u64)
          .map(|part| format!("{part:02}"))
          .collect::<Vec<String>>()
          .join("-")
      })
      .filter(|date| !date.is_empty());

    Ok(Self {
      title,
      authors,
      venue: first_string(&work["container-title"]),
      published_date,
    })
  }
}

fn first_string(value: &Value) -> Option<String> {
  value[0]
    .as_str()
    .map(str::trim)
    .filter(|value| !value.is_empty())
    .map(str::to_string)
}

/// Basic DOI syntax check: a `10.` prefix and a `/` between prefix and
/// suffix.
pub fn is_valid_doi(doi: &str) -> bool {
  let doi = doi.trim();
  doi.starts_with("10.") && doi.contains('/')
}

pub trait MetadataResolver: Send + Sync {
  fn resolve_metadata(&self, doi: String) -> BoxFuture<'_, Result<PaperMetadata, MetadataError>>;
}

struct CacheEntry {
  metadata: PaperMetadata,
  stored_at: Instant,
}

/// Wraps a resolver with a time bounded cache of successful lookups.
///
/// Invalid DOIs are refused before reaching the inner resolver, failures
/// are never cached.
pub struct CachingResolver<R> {
  inner: R,
  ttl: Duration,
  cache: Mutex<HashMap<String, CacheEntry>>,
}

impl<R: MetadataResolver> CachingResolver<R> {
  pub fn new(inner: R, ttl: Duration) -> Self {
    Self {
      inner,
      ttl,
      cache: Mutex::new(HashMap::new()),
    }
  }

  pub async fn clear(&self) {
    self.cache.lock().await.clear();
  }

  async fn cached(&self, doi: &str) -> Option<PaperMetadata> {
    let mut cache = self.cache.lock().await;
    match cache.get(doi) {
      Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.metadata.clone()),
      Some(_) => {
        debug!("Cached metadata of {doi} expired");
        cache.remove(doi);
        None
      }
      None => None,
    }
  }
}

impl<R: MetadataResolver> MetadataResolver for CachingResolver<R> {
  fn resolve_metadata(&self, doi: String) -> BoxFuture<'_, Result<PaperMetadata, MetadataError>> {
    async move {
      let doi = doi.trim().to_string();
      if !is_valid_doi(&doi) {
        return Err(MetadataError::InvalidDoi(doi));
      }

      if let Some(metadata) = self.cached(&doi).await {
        return Ok(metadata);
      }

      let metadata = self.inner.resolve_metadata(doi.clone()).await?;
      self.cache.lock().await.insert(
        doi,
        CacheEntry {
          metadata: metadata.clone(),
          stored_at: Instant::now(),
        },
      );
      Ok(metadata)
    }
    .boxed()
  }
}
