//! Cache key types for jobs API queries.

use sha2::{Digest, Sha256};

use crate::cache::CacheKey;

/// Cache keys for the job feed, one entry per cursor position.
#[derive(Clone, Debug)]
pub enum FeedKey {
  Page {
    cursor: Option<String>,
    page_size: u32,
  },
}

impl FeedKey {
  pub fn page(cursor: Option<&str>, page_size: u32) -> Self {
    Self::Page {
      cursor: cursor.map(String::from),
      page_size,
    }
  }
}

impl CacheKey for FeedKey {
  fn domain(&self) -> &'static str {
    "feed"
  }

  fn cache_hash(&self) -> String {
    let input = match self {
      Self::Page { cursor, page_size } => {
        format!("page:{}:{}", cursor.as_deref().unwrap_or(""), page_size)
      }
    };

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  fn description(&self) -> String {
    match self {
      Self::Page { cursor: None, .. } => "feed front page".to_string(),
      Self::Page {
        cursor: Some(cursor),
        ..
      } => format!("feed page at {}", cursor),
    }
  }
}
