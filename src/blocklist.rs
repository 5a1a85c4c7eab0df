use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::LoadError;

/// One blocked domain and the reason shown on the block page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    pub domain: String,
    pub reason: String,
}

impl BlockEntry {
    pub fn new(domain: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            reason: reason.into(),
        }
    }
}

/// Snapshot of the domain -> reason mapping, loaded once at startup.
///
/// Domains are matched exactly as stored. No case folding or subdomain
/// matching is done, so `Ads.example.com` and `ads.example.com` are distinct.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(transparent)]
pub struct BlockList {
    entries: HashMap<String, String>,
}

impl BlockList {
    /// Load the block list at `path`, falling back to an empty list.
    ///
    /// A missing or malformed file is logged and never fails startup.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path).await {
            Ok(list) => {
                info!(path = %path.display(), domains = list.len(), "loaded block list");
                list
            }
            Err(e) if e.is_not_found() => {
                warn!(path = %path.display(), "block list not found, using an empty list");
                Self::default()
            }
            Err(e) => {
                warn!(error = %e, "block list unusable, using an empty list");
                Self::default()
            }
        }
    }

    pub async fn try_load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| LoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&raw).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_entries(entries: impl IntoIterator<Item = BlockEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.domain, e.reason))
                .collect(),
        }
    }

    pub fn reason(&self, domain: &str) -> Option<&str> {
        self.entries.get(domain).map(String::as_str)
    }

    pub fn is_blocked(&self, domain: &str) -> bool {
        self.entries.contains_key(domain)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(d, r)| (d.as_str(), r.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
