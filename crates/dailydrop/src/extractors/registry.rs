//! Extractor registry with an explicit, ordered resolution chain.
//!
//! Resolution priority for a source URL:
//! 1. the explicitly configured key, when registered
//! 2. the first registered extractor whose `can_handle` accepts the URL
//! 3. the default (AI-backed) extractor
//!
//! The registry is assembled once through [`ExtractorRegistryBuilder`] and is
//! immutable afterwards; share it behind an `Arc`.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::Extractor;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("extractor key '{0}' is already registered")]
    DuplicateKey(String),
}

/// Which tier of the resolution chain produced the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedBy {
    Explicit,
    AutoDetected,
    Default,
}

impl ResolvedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::AutoDetected => "auto-detected",
            Self::Default => "default",
        }
    }
}

/// A resolved extractor and how it was chosen.
#[derive(Clone)]
pub struct Resolution {
    pub extractor: Arc<dyn Extractor>,
    pub resolved_by: ResolvedBy,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("extractor", &self.extractor.key())
            .field("resolved_by", &self.resolved_by)
            .finish()
    }
}

/// Append-only builder; registration order is auto-detection order.
pub struct ExtractorRegistryBuilder {
    entries: Vec<Arc<dyn Extractor>>,
    default: Arc<dyn Extractor>,
}

impl ExtractorRegistryBuilder {
    pub fn new(default: Arc<dyn Extractor>) -> Self {
        Self {
            entries: Vec::new(),
            default,
        }
    }

    /// Register an extractor under its own key.
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) -> Result<&mut Self, RegistryError> {
        let key = extractor.key();
        let taken = key == self.default.key() || self.entries.iter().any(|e| e.key() == key);
        if taken {
            return Err(RegistryError::DuplicateKey(key.to_string()));
        }
        debug!("Registered extractor '{}'", key);
        self.entries.push(extractor);
        Ok(self)
    }

    pub fn build(self) -> ExtractorRegistry {
        ExtractorRegistry {
            entries: self.entries,
            default: self.default,
        }
    }
}

/// Immutable mapping from key to extractor.
pub struct ExtractorRegistry {
    entries: Vec<Arc<dyn Extractor>>,
    default: Arc<dyn Extractor>,
}

impl ExtractorRegistry {
    pub fn builder(default: Arc<dyn Extractor>) -> ExtractorRegistryBuilder {
        ExtractorRegistryBuilder::new(default)
    }

    /// Look up an extractor by key (the default extractor included).
    pub fn get(&self, key: &str) -> Option<Arc<dyn Extractor>> {
        if self.default.key() == key {
            return Some(self.default.clone());
        }
        self.entries.iter().find(|e| e.key() == key).cloned()
    }

    pub fn default_extractor(&self) -> Arc<dyn Extractor> {
        self.default.clone()
    }

    /// Registered keys in resolution order, default last.
    pub fn keys(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.key())
            .chain(std::iter::once(self.default.key()))
            .collect()
    }

    /// Tier 1: explicit key.
    pub fn resolve_explicit(&self, key: &str) -> Option<Resolution> {
        self.get(key).map(|extractor| Resolution {
            extractor,
            resolved_by: ResolvedBy::Explicit,
        })
    }

    /// Tier 2: first registered extractor that can handle the URL.
    pub fn resolve_auto(&self, url: &str) -> Option<Resolution> {
        self.entries
            .iter()
            .find(|e| e.can_handle(url))
            .map(|e| Resolution {
                extractor: e.clone(),
                resolved_by: ResolvedBy::AutoDetected,
            })
    }

    /// Tier 3: the default extractor.
    pub fn resolve_default(&self) -> Resolution {
        Resolution {
            extractor: self.default.clone(),
            resolved_by: ResolvedBy::Default,
        }
    }

    /// Run the full resolution chain for a source.
    pub fn resolve(&self, url: &str, explicit_key: Option<&str>) -> Resolution {
        if let Some(key) = explicit_key {
            if let Some(found) = self.resolve_explicit(key) {
                return found;
            }
            warn!(
                "Extractor '{}' configured for {} is not registered; auto-detecting",
                key, url
            );
        }
        self.resolve_auto(url)
            .unwrap_or_else(|| self.resolve_default())
    }
}
