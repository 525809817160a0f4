//! Target resolution: logical content plus target key to a concrete post id.

use thiserror::Error;

use crate::models::PostConfig;

/// Key of the home target.
pub const DEFAULT_TARGET: &str = "this";

/// Selector value meaning every configured target.
pub const ALL_TARGETS: &str = "all";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("no post id configured for target '{target}' of '{post_ref}'")]
    Unresolved { post_ref: String, target: String },
}

/// Which targets a run publishes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelector {
    All,
    One(String),
}

impl TargetSelector {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case(ALL_TARGETS) {
            Self::All
        } else if value.is_empty() {
            Self::One(DEFAULT_TARGET.to_string())
        } else {
            Self::One(value.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::All => ALL_TARGETS,
            Self::One(key) => key,
        }
    }
}

impl Default for TargetSelector {
    fn default() -> Self {
        Self::One(DEFAULT_TARGET.to_string())
    }
}

/// Concrete post id for `target`: the per-target mapping, else the legacy id.
pub fn resolve_post_id(config: &PostConfig, target: &str) -> Result<i64, TargetError> {
    config
        .site_target_post_ids
        .get(target)
        .copied()
        .or(config.post_id)
        .ok_or_else(|| TargetError::Unresolved {
            post_ref: config.storage_key(),
            target: target.to_string(),
        })
}

/// Target keys to process, each independently.
///
/// `All` yields "this" first, then every mapped key in sorted order.
pub fn target_keys(config: &PostConfig, selector: &TargetSelector) -> Vec<String> {
    match selector {
        TargetSelector::One(key) => vec![key.clone()],
        TargetSelector::All => {
            let mut keys = vec![DEFAULT_TARGET.to_string()];
            keys.extend(
                config
                    .site_target_post_ids
                    .keys()
                    .filter(|k| k.as_str() != DEFAULT_TARGET)
                    .cloned(),
            );
            keys
        }
    }
}
