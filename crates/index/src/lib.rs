//! Vector index backends for NewsDesk.
//!
//! All backends implement the `newsdesk_core::VectorIndex` trait.

pub mod atlas;
pub mod in_memory;
pub mod vector;

use std::sync::Arc;

use newsdesk_config::{IndexBackend, IndexConfig};
use newsdesk_core::{IndexError, VectorIndex};

pub use atlas::{AtlasSettings, AtlasVectorIndex};
pub use in_memory::{InMemoryIndex, IndexedArticle};
pub use vector::{cosine_similarity, rank_by_similarity, threshold_and_rank};

/// Build the configured index backend.
///
/// The memory backend starts empty when no `articles_file` is set.
pub fn build_from_config(config: &IndexConfig) -> Result<Arc<dyn VectorIndex>, IndexError> {
    match config.backend {
        IndexBackend::Memory => {
            let index = match &config.articles_file {
                Some(path) => InMemoryIndex::load_from_file(path)?,
                None => {
                    tracing::warn!("index.articles_file not set, memory index starts empty");
                    InMemoryIndex::new()
                }
            };
            Ok(Arc::new(index))
        }
        IndexBackend::Atlas => {
            let settings = AtlasSettings::from_config(config)?;
            Ok(Arc::new(AtlasVectorIndex::new(settings)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_memory_index() {
        let index = build_from_config(&IndexConfig::default()).unwrap();
        assert_eq!(index.name(), "memory");
    }

    #[test]
    fn atlas_without_endpoint_fails() {
        let config = IndexConfig {
            backend: IndexBackend::Atlas,
            ..IndexConfig::default()
        };
        assert!(build_from_config(&config).is_err());
    }
}
