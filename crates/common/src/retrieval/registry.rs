//! Name-keyed set of collection indexes

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{AppError, Result};
use crate::models::CollectionDescriptor;
use crate::retrieval::CollectionIndex;

/// Registered collections, kept in registration order.
///
/// Populated once at startup, then shared read-only across queries.
#[derive(Debug, Default)]
pub struct CollectionRegistry {
    entries: Vec<(CollectionDescriptor, Arc<CollectionIndex>)>,
    by_name: HashMap<String, usize>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collection. Names are unique; a repeated name is rejected.
    pub fn register(&mut self, descriptor: CollectionDescriptor, index: CollectionIndex) -> Result<()> {
        if self.by_name.contains_key(&descriptor.name) {
            return Err(AppError::DuplicateCollection {
                name: descriptor.name,
            });
        }

        tracing::debug!(collection = %descriptor.name, chunks = index.len(), "Collection registered");
        self.by_name.insert(descriptor.name.clone(), self.entries.len());
        self.entries.push((descriptor, Arc::new(index)));
        Ok(())
    }

    /// Look up the index registered under `name`
    pub fn resolve(&self, name: &str) -> Result<Arc<CollectionIndex>> {
        self.by_name
            .get(name)
            .map(|&slot| self.entries[slot].1.clone())
            .ok_or_else(|| AppError::UnknownCollection {
                name: name.to_string(),
            })
    }

    /// Descriptors of every registered collection, in registration order
    pub fn list_descriptors(&self) -> Vec<CollectionDescriptor> {
        self.entries.iter().map(|(d, _)| d.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbedder;
    use crate::retrieval::IndexBuildOptions;

    async fn empty_index(name: &str) -> CollectionIndex {
        CollectionIndex::build(name, Vec::new(), Arc::new(MockEmbedder::new(8)), &IndexBuildOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let mut registry = CollectionRegistry::new();
        registry
            .register(CollectionDescriptor::new("fy2022", "2022 report"), empty_index("fy2022").await)
            .unwrap();
        registry
            .register(CollectionDescriptor::new("fy2021", "2021 report"), empty_index("fy2021").await)
            .unwrap();

        let first = registry.resolve("fy2021").unwrap();
        let second = registry.resolve("fy2021").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "fy2021");

        // Registration order, not alphabetical
        let names: Vec<String> = registry.list_descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["fy2022", "fy2021"]);
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let mut registry = CollectionRegistry::new();
        registry
            .register(CollectionDescriptor::new("fy2021", "first"), empty_index("fy2021").await)
            .unwrap();
        let result = registry.register(CollectionDescriptor::new("fy2021", "second"), empty_index("fy2021").await);

        assert!(matches!(result, Err(AppError::DuplicateCollection { name }) if name == "fy2021"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list_descriptors()[0].description, "first");
    }

    #[test]
    fn test_unknown_collection() {
        let registry = CollectionRegistry::new();
        assert!(registry.is_empty());
        let err = tokio_test::assert_err!(registry.resolve("fy2030"));
        assert!(matches!(err, AppError::UnknownCollection { .. }));
    }
}
