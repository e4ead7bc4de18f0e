//! Shared read-only anchor grids keyed by image shape and config.

use crate::anchors::{AnchorConfig, AnchorGrid};
use crate::geometry::ImageShape;
use crate::trace::trace_event;
use crate::util::{AnchorMatchError, AnchorMatchResult};
use std::sync::{Arc, PoisonError, RwLock};

/// Cache of generated grids.
///
/// Grids are handed out as `Arc<AnchorGrid>` and never mutated, so any number
/// of threads may read one while others generate different configurations.
/// A detector that changes its config simply requests the new key; stale
/// entries can be dropped with [`AnchorCache::invalidate`].
#[derive(Debug, Default)]
pub struct AnchorCache {
    entries: RwLock<Vec<Arc<AnchorGrid>>>,
}

impl AnchorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a previously generated grid.
    ///
    /// Fails with [`AnchorMatchError::ConfigurationMismatch`] if this shape and
    /// config were never generated through the cache.
    pub fn get(&self, shape: ImageShape, config: &AnchorConfig) -> AnchorMatchResult<Arc<AnchorGrid>> {
        self.lookup(shape, config)
            .ok_or(AnchorMatchError::ConfigurationMismatch {
                reason: "no anchor grid generated for this shape and config",
            })
    }

    /// Returns the cached grid, generating and storing it on first use.
    pub fn get_or_generate(
        &self,
        shape: ImageShape,
        config: &AnchorConfig,
    ) -> AnchorMatchResult<Arc<AnchorGrid>> {
        if let Some(grid) = self.lookup(shape, config) {
            return Ok(grid);
        }

        let grid = Arc::new(AnchorGrid::generate(shape, config)?);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have inserted the same key while we generated.
        if let Some(existing) = entries.iter().find(|g| same_key(g, shape, config)) {
            return Ok(Arc::clone(existing));
        }
        entries.push(Arc::clone(&grid));
        trace_event!("anchor_cache_insert", entries = entries.len());
        Ok(grid)
    }

    /// Drops the grid for this key. Returns whether an entry was removed.
    pub fn invalidate(&self, shape: ImageShape, config: &AnchorConfig) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|g| !same_key(g, shape, config));
        entries.len() != before
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, shape: ImageShape, config: &AnchorConfig) -> Option<Arc<AnchorGrid>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|g| same_key(g, shape, config))
            .cloned()
    }
}

fn same_key(grid: &AnchorGrid, shape: ImageShape, config: &AnchorConfig) -> bool {
    grid.image_shape() == shape && grid.config() == config
}

#[cfg(test)]
mod tests {
    use super::AnchorCache;
    use crate::anchors::AnchorConfig;
    use crate::geometry::ImageShape;
    use std::sync::Arc;

    #[test]
    fn get_before_generate_is_a_configuration_mismatch() {
        let cache = AnchorCache::new();
        let shape = ImageShape::new(64, 64).unwrap();
        assert!(cache.get(shape, &AnchorConfig::default()).is_err());
    }

    #[test]
    fn repeated_requests_share_one_grid() {
        let cache = AnchorCache::new();
        let shape = ImageShape::new(64, 64).unwrap();
        let cfg = AnchorConfig::default();
        let a = cache.get_or_generate(shape, &cfg).unwrap();
        let b = cache.get_or_generate(shape, &cfg).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &cache.get(shape, &cfg).unwrap()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn changed_config_gets_its_own_entry_and_can_be_invalidated() {
        let cache = AnchorCache::new();
        let shape = ImageShape::new(64, 64).unwrap();
        let cfg = AnchorConfig::default();
        let other = AnchorConfig {
            scales: vec![2.0, 4.0],
            ..AnchorConfig::default()
        };
        cache.get_or_generate(shape, &cfg).unwrap();
        cache.get_or_generate(shape, &other).unwrap();
        assert_eq!(cache.len(), 2);

        assert!(cache.invalidate(shape, &cfg));
        assert!(!cache.invalidate(shape, &cfg));
        assert!(cache.get(shape, &cfg).is_err());
        assert!(cache.get(shape, &other).is_ok());

        cache.clear();
        assert!(cache.is_empty());
    }
}
