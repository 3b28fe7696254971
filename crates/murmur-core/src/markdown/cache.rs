//! Highlight Cache
//!
//! Caches syntax-highlighted code markup so unchanged code blocks are never
//! highlighted twice. Bounded to a maximum number of entries with
//! oldest-first eviction.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::config::ColorTheme;

/// Cache key: (content_hash, theme)
type CacheKey = (u64, ColorTheme);

/// Maximum number of cached code blocks
const MAX_CACHE_ENTRIES: usize = 500;

/// Highlighted markup keyed by language, code and theme
pub struct HighlightCache {
    cache: HashMap<CacheKey, Arc<String>>,
    /// Insertion order (oldest at front)
    cache_order: VecDeque<CacheKey>,
    hits: u64,
    misses: u64,
}

impl Default for HighlightCache {
    fn default() -> Self {
        Self::new()
    }
}

impl HighlightCache {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
            cache_order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Hash of a code block's language and content
    pub fn content_hash(language: Option<&str>, code: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        language.hash(&mut hasher);
        code.hash(&mut hasher);
        hasher.finish()
    }

    fn evict_cache_if_full(&mut self) {
        while self.cache.len() >= MAX_CACHE_ENTRIES {
            if let Some(oldest) = self.cache_order.pop_front() {
                self.cache.remove(&oldest);
            } else {
                break;
            }
        }
    }

    /// Get cached markup, or render and cache it. Render failures are not
    /// cached.
    pub fn get_or_render<E>(
        &mut self,
        content_hash: u64,
        theme: ColorTheme,
        render: impl FnOnce() -> Result<String, E>,
    ) -> Result<Arc<String>, E> {
        let key = (content_hash, theme);
        if let Some(cached) = self.cache.get(&key) {
            self.hits += 1;
            return Ok(Arc::clone(cached));
        }

        self.misses += 1;
        let rendered = Arc::new(render()?);
        self.evict_cache_if_full();
        self.cache.insert(key, Arc::clone(&rendered));
        self.cache_order.push_back(key);
        Ok(rendered)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
