use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use rollcall_roster::EmbeddingStore;
use rollcall_vecstore::{FlatIndex, normalize};

/// IndexBuilder loads a session roster into a fresh [`FlatIndex`].
pub struct IndexBuilder {
    store: Arc<dyn EmbeddingStore>,
}

impl IndexBuilder {
    pub fn new(store: Arc<dyn EmbeddingStore>) -> Self {
        Self { store }
    }

    /// Build the search index for `namespace`.
    ///
    /// Returns `None` when the session has no usable embedding: the roster
    /// is empty, unreadable, or every entry is missing or malformed.
    /// Unusable entries are skipped with a warning. Entries whose length
    /// differs from `dim` are skipped too; without a `dim`, the most common
    /// length in the roster wins, ties going to the earliest entry.
    pub fn build(&self, namespace: &str, dim: Option<usize>) -> Option<FlatIndex> {
        let items = match self.store.list_embeddings(namespace) {
            Ok(items) => items,
            Err(e) => {
                warn!(namespace, error = %e, "failed to read roster");
                return None;
            }
        };

        let total = items.len();
        let mut skipped = 0usize;
        let mut entries = Vec::with_capacity(total);

        for item in items {
            let entry = match item {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(namespace, error = %e, "skipping unreadable roster document");
                    skipped += 1;
                    continue;
                }
            };
            let Some(vector) = entry.embedding else {
                warn!(namespace, identity = %entry.id, "skipping roster entry without embedding");
                skipped += 1;
                continue;
            };
            match normalize(&vector) {
                Ok(unit) => entries.push((entry.id, unit)),
                Err(e) => {
                    warn!(namespace, identity = %entry.id, error = %e, "skipping roster entry");
                    skipped += 1;
                }
            }
        }

        let Some(dim) = dim.or_else(|| dominant_len(&entries)) else {
            warn!(namespace, total, skipped, "no usable embeddings for session");
            return None;
        };

        let mut index = FlatIndex::with_capacity(dim, entries.len());
        for (id, vector) in entries {
            if let Err(e) = index.insert(&id, &vector) {
                warn!(namespace, identity = %id, error = %e, "skipping roster entry");
                skipped += 1;
            }
        }

        if index.is_empty() {
            warn!(namespace, total, skipped, dim, "no usable embeddings for session");
            return None;
        }
        debug!(namespace, rows = index.len(), dim, skipped, "index built");
        Some(index)
    }
}

/// Most common vector length among `entries`; ties go to the earliest.
fn dominant_len(entries: &[(String, Vec<f32>)]) -> Option<usize> {
    let mut counts: Vec<(usize, usize)> = Vec::new();
    for (_, v) in entries {
        match counts.iter_mut().find(|(len, _)| *len == v.len()) {
            Some((_, n)) => *n += 1,
            None => counts.push((v.len(), 1)),
        }
    }
    let best = counts.iter().map(|(_, n)| *n).max()?;
    counts.into_iter().find(|(_, n)| *n == best).map(|(len, _)| len)
}

/// IndexCache reuses a built index for the same namespace within `ttl`.
///
/// A cached index does not see enrollments made after it was built until
/// the entry expires.
pub struct IndexCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Arc<FlatIndex>)>>,
}

impl IndexCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached index for `namespace`, or build and cache a new one.
    pub fn get_or_build(
        &self,
        namespace: &str,
        dim: Option<usize>,
        builder: &IndexBuilder,
    ) -> Option<Arc<FlatIndex>> {
        if let Some((at, idx)) = self.entries.lock().get(namespace) {
            if at.elapsed() < self.ttl {
                debug!(namespace, "index cache hit");
                return Some(Arc::clone(idx));
            }
        }

        // Built outside the lock; concurrent misses may build twice.
        let built = Arc::new(builder.build(namespace, dim)?);
        self.entries
            .lock()
            .insert(namespace.to_string(), (Instant::now(), Arc::clone(&built)));
        Some(built)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
