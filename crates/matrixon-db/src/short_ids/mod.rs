//! Numeric identifiers for users and rooms
//!
//! External string identifiers are long; the key tables store compact
//! integers instead. A NID never changes once assigned.

mod memory;
mod postgres;
mod sqlite;

use std::{
    fmt,
    num::NonZeroUsize,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use lru::LruCache;
use matrixon_core::Result;
use tracing::instrument;

pub use memory::MemoryShortIds;
pub use postgres::PostgresShortIds;
pub use sqlite::SqliteShortIds;

/// What an external identifier names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NidKind {
    User,
    Room,
}

impl NidKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NidKind::User => "user",
            NidKind::Room => "room",
        }
    }
}

impl fmt::Display for NidKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait ShortIds: Send + Sync {
    /// Return the NID for `external_id`, assigning one if needed
    async fn get_or_create_nid(&self, kind: NidKind, external_id: &str) -> Result<i64>;

    /// Return the NID for `external_id` without assigning one
    async fn get_nid(&self, kind: NidKind, external_id: &str) -> Result<Option<i64>>;

    async fn get_external_id(&self, kind: NidKind, nid: i64) -> Result<Option<String>>;
}

/// LRU caches in front of a `ShortIds` backend.
///
/// Only hits are cached; a NID that does not exist yet may be created by
/// another caller at any time.
pub struct CachedShortIds {
    inner: Arc<dyn ShortIds>,
    nid_cache: Mutex<LruCache<(NidKind, String), i64>>,
    external_id_cache: Mutex<LruCache<(NidKind, i64), String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CachedShortIds {
    pub fn new(inner: Arc<dyn ShortIds>, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            nid_cache: Mutex::new(LruCache::new(capacity)),
            external_id_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn remember(&self, kind: NidKind, external_id: &str, nid: i64) {
        lock(&self.nid_cache).put((kind, external_id.to_owned()), nid);
        lock(&self.external_id_cache).put((kind, nid), external_id.to_owned());
    }

    fn cached_nid(&self, kind: NidKind, external_id: &str) -> Option<i64> {
        lock(&self.nid_cache)
            .get(&(kind, external_id.to_owned()))
            .copied()
    }
}

#[async_trait]
impl ShortIds for CachedShortIds {
    #[instrument(level = "trace", skip(self))]
    async fn get_or_create_nid(&self, kind: NidKind, external_id: &str) -> Result<i64> {
        if let Some(nid) = self.cached_nid(kind, external_id) {
            return Ok(nid);
        }
        let nid = self.inner.get_or_create_nid(kind, external_id).await?;
        self.remember(kind, external_id, nid);
        Ok(nid)
    }

    #[instrument(level = "trace", skip(self))]
    async fn get_nid(&self, kind: NidKind, external_id: &str) -> Result<Option<i64>> {
        if let Some(nid) = self.cached_nid(kind, external_id) {
            return Ok(Some(nid));
        }
        let nid = self.inner.get_nid(kind, external_id).await?;
        if let Some(nid) = nid {
            self.remember(kind, external_id, nid);
        }
        Ok(nid)
    }

    #[instrument(level = "trace", skip(self))]
    async fn get_external_id(&self, kind: NidKind, nid: i64) -> Result<Option<String>> {
        if let Some(id) = lock(&self.external_id_cache).get(&(kind, nid)) {
            return Ok(Some(id.clone()));
        }
        let external_id = self.inner.get_external_id(kind, nid).await?;
        if let Some(id) = &external_id {
            self.remember(kind, id, nid);
        }
        Ok(external_id)
    }
}
