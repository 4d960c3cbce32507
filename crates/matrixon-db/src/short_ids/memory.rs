use std::collections::HashMap;

use async_trait::async_trait;
use matrixon_core::Result;
use tokio::sync::RwLock;

use super::{NidKind, ShortIds};

#[derive(Debug, Default)]
struct Tables {
    next_nid: i64,
    nids: HashMap<(NidKind, String), i64>,
    external_ids: HashMap<(NidKind, i64), String>,
}

/// In-memory NID table; NIDs count up from 1 across both kinds
#[derive(Debug, Default)]
pub struct MemoryShortIds {
    tables: RwLock<Tables>,
}

impl MemoryShortIds {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShortIds for MemoryShortIds {
    async fn get_or_create_nid(&self, kind: NidKind, external_id: &str) -> Result<i64> {
        let mut tables = self.tables.write().await;
        if let Some(nid) = tables.nids.get(&(kind, external_id.to_owned())) {
            return Ok(*nid);
        }
        tables.next_nid += 1;
        let nid = tables.next_nid;
        tables.nids.insert((kind, external_id.to_owned()), nid);
        tables.external_ids.insert((kind, nid), external_id.to_owned());
        Ok(nid)
    }

    async fn get_nid(&self, kind: NidKind, external_id: &str) -> Result<Option<i64>> {
        Ok(self
            .tables
            .read()
            .await
            .nids
            .get(&(kind, external_id.to_owned()))
            .copied())
    }

    async fn get_external_id(&self, kind: NidKind, nid: i64) -> Result<Option<String>> {
        Ok(self.tables.read().await.external_ids.get(&(kind, nid)).cloned())
    }
}
