use async_trait::async_trait;
use matrixon_core::Result;
use sqlx::sqlite::SqlitePool;
use tracing::{debug, instrument};

use super::{NidKind, ShortIds};
use crate::{
    error::{returned_row, storage_err},
    pool::ExclusiveWriter,
};

const INSERT_NID_SQL: &str = r#"
    INSERT INTO roomserver_short_ids (kind, external_id) VALUES (?1, ?2)
    ON CONFLICT (kind, external_id) DO UPDATE SET external_id = roomserver_short_ids.external_id
    RETURNING nid
"#;

const SELECT_NID_SQL: &str =
    "SELECT nid FROM roomserver_short_ids WHERE kind = ?1 AND external_id = ?2";

const SELECT_EXTERNAL_ID_SQL: &str =
    "SELECT external_id FROM roomserver_short_ids WHERE kind = ?1 AND nid = ?2";

#[derive(Debug, Clone)]
pub struct SqliteShortIds {
    pool: SqlitePool,
    writer: ExclusiveWriter,
}

impl SqliteShortIds {
    pub fn new(pool: SqlitePool, writer: ExclusiveWriter) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl ShortIds for SqliteShortIds {
    #[instrument(level = "debug", skip(self))]
    async fn get_or_create_nid(&self, kind: NidKind, external_id: &str) -> Result<i64> {
        let rows = {
            let _guard = self.writer.acquire().await;
            let mut tx = self.pool.begin().await.map_err(storage_err("begin short id"))?;
            let rows: Vec<(i64,)> = sqlx::query_as(INSERT_NID_SQL)
                .bind(kind.as_str())
                .bind(external_id)
                .fetch_all(&mut *tx)
                .await
                .map_err(storage_err("insert short id"))?;
            tx.commit().await.map_err(storage_err("commit short id"))?;
            rows
        };
        let (nid,) = returned_row(rows, "insert short id")?;
        debug!("🔢 {} {} has nid {}", kind, external_id, nid);
        Ok(nid)
    }

    async fn get_nid(&self, kind: NidKind, external_id: &str) -> Result<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as(SELECT_NID_SQL)
            .bind(kind.as_str())
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err("select short id"))?;
        Ok(row.map(|(nid,)| nid))
    }

    async fn get_external_id(&self, kind: NidKind, nid: i64) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(SELECT_EXTERNAL_ID_SQL)
            .bind(kind.as_str())
            .bind(nid)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err("select external id"))?;
        Ok(row.map(|(external_id,)| external_id))
    }
}
