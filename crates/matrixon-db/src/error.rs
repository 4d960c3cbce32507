//! Mapping from sqlx failures to Matrixon errors

use matrixon_core::{MatrixonError, Result};
use tracing::error;

/// Convert a sqlx error raised by `operation` into a typed Matrixon error.
///
/// Decoding problems mean the stored bytes are wrong and map to
/// `Database`; everything else is a fault of the storage layer itself.
pub(crate) fn storage_err(operation: &'static str) -> impl FnOnce(sqlx::Error) -> MatrixonError {
    move |err| match err {
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::TypeNotFound { .. } => {
            error!("❌ {} returned undecodable data: {}", operation, err);
            MatrixonError::Database(format!("{operation}: {err}"))
        }
        _ => {
            error!("❌ {} failed: {}", operation, err);
            MatrixonError::StorageUnavailable(format!("{operation}: {err}"))
        }
    }
}

/// Take the one row an upsert `RETURNING` clause produces.
///
/// Upserts are read with `fetch_all` so the statement runs to completion
/// (and its transaction commits) before the caller sees the row.
pub(crate) fn returned_row<T>(rows: Vec<T>, operation: &'static str) -> Result<T> {
    rows.into_iter().next().ok_or_else(|| {
        error!("❌ {} returned no row", operation);
        MatrixonError::Database(format!("{operation}: no row returned"))
    })
}
