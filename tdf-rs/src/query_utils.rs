//! Database query utility functions
//!
//! Low-level helpers for the query patterns repeated over the `analysis.tdf` tables.
//!
//! # Usage
//!
//! ```no_run
//! use tdf::query_utils::{query_single_i64, query_single_string_with_params, table_exists};
//! use rusqlite::Connection;
//!
//! let db = Connection::open("run.d/analysis.tdf").unwrap();
//! let count = query_single_i64(&db, "SELECT COUNT(*) FROM Frames").unwrap();
//! let instrument = query_single_string_with_params(
//!     &db,
//!     "SELECT Value FROM GlobalMetadata WHERE Key = ?1",
//!     ["InstrumentName"],
//! ).unwrap();
//! let is_maldi = table_exists(&db, "MaldiFrameInfo").unwrap();
//! ```

use anyhow_ext::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

// ============================================================================
// Single value query helpers
// ============================================================================

/// Query a single optional i64 value
pub fn query_single_i64(db: &Connection, sql: &str) -> Result<Option<i64>> {
    db.prepare(sql)
        .dot()?
        .query_row([], |row| row.get(0))
        .optional()
        .dot()
}

/// Query a single optional String value with parameters
pub fn query_single_string_with_params<P: rusqlite::Params>(
    db: &Connection,
    sql: &str,
    params: P,
) -> Result<Option<String>> {
    db.prepare(sql)
        .dot()?
        .query_row(params, |row| row.get(0))
        .optional()
        .dot()
}

/// Query a single optional f64 value with parameters
pub fn query_single_f64_with_params<P: rusqlite::Params>(
    db: &Connection,
    sql: &str,
    params: P,
) -> Result<Option<f64>> {
    db.prepare(sql)
        .dot()?
        .query_row(params, |row| row.get(0))
        .optional()
        .dot()
}

// ============================================================================
// Table utilities
// ============================================================================

/// Check if a table exists in the database
pub fn table_exists(db: &Connection, table_name: &str) -> Result<bool> {
    let count: i64 = db
        .prepare("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = ?1")
        .dot()?
        .query_row([table_name], |row| row.get(0))
        .dot()?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let db = Connection::open_in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE GlobalMetadata (Key TEXT PRIMARY KEY, Value TEXT);
             INSERT INTO GlobalMetadata VALUES ('InstrumentName', 'timsTOF Pro');
             INSERT INTO GlobalMetadata VALUES ('MzAcqRangeLower', '100.5');",
        )
        .unwrap();
        db
    }

    #[test]
    fn test_table_exists() {
        let db = test_db();
        assert!(table_exists(&db, "GlobalMetadata").unwrap());
        assert!(!table_exists(&db, "MaldiFrameInfo").unwrap());
    }

    #[test]
    fn test_single_value_helpers() {
        let db = test_db();
        let count = query_single_i64(&db, "SELECT COUNT(*) FROM GlobalMetadata").unwrap();
        assert_eq!(count, Some(2));

        let name = query_single_string_with_params(
            &db,
            "SELECT Value FROM GlobalMetadata WHERE Key = ?1",
            ["InstrumentName"],
        )
        .unwrap();
        assert_eq!(name.as_deref(), Some("timsTOF Pro"));

        let lower = query_single_f64_with_params(
            &db,
            "SELECT CAST(Value AS REAL) FROM GlobalMetadata WHERE Key = ?1",
            ["MzAcqRangeLower"],
        )
        .unwrap();
        assert_eq!(lower, Some(100.5));

        let missing = query_single_string_with_params(
            &db,
            "SELECT Value FROM GlobalMetadata WHERE Key = ?1",
            ["Missing"],
        )
        .unwrap();
        assert!(missing.is_none());
    }
}
