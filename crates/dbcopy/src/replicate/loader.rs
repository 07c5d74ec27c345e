//! Self-healing bulk load.
//!
//! A failed load is diagnosed from the server's error text. Two mismatches
//! are repaired by additive DDL before retrying: a column missing from the
//! destination is added as text, and a text column too narrow for the
//! batch is widened. Anything else is retried as is.

use tracing::{debug, info, warn};

use crate::core::{Dialect, LoadFault, Params, RecordBatch};
use crate::database::Database;
use crate::error::{CopyError, Result};

/// Width of a widened column for the longest observed value.
pub fn widened_width(observed: usize) -> usize {
    (observed + 50).max(100) * 2
}

/// A schema repair applied before a retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    AddedColumn { column: String, width: usize },
    WidenedColumn { column: String, width: usize },
}

/// Outcome of a successful load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Attempt on which the load succeeded, counting from 1.
    pub attempts: usize,
    pub repairs: Vec<Repair>,
    pub rows: u64,
}

#[derive(Debug)]
enum LoadState {
    Uploading,
    Diagnosing(CopyError),
    Repairing(LoadFault),
    Success(u64),
    Exhausted(CopyError),
}

/// Retries a batch load, repairing recognized schema mismatches in between.
#[derive(Debug, Clone)]
pub struct ResilientBulkLoader<'a> {
    db: &'a Database,
    max_attempts: usize,
    add_width: usize,
}

impl<'a> ResilientBulkLoader<'a> {
    /// Loader with the database's configured attempts and repair width.
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            max_attempts: db.settings().max_load_attempts,
            add_width: db.settings().repair_text_width,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_add_width(mut self, width: usize) -> Self {
        self.add_width = width;
        self
    }

    /// Load `batch` into `table`.
    ///
    /// # Errors
    ///
    /// [`CopyError::ExhaustedRetry`] once `max_attempts` loads have failed,
    /// carrying the last load error.
    pub async fn load(&self, table: &str, batch: &RecordBatch) -> Result<LoadReport> {
        let mut attempts = 0;
        let mut repairs = Vec::new();
        let mut state = LoadState::Uploading;

        loop {
            state = match state {
                LoadState::Uploading => {
                    attempts += 1;
                    match self.db.upload_batch(table, batch).await {
                        Ok(rows) => LoadState::Success(rows),
                        Err(e) if attempts >= self.max_attempts => LoadState::Exhausted(e),
                        Err(e) => LoadState::Diagnosing(e),
                    }
                }
                LoadState::Diagnosing(e) => {
                    warn!("Load into {} failed (attempt {}): {}", table, attempts, e);
                    match self.db.dialect().diagnose(&e.server_message()) {
                        Some(fault) => LoadState::Repairing(fault),
                        None => {
                            warn!("Unrecognized load error on {}; retrying unchanged", table);
                            LoadState::Uploading
                        }
                    }
                }
                LoadState::Repairing(fault) => {
                    if let Some(repair) = self.repair(table, batch, fault).await {
                        repairs.push(repair);
                    }
                    LoadState::Uploading
                }
                LoadState::Success(rows) => {
                    if attempts > 1 {
                        info!(
                            "Loaded {} rows into {} on attempt {} after {} repairs",
                            rows,
                            table,
                            attempts,
                            repairs.len()
                        );
                    }
                    return Ok(LoadReport {
                        attempts,
                        repairs,
                        rows,
                    });
                }
                LoadState::Exhausted(last) => {
                    return Err(CopyError::ExhaustedRetry {
                        table: table.to_string(),
                        attempts,
                        last: Box::new(last),
                    });
                }
            };
        }
    }

    /// Apply the DDL for a fault. Repair failures are logged and swallowed.
    async fn repair(&self, table: &str, batch: &RecordBatch, fault: LoadFault) -> Option<Repair> {
        let dialect = self.db.dialect();
        let (sql, repair) = match fault {
            LoadFault::MissingColumn(column) => {
                let sql = dialect.add_text_column_sql(table, &column, self.add_width);
                let width = self.add_width;
                (sql, Repair::AddedColumn { column, width })
            }
            LoadFault::ValueTooLong(column) => {
                let width = widened_width(longest_text(batch, &column));
                let sql = dialect.widen_text_column_sql(table, &column, width);
                (sql, Repair::WidenedColumn { column, width })
            }
        };
        debug!("Repairing {}: {}", table, sql);
        match self.db.execute(&sql, Params::None).await {
            Ok(_) => {
                info!("Repaired {}: {:?}", table, repair);
                Some(repair)
            }
            Err(e) => {
                warn!("Repair of {} failed: {}", table, e);
                None
            }
        }
    }
}

/// Longest text rendering of a column across the batch, in characters.
fn longest_text(batch: &RecordBatch, column: &str) -> usize {
    let Some(idx) = batch.column_index(column) else {
        return 0;
    };
    batch
        .rows()
        .iter()
        .filter_map(|row| row.get(idx).and_then(|v| v.to_text()))
        .map(|s| s.chars().count())
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbKind;
    use crate::core::Value;
    use crate::testing::{batch, scripted, Event, Response};

    fn rows() -> RecordBatch {
        batch(
            &["ID", "FOO"],
            vec![
                vec![Value::Int(1), Value::from("x".repeat(120))],
                vec![Value::Int(2), Value::from("short")],
            ],
        )
    }

    #[test]
    fn test_widened_width_rule() {
        assert_eq!(widened_width(120), 340);
        assert_eq!(widened_width(10), 200);
        assert_eq!(longest_text(&rows(), "foo"), 120);
        assert_eq!(longest_text(&rows(), "missing"), 0);
    }

    #[tokio::test]
    async fn test_two_missing_columns_then_success() {
        let (db, script) = scripted(DbKind::Oracle);
        script.on_seq(
            "insert into",
            vec![
                Response::Fail("ORA-00904: \"FOO\": invalid identifier".into()),
                Response::Fail("ORA-00904: \"FOO\": invalid identifier".into()),
                Response::Affected(2),
            ],
        );
        let report = ResilientBulkLoader::new(&db)
            .load("DWH.SALES", &rows())
            .await
            .unwrap();
        assert_eq!(report.attempts, 3);
        assert_eq!(report.rows, 2);
        assert_eq!(
            report.repairs,
            vec![
                Repair::AddedColumn { column: "FOO".into(), width: 300 },
                Repair::AddedColumn { column: "FOO".into(), width: 300 },
            ]
        );
        let adds = script
            .statements()
            .into_iter()
            .filter(|s| s.starts_with("ALTER TABLE DWH.SALES ADD"))
            .count();
        assert_eq!(adds, 2);
    }

    #[tokio::test]
    async fn test_value_too_long_widens_to_observed() {
        let (db, script) = scripted(DbKind::Mysql);
        script.on_seq(
            "insert into",
            vec![
                Response::Fail("Data too long for column 'FOO' at row 1".into()),
                Response::Affected(2),
            ],
        );
        let report = ResilientBulkLoader::new(&db).load("s.t", &rows()).await.unwrap();
        assert_eq!(
            report.repairs,
            vec![Repair::WidenedColumn { column: "FOO".into(), width: 340 }]
        );
        assert!(script
            .statements()
            .iter()
            .any(|s| s.contains("MODIFY COLUMN") && s.contains("VARCHAR(340)")));
    }

    #[tokio::test]
    async fn test_unrecognized_errors_exhaust_after_max_attempts() {
        let (db, script) = scripted(DbKind::Postgres);
        script.on("insert into", Response::Fail("deadlock detected".into()));
        let err = ResilientBulkLoader::new(&db)
            .with_max_attempts(4)
            .load("public.t", &rows())
            .await
            .unwrap_err();
        match err {
            CopyError::ExhaustedRetry { table, attempts, last } => {
                assert_eq!(table, "public.t");
                assert_eq!(attempts, 4);
                assert_eq!(last.server_message(), "deadlock detected");
            }
            other => panic!("unexpected error: {other}"),
        }
        let loads = script
            .events()
            .into_iter()
            .filter(|e| matches!(e, Event::ExecuteMany(..)))
            .count();
        assert_eq!(loads, 4);
    }

    #[tokio::test]
    async fn test_failed_repair_still_consumes_attempt() {
        let (db, script) = scripted(DbKind::Oracle);
        script.on("alter table", Response::Fail("ORA-01031: insufficient privileges".into()));
        script.on("insert into", Response::Fail("ORA-00904: \"FOO\": invalid identifier".into()));
        let err = ResilientBulkLoader::new(&db)
            .with_max_attempts(3)
            .load("T", &rows())
            .await
            .unwrap_err();
        assert!(matches!(err, CopyError::ExhaustedRetry { attempts: 3, .. }));
    }
}
