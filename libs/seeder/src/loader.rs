//! CSV-to-table load pipeline.
//!
//! One transaction covers the whole file: rows that fail validation or
//! duplicate an existing `user_id` are skipped and counted, anything
//! fatal (unreadable file, broken connection) aborts and rolls back.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::error::{Result, SeedError};
use crate::source::{CsvSource, NextRow};
use crate::store::{insert_user, user_exists, UserStore};

/// Counters for one load run.
///
/// `rows_read` always equals `inserted + duplicates_skipped + invalid_rows`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub rows_read: u64,
    pub inserted: u64,
    pub duplicates_skipped: u64,
    pub invalid_rows: u64,
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows_read={} inserted={} duplicates_skipped={} invalid_rows={}",
            self.rows_read, self.inserted, self.duplicates_skipped, self.invalid_rows
        )
    }
}

/// Read `path` and insert every valid, previously unseen row into
/// `user_data`.
///
/// Re-running against the same file is a no-op that reports everything
/// as duplicates.
pub async fn load_csv(store: &UserStore<'_>, path: &Path) -> Result<LoadReport> {
    let mut source = CsvSource::open(path)?;
    let mut report = LoadReport::default();

    let mut tx = store.db().begin().await?;
    while let Some(next) = source.next_row()? {
        report.rows_read += 1;
        let (line, raw) = match next {
            NextRow::Row { line, raw } => (line, raw),
            NextRow::Malformed { line, reason } => {
                report.invalid_rows += 1;
                tracing::warn!(line, %reason, "skipping malformed row");
                continue;
            }
        };
        let rec = match raw.validate() {
            Ok(rec) => rec,
            Err(issue) => {
                report.invalid_rows += 1;
                tracing::warn!(line, %issue, "skipping invalid row");
                continue;
            }
        };
        if user_exists(&mut tx, &rec.user_id).await? {
            report.duplicates_skipped += 1;
            tracing::debug!(line, user_id = %rec.user_id, "skipping duplicate row");
            continue;
        }
        insert_user(&mut tx, &rec).await?;
        report.inserted += 1;
    }
    // A single commit covers the whole load; on any fatal error above the
    // dropped transaction rolls back.
    tx.commit().await.map_err(SeedError::Commit)?;

    tracing::info!(
        path = %path.display(),
        rows_read = report.rows_read,
        inserted = report.inserted,
        duplicates_skipped = report.duplicates_skipped,
        invalid_rows = report.invalid_rows,
        "seed load finished"
    );
    Ok(report)
}
