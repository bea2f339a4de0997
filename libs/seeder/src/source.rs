use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{Reader, ReaderBuilder, StringRecord};

use crate::error::{Result, SeedError};
use crate::model::RawRow;

/// Outcome of pulling one row off the CSV stream.
#[derive(Debug)]
pub enum NextRow {
    /// A structurally sound row with its 1-based line number in the file.
    Row { line: u64, raw: RawRow },
    /// A row the CSV layer could not make sense of (wrong field count,
    /// bad UTF-8). The stream stays usable for the rows after it.
    Malformed { line: u64, reason: String },
}

/// Lazy CSV reader that yields one row at a time.
///
/// A header row is required; columns are located by name.
#[derive(Debug)]
pub struct CsvSource {
    reader: Reader<File>,
    headers: StringRecord,
    path: PathBuf,
}

impl CsvSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| SeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
        let headers = reader.headers()?.clone();
        tracing::debug!(path = %path.display(), headers = ?headers, "opened CSV source");

        Ok(Self {
            reader,
            headers,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pull the next row. Returns `Ok(None)` at end of file. I/O failures
    /// mid-stream are fatal; per-row shape problems are reported as
    /// `NextRow::Malformed` and reading continues.
    pub fn next_row(&mut self) -> Result<Option<NextRow>> {
        let mut record = StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(false) => Ok(None),
            Ok(true) => {
                let line = record.position().map_or(0, |p| p.line());
                match record.deserialize::<RawRow>(Some(&self.headers)) {
                    Ok(raw) => Ok(Some(NextRow::Row { line, raw })),
                    Err(e) => Ok(Some(NextRow::Malformed {
                        line,
                        reason: e.to_string(),
                    })),
                }
            }
            Err(e) if e.is_io_error() => Err(SeedError::Csv(e)),
            Err(e) => {
                let line = self.reader.position().line();
                Ok(Some(NextRow::Malformed {
                    line,
                    reason: e.to_string(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.csv");
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_rows_match_headers_by_name() {
        // Shuffled column order still lands in the right fields.
        let (_dir, path) = write_csv("age,email,user_id,name\n30,a@b.c,u-1,Alice\n");
        let mut src = CsvSource::open(&path).unwrap();

        let next = src.next_row().unwrap().unwrap();
        match next {
            NextRow::Row { line, raw } => {
                assert_eq!(line, 2);
                assert_eq!(raw.user_id.as_deref(), Some("u-1"));
                assert_eq!(raw.name.as_deref(), Some("Alice"));
                assert_eq!(raw.email.as_deref(), Some("a@b.c"));
                assert_eq!(raw.age.as_deref(), Some("30"));
            }
            other => panic!("expected a row, got {other:?}"),
        }
        assert!(src.next_row().unwrap().is_none());
    }

    #[test]
    fn test_missing_column_comes_back_as_none() {
        let (_dir, path) = write_csv("user_id,name,email\nu-1,Alice,a@b.c\n");
        let mut src = CsvSource::open(&path).unwrap();

        match src.next_row().unwrap().unwrap() {
            NextRow::Row { raw, .. } => assert!(raw.age.is_none()),
            other => panic!("expected a row, got {other:?}"),
        }
    }

    #[test]
    fn test_short_row_is_malformed_but_stream_continues() {
        let (_dir, path) = write_csv("user_id,name,email,age\nu-1,Alice\nu-2,Bob,b@b.c,25\n");
        let mut src = CsvSource::open(&path).unwrap();

        match src.next_row().unwrap().unwrap() {
            NextRow::Malformed { .. } => {}
            other => panic!("expected malformed, got {other:?}"),
        }
        match src.next_row().unwrap().unwrap() {
            NextRow::Row { raw, .. } => assert_eq!(raw.user_id.as_deref(), Some("u-2")),
            other => panic!("expected a row, got {other:?}"),
        }
        assert!(src.next_row().unwrap().is_none());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = CsvSource::open(Path::new("/nonexistent/users.csv")).unwrap_err();
        assert!(matches!(err, SeedError::Io { .. }));
    }
}
