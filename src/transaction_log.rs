//! Append-only JSON-lines transaction log
//!
//! Every line is one self-contained JSON array. A log interrupted mid-run
//! ends at the last flushed line and can be appended to again; nothing before
//! that line is ever modified, except by [`rewrite`] after a schema upgrade.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use serde_json::Value as Json;
use tempfile::NamedTempFile;

use crate::config::LogConfig;
use crate::migration::{record_kind, Record};
use crate::transaction::Transaction;
use crate::{Error, Result};

/// Appends transactions to a log file, one line each.
#[derive(Debug)]
pub struct TransactionWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    sync_on_write: bool,
}

impl TransactionWriter {
    /// Open `path` for appending with the default [`LogConfig`].
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the file or its parent directories cannot be created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &LogConfig::default())
    }

    /// Open `path` for appending, creating missing parent directories.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the file or its parent directories cannot be created.
    pub fn open_with<P: AsRef<Path>>(path: P, config: &LogConfig) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            sync_on_write: config.sync_on_write(),
        })
    }

    /// Path of the log being written.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one transaction and flush it.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] or [`Error::Json`] if the line cannot be written.
    pub fn write(&mut self, transaction: &Transaction) -> Result<()> {
        self.write_record(&transaction.to_json())
    }

    /// Append a sequence of transactions.
    ///
    /// # Errors
    ///
    /// Stops at the first failed write; earlier lines stay in the log.
    pub fn write_all<'a, I>(&mut self, transactions: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        transactions.into_iter().try_for_each(|t| self.write(t))
    }

    fn write_record(&mut self, record: &Json) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        if self.sync_on_write {
            self.writer.get_ref().sync_all()?;
        }
        Ok(())
    }
}

/// Lazily decodes the raw records of a log file.
///
/// Records are returned as JSON arrays without schema interpretation, so logs
/// of any version can be read before migration.
#[derive(Debug)]
pub struct TransactionReader {
    lines: Lines<BufReader<File>>,
    record: usize,
    failed: bool,
}

impl TransactionReader {
    /// Open `path` for reading.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            record: 0,
            failed: false,
        })
    }

    fn decode(&self, line: &str) -> Result<Record> {
        let record: Json = serde_json::from_str(line).map_err(|e| Error::MalformedRecord {
            record: self.record,
            reason: format!("invalid JSON: {e}"),
        })?;

        if record_kind(&record).is_none() {
            return Err(Error::MalformedRecord {
                record: self.record,
                reason: format!("expected a JSON array starting with a kind tag, got {record}"),
            });
        }

        Ok(record)
    }
}

impl Iterator for TransactionReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e.into()));
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            self.record += 1;
            let decoded = self.decode(&line);
            self.failed = decoded.is_err();
            return Some(decoded);
        }
    }
}

/// Every raw record of the log at `path`.
///
/// # Errors
///
/// [`Error::Io`] if the file cannot be read, [`Error::MalformedRecord`] for
/// the first line that is not a kind-tagged JSON array.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    TransactionReader::open(path)?.collect()
}

/// Replace the log at `path` with `records`.
///
/// The new contents are written to a temporary file in the same directory,
/// synced, then renamed over `path`, so readers see either the old log or the
/// new one.
///
/// # Errors
///
/// [`Error::Io`] or [`Error::Json`] if the new log cannot be written; `path`
/// is left untouched in that case.
pub fn rewrite<P: AsRef<Path>>(path: P, records: &[Record]) -> Result<()> {
    let path = path.as_ref();
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        for record in records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;

    Ok(())
}
