//! Destination for the transactions of a running benchmark
//!
//! A [`TransactionSink`] drops every transaction the restored result already
//! holds, then appends the rest either to a log on disk or to a memory buffer.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::LogConfig;
use crate::dedup::TransactionIsNew;
use crate::result::BenchmarkResult;
use crate::transaction::Transaction;
use crate::transaction_log::TransactionWriter;
use crate::Result;

#[derive(Debug)]
enum Destination {
    Memory(Vec<Transaction>),
    Disk(TransactionWriter),
}

/// Deduplicating sink over a transaction log or an in-memory buffer.
#[derive(Debug)]
pub struct TransactionSink {
    restored: BenchmarkResult,
    destination: Destination,
    config: LogConfig,
}

impl TransactionSink {
    /// Sink writing to `log` (or to memory when `None`) with the default [`LogConfig`].
    ///
    /// # Errors
    ///
    /// [`crate::Error::Io`] if the log cannot be opened for appending.
    pub fn new(log: Option<PathBuf>, restored: BenchmarkResult) -> Result<Self> {
        Self::with_config(log, restored, LogConfig::default())
    }

    /// Sink writing to `log` (or to memory when `None`).
    ///
    /// `restored` is the result already recovered from `log`; transactions
    /// it holds are never written again.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Io`] if the log cannot be opened for appending.
    pub fn with_config(
        log: Option<PathBuf>,
        restored: BenchmarkResult,
        config: LogConfig,
    ) -> Result<Self> {
        let destination = match log {
            Some(path) => Destination::Disk(TransactionWriter::open_with(path, &config)?),
            None => Destination::Memory(Vec::new()),
        };

        Ok(Self {
            restored,
            destination,
            config,
        })
    }

    /// Log path, if the sink writes to disk.
    #[must_use]
    pub fn log_path(&self) -> Option<&Path> {
        match &self.destination {
            Destination::Disk(writer) => Some(writer.path()),
            Destination::Memory(_) => None,
        }
    }

    /// Write the transactions the restored result does not hold yet.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Io`] or [`crate::Error::Json`] if a disk write fails.
    pub fn write<I>(&mut self, transactions: I) -> Result<()>
    where
        I: IntoIterator<Item = Transaction>,
    {
        let mut written = 0_usize;
        for transaction in TransactionIsNew::new(&self.restored).filter(transactions) {
            match &mut self.destination {
                Destination::Memory(buffer) => buffer.push(transaction),
                Destination::Disk(writer) => writer.write(&transaction)?,
            }
            written += 1;
        }
        debug!(written, "wrote new transactions");
        Ok(())
    }

    /// Close the sink and fold everything it holds.
    ///
    /// A memory sink folds the buffered transactions onto the restored
    /// result; a disk sink re-reads its log.
    ///
    /// # Errors
    ///
    /// Any error of [`BenchmarkResult::apply`] or [`BenchmarkResult::from_log_with`].
    pub fn into_result(self) -> Result<BenchmarkResult> {
        match self.destination {
            Destination::Memory(buffer) => {
                let mut result = self.restored;
                for transaction in buffer {
                    result.apply(transaction)?;
                }
                Ok(result)
            }
            Destination::Disk(writer) => {
                let path = writer.path().to_path_buf();
                drop(writer);
                BenchmarkResult::from_log_with(path, &self.config)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{interaction_record, learner_record, version_record};
    use crate::transaction_log::read_records;
    use crate::value::{fields, packed, Fields, Value};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_memory_sink_folds_restored_and_new() {
        let restored =
            BenchmarkResult::from_transactions([learner_record(0, Fields::new())]).unwrap();
        let mut sink = TransactionSink::new(None, restored).unwrap();
        assert!(sink.log_path().is_none());

        sink.write([
            learner_record(0, fields([("family", Value::from("ignored"))])),
            learner_record(1, Fields::new()),
            interaction_record(0, 1, Fields::new(), None),
        ])
        .unwrap();

        let result = sink.into_result().unwrap();
        assert_eq!(result.learners().len(), 2);
        assert!(!result.learners().get(0).unwrap().contains_key("family"));
        assert_eq!(result.interactions().len(), 1);
    }

    #[test]
    fn test_disk_sink_skips_restored_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");

        let mut first = TransactionSink::new(Some(path.clone()), BenchmarkResult::new()).unwrap();
        first
            .write([version_record(None), learner_record(0, Fields::new())])
            .unwrap();
        let restored = first.into_result().unwrap();

        let mut resumed = TransactionSink::new(Some(path.clone()), restored).unwrap();
        resumed
            .write([
                version_record(None),
                learner_record(0, Fields::new()),
                learner_record(1, Fields::new()),
            ])
            .unwrap();
        let result = resumed.into_result().unwrap();

        assert_eq!(read_records(&path).unwrap().len(), 3);
        assert_eq!(result.learners().len(), 2);
        assert_eq!(result.version(), Some(3));
    }

    #[test]
    fn test_memory_and_disk_sinks_agree_on_packed_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        let transactions = || {
            [
                interaction_record(
                    0,
                    0,
                    fields([("_packed", Value::Opaque(json!({"reward": [1, 0]})))]),
                    None,
                ),
                interaction_record(
                    0,
                    1,
                    fields([("_packed", Value::from("shadowed")), ("N", Value::from(1))]),
                    Some(packed([("reward", vec![Value::from(1)])])),
                ),
            ]
        };

        let mut memory = TransactionSink::new(None, BenchmarkResult::new()).unwrap();
        memory.write(transactions()).unwrap();
        let memory = memory.into_result().unwrap();

        let mut disk = TransactionSink::new(Some(path), BenchmarkResult::new()).unwrap();
        disk.write(transactions()).unwrap();
        let disk = disk.into_result().unwrap();

        let interactions = memory.interactions();
        assert_eq!(interactions.len(), 3);
        assert_eq!(
            interactions.columns(),
            vec!["simulation_id", "learner_id", "index", "reward", "N"]
        );
        assert_eq!(interactions.columns(), disk.interactions().columns());
        assert_eq!(
            interactions.iter().collect::<Vec<_>>(),
            disk.interactions().iter().collect::<Vec<_>>()
        );
    }
}
