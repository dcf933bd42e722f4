//! # benchmark-store: Append-Only Result Store for Bandit Benchmarks
//!
//! **Version**: 0.1.0
//!
//! A benchmark run emits a stream of small, self-describing transactions:
//! learner metadata, simulation metadata and per-interaction outcomes. The
//! stream is appended to a JSON-lines log as it is produced, so an interrupted
//! run can be resumed without repeating work, and folded into a
//! [`BenchmarkResult`] of three keyed columnar tables for analysis.
//!
//! ## Components
//!
//! - [`table`]: keyed container with flat and packed row parts, row-major and
//!   columnar materialization
//! - [`transaction`]: record factories and the wire codec
//! - [`transaction_log`]: append-only writer, lazy reader, atomic rewrite
//! - [`migration`]: pure `v -> v+1` schema steps for old logs
//! - [`dedup`] and [`sink`]: resume support
//! - [`export`]: Arrow `RecordBatch` and Parquet output
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use benchmark_store::transaction::{interaction_record, learner_record, version_record};
//! use benchmark_store::value::{fields, packed, Value};
//! use benchmark_store::{BenchmarkResult, TransactionWriter};
//!
//! let mut log = TransactionWriter::open("results/run.jsonl")?;
//! log.write(&version_record(None))?;
//! log.write(&learner_record(0, fields([("family", Value::from("UCB"))])))?;
//! log.write(&interaction_record(
//!     0,
//!     0,
//!     fields([("N", Value::from(3))]),
//!     Some(packed([("reward", vec![Value::from(1), Value::from(0), Value::from(1)])])),
//! ))?;
//! drop(log);
//!
//! let result = BenchmarkResult::from_log("results/run.jsonl")?;
//! println!("{result}");
//! let rewards = result.interactions().materialize_columnar();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod dedup;
pub mod error;
pub mod export;
pub mod migration;
pub mod result;
pub mod sink;
pub mod table;
pub mod transaction;
pub mod transaction_log;
pub mod value;

pub use config::{LogConfig, LogConfigBuilder};
pub use dedup::{is_new, TransactionIsNew};
pub use error::{Error, Result};
pub use result::BenchmarkResult;
pub use sink::TransactionSink;
pub use table::{ColumnBuffer, Columns, DType, Table};
pub use transaction::Transaction;
pub use transaction_log::{TransactionReader, TransactionWriter};
pub use value::{Fields, KeyPart, Packed, RowKey, Value};
