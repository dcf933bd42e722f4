//! The materialized state of one benchmark run
//!
//! A [`BenchmarkResult`] is the fold of a transaction stream: the schema
//! version, free-form benchmark metadata, and three keyed tables.
//!
//! | Table          | Primary key                     | Fed by |
//! |----------------|---------------------------------|--------|
//! | `Learners`     | `learner_id`                    | `L`    |
//! | `Simulations`  | `simulation_id`                 | `S`    |
//! | `Interactions` | `simulation_id`, `learner_id`   | `I`    |

use std::fmt;
use std::path::Path;

use tracing::{debug, info};

use crate::config::LogConfig;
use crate::migration::{self, Promotion};
use crate::table::Table;
use crate::transaction::Transaction;
use crate::transaction_log::{read_records, rewrite};
use crate::value::{Fields, Packed, RowKey, PACKED_FIELD};
use crate::{Error, Result};

/// Name of the learners table.
pub const LEARNERS_TABLE: &str = "Learners";
/// Name of the simulations table.
pub const SIMULATIONS_TABLE: &str = "Simulations";
/// Name of the interactions table.
pub const INTERACTIONS_TABLE: &str = "Interactions";

/// Version, metadata and tables folded from a transaction stream.
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    version: Option<u32>,
    benchmark: Fields,
    has_benchmark: bool,
    learners: Table,
    simulations: Table,
    interactions: Table,
}

impl Default for BenchmarkResult {
    fn default() -> Self {
        Self::new()
    }
}

impl BenchmarkResult {
    /// An empty result with no version and no metadata.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: None,
            benchmark: Fields::new(),
            has_benchmark: false,
            learners: Table::new(LEARNERS_TABLE, &["learner_id"]),
            simulations: Table::new(SIMULATIONS_TABLE, &["simulation_id"]),
            interactions: Table::new(INTERACTIONS_TABLE, &["simulation_id", "learner_id"]),
        }
    }

    /// Fold transactions in order.
    ///
    /// # Errors
    ///
    /// The first table error ([`Error::InvalidShape`]) aborts the fold.
    pub fn from_transactions<I>(transactions: I) -> Result<Self>
    where
        I: IntoIterator<Item = Transaction>,
    {
        let mut result = Self::new();
        for transaction in transactions {
            result.apply(transaction)?;
        }
        Ok(result)
    }

    /// Read, upgrade and fold the log at `path` with the default [`LogConfig`].
    ///
    /// # Errors
    ///
    /// See [`BenchmarkResult::from_log_with`].
    pub fn from_log<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_log_with(path, &LogConfig::default())
    }

    /// Read, upgrade and fold the log at `path`.
    ///
    /// A log written under an older schema is promoted to the current one
    /// and, if `config.rewrite_on_upgrade()` and the upgraded records fold
    /// cleanly, written back to `path`. A current log is never
    /// rewritten.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the log cannot be read or rewritten
    /// - [`Error::MalformedRecord`] if a record does not decode; for an
    ///   upgraded log the number counts upgraded records
    /// - [`Error::MigrationImpossible`] if an upgrade cannot be computed
    ///
    /// The log is left untouched whenever an error other than a failed
    /// rewrite is returned.
    pub fn from_log_with<P: AsRef<Path>>(path: P, config: &LogConfig) -> Result<Self> {
        let path = path.as_ref();
        let records = read_records(path)?;

        let (records, upgraded_from) = match migration::promote(&records)? {
            Promotion::Current => (records, None),
            Promotion::Upgraded { from, records } => {
                info!(
                    path = %path.display(),
                    from,
                    to = migration::CURRENT_VERSION,
                    "upgraded transaction log"
                );
                (records, Some(from))
            }
        };

        let transactions = records
            .iter()
            .cloned()
            .enumerate()
            .map(|(position, record)| {
                Transaction::from_json(record).map_err(|reason| Error::MalformedRecord {
                    record: position + 1,
                    reason: match upgraded_from {
                        Some(from) => {
                            format!("{reason} (numbered after upgrading from version {from})")
                        }
                        None => reason,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(path = %path.display(), transactions = transactions.len(), "folding transaction log");
        let result = Self::from_transactions(transactions)?;

        if upgraded_from.is_some() && config.rewrite_on_upgrade() {
            rewrite(path, &records)?;
            info!(path = %path.display(), records = records.len(), "rewrote transaction log");
        }

        Ok(result)
    }

    /// Fold one more transaction into the result.
    ///
    /// `version` and `benchmark` keep the first value seen; `L`, `S` and `I`
    /// upsert their row. A flat `_packed` field is folded the way the log
    /// would decode it: it becomes the packed part, or is dropped when an
    /// explicit packed part is present.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidShape`] if a packed part has unequal lengths or a flat
    /// `_packed` field is not an object of arrays.
    pub fn apply(&mut self, transaction: Transaction) -> Result<()> {
        match transaction {
            Transaction::Version(version) => {
                self.version.get_or_insert(version);
            }
            Transaction::Benchmark(metadata) => {
                if !self.has_benchmark {
                    self.benchmark = metadata;
                    self.has_benchmark = true;
                }
            }
            Transaction::Learner {
                learner_id,
                fields,
                packed,
            } => fold_row(&mut self.learners, learner_id, fields, packed)?,
            Transaction::Simulation {
                simulation_id,
                fields,
                packed,
            } => fold_row(&mut self.simulations, simulation_id, fields, packed)?,
            Transaction::Interaction {
                simulation_id,
                learner_id,
                fields,
                packed,
            } => fold_row(
                &mut self.interactions,
                (simulation_id, learner_id),
                fields,
                packed,
            )?,
        }
        Ok(())
    }

    /// Schema version of the folded log, if one was recorded.
    #[must_use]
    pub const fn version(&self) -> Option<u32> {
        self.version
    }

    /// Benchmark metadata (empty if none was recorded).
    #[must_use]
    pub const fn benchmark_metadata(&self) -> &Fields {
        &self.benchmark
    }

    /// True if a benchmark record has been folded.
    #[must_use]
    pub const fn has_benchmark_metadata(&self) -> bool {
        self.has_benchmark
    }

    /// Learner metadata, keyed by `learner_id`.
    #[must_use]
    pub const fn learners(&self) -> &Table {
        &self.learners
    }

    /// Simulation metadata, keyed by `simulation_id`.
    #[must_use]
    pub const fn simulations(&self) -> &Table {
        &self.simulations
    }

    /// Interaction outcomes, keyed by `(simulation_id, learner_id)`.
    #[must_use]
    pub const fn interactions(&self) -> &Table {
        &self.interactions
    }

    /// All three tables: learners, simulations, interactions.
    #[must_use]
    pub const fn tables(&self) -> [&Table; 3] {
        [&self.learners, &self.simulations, &self.interactions]
    }
}

/// Upsert a row as its wire encoding would decode it.
fn fold_row(
    table: &mut Table,
    key: impl Into<RowKey>,
    mut fields: Fields,
    packed: Option<Packed>,
) -> Result<()> {
    if packed.is_some() {
        fields.shift_remove(PACKED_FIELD);
        table.set(key, fields, packed)
    } else {
        table.set_fields(key, fields)
    }
}

impl fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{Learners: {}, Simulations: {}, Interactions: {}}}",
            self.learners.len(),
            self.simulations.len(),
            self.interactions.len()
        )
    }
}
