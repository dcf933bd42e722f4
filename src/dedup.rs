//! Resume support: drop transactions a result already holds
//!
//! When a benchmark resumes against an existing log, the execution engine
//! replays everything it would have written. Passing that stream through
//! [`TransactionIsNew`] leaves only the records the log is missing, so the
//! same work is never written twice.

use crate::result::BenchmarkResult;
use crate::transaction::Transaction;

/// True if `transaction` adds something `existing` does not hold yet.
///
/// `version` and `benchmark` are new only while unset; `L`, `S` and `I` are
/// new only if their key is absent from the matching table.
#[must_use]
pub fn is_new(existing: &BenchmarkResult, transaction: &Transaction) -> bool {
    match transaction {
        Transaction::Version(_) => existing.version().is_none(),
        Transaction::Benchmark(_) => !existing.has_benchmark_metadata(),
        Transaction::Learner { learner_id, .. } => !existing.learners().contains(*learner_id),
        Transaction::Simulation { simulation_id, .. } => {
            !existing.simulations().contains(*simulation_id)
        }
        Transaction::Interaction {
            simulation_id,
            learner_id,
            ..
        } => !existing
            .interactions()
            .contains((*simulation_id, *learner_id)),
    }
}

/// Streaming filter that keeps only transactions new to a result.
#[derive(Debug, Clone, Copy)]
pub struct TransactionIsNew<'a> {
    existing: &'a BenchmarkResult,
}

impl<'a> TransactionIsNew<'a> {
    /// Filter against `existing`.
    #[must_use]
    pub const fn new(existing: &'a BenchmarkResult) -> Self {
        Self { existing }
    }

    /// True if `transaction` is not yet represented in the result.
    #[must_use]
    pub fn accepts(&self, transaction: &Transaction) -> bool {
        is_new(self.existing, transaction)
    }

    /// Lazily drop the transactions already represented in the result.
    pub fn filter<I>(self, transactions: I) -> impl Iterator<Item = Transaction> + 'a
    where
        I: IntoIterator<Item = Transaction>,
        I::IntoIter: 'a,
    {
        transactions
            .into_iter()
            .filter(move |transaction| self.accepts(transaction))
    }
}
