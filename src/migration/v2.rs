//! Version 1 → 2: one simulation per seed, one batch record per pair
//!
//! Version 1 logged a simulation once and tagged every batch with the seed it
//! ran under. Version 2 gives each (simulation, seed) its own simulation id,
//! `n_seeds * simulation_id + rank`, where `rank` is the order in which the
//! seed first appeared for that simulation. Per-batch records collapse into a
//! single record of `N` and `reward` lists per (simulation, learner).

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::{json, Map, Value as Json};
use tracing::{debug, warn};

use super::v1::BATCH_KIND;
use super::{fields_at, impossible, record_kind, Record};
use crate::transaction::{BENCHMARK_KIND, LEARNER_KIND, SIMULATION_KIND, VERSION_KIND};
use crate::Result;

const FROM: u32 = 1;

/// Benchmark metadata keys with no meaning after this step.
const RETIRED_BENCHMARK_KEYS: [&str; 3] = ["n_seeds", "batcher", "ignore_first"];

#[derive(Debug, Default)]
struct Accumulator {
    n: Vec<Json>,
    reward: Vec<Json>,
}

#[derive(Debug, Default)]
struct Regrouping {
    n_seeds: Option<i64>,
    simulations: HashMap<i64, Map<String, Json>>,
    seeds: HashMap<i64, Vec<Json>>,
    batch_counts: HashMap<i64, usize>,
    pending: IndexMap<(i64, i64), Accumulator>,
}

/// Promote version 1 records to version 2.
///
/// # Errors
///
/// [`crate::Error::MigrationImpossible`] if a batch arrives before `n_seeds`
/// is known, refers to a simulation that was never logged, or its simulation
/// has no `batch_count`.
pub fn promote(records: &[Record]) -> Result<Vec<Record>> {
    let mut promoted = vec![json!([VERSION_KIND, 2])];
    let mut state = Regrouping::default();

    for (position, record) in records.iter().enumerate() {
        match record_kind(record) {
            Some(BENCHMARK_KIND) => {
                let mut metadata = fields_at(record, 1, FROM, position)?;
                state.n_seeds = metadata.get("n_seeds").and_then(Json::as_i64);
                for key in RETIRED_BENCHMARK_KEYS {
                    metadata.shift_remove(key);
                }
                promoted.push(json!([BENCHMARK_KIND, metadata]));
            }
            Some(LEARNER_KIND) => promoted.push(record.clone()),
            Some(SIMULATION_KIND) => {
                let id = integer_at(record, 1, position)?;
                let fields = fields_at(record, 2, FROM, position)?;
                state.simulations.insert(id, fields);
            }
            Some(BATCH_KIND) => state.batch(record, position, &mut promoted)?,
            Some(VERSION_KIND) => {}
            kind => debug!(?kind, position, "dropping record during v1 -> v2 promotion"),
        }
    }

    for (simulation_id, learner_id) in state.pending.keys() {
        warn!(
            simulation_id,
            learner_id, "dropping incomplete batch accumulation during v1 -> v2 promotion"
        );
    }

    Ok(promoted)
}

impl Regrouping {
    fn batch(&mut self, record: &Record, position: usize, out: &mut Vec<Record>) -> Result<()> {
        let key = record
            .get(1)
            .and_then(Json::as_array)
            .filter(|key| key.len() == 4)
            .ok_or_else(|| {
                impossible(
                    FROM,
                    format!("batch record #{} has no 4-part key: {record}", position + 1),
                )
            })?;
        let simulation_id = key_part(&key[0], position)?;
        let learner_id = key_part(&key[1], position)?;
        let seed = &key[2];
        let batch_index = key_part(&key[3], position)?;
        let fields = fields_at(record, 2, FROM, position)?;

        let n_seeds = self.n_seeds.filter(|n| *n > 0).ok_or_else(|| {
            impossible(
                FROM,
                format!(
                    "batch record #{} arrived without a positive 'n_seeds' in the benchmark record",
                    position + 1
                ),
            )
        })?;

        let seeds = self.seeds.entry(simulation_id).or_default();
        let rank = match seeds.iter().position(|s| s == seed) {
            Some(rank) => rank,
            None => {
                seeds.push(seed.clone());
                seeds.len() - 1
            }
        };

        let rank = i64::try_from(rank).unwrap_or(i64::MAX);
        if rank >= n_seeds {
            return Err(impossible(
                FROM,
                format!(
                    "simulation {simulation_id} ran under more than {n_seeds} seeds (record #{})",
                    position + 1
                ),
            ));
        }
        let new_id = n_seeds
            .checked_mul(simulation_id)
            .and_then(|id| id.checked_add(rank))
            .ok_or_else(|| {
                impossible(
                    FROM,
                    format!(
                        "simulation {simulation_id} under {n_seeds} seeds overflows the id range (record #{})",
                        position + 1
                    ),
                )
            })?;

        if !self.batch_counts.contains_key(&new_id) {
            let mut simulation = self.simulations.get(&simulation_id).cloned().ok_or_else(|| {
                impossible(
                    FROM,
                    format!(
                        "batch record #{} refers to simulation {simulation_id}, which was never logged",
                        position + 1
                    ),
                )
            })?;

            let batch_count = simulation
                .get("batch_count")
                .and_then(Json::as_u64)
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| {
                    impossible(
                        FROM,
                        format!("simulation {simulation_id} has no 'batch_count'"),
                    )
                })?;

            simulation.insert("source".to_string(), json!(simulation_id.to_string()));
            simulation.insert(
                "filters".to_string(),
                json!(format!("[{{\"Shuffle\":{seed}}}]")),
            );

            self.batch_counts.insert(new_id, batch_count);
            out.push(json!([SIMULATION_KIND, new_id, simulation]));
        }

        let slot = (new_id, learner_id);
        if batch_index == 0 {
            self.pending.insert(slot, Accumulator::default());
        }

        let accumulator = self.pending.entry(slot).or_default();
        accumulator.n.push(fields.get("N").cloned().unwrap_or(Json::Null));
        accumulator
            .reward
            .push(fields.get("reward").cloned().unwrap_or(Json::Null));

        let complete = self
            .batch_counts
            .get(&new_id)
            .is_some_and(|count| accumulator.n.len() == *count);

        if complete {
            if let Some(done) = self.pending.shift_remove(&slot) {
                out.push(json!([
                    BATCH_KIND,
                    [new_id, learner_id],
                    {"N": done.n, "reward": done.reward}
                ]));
            }
        }

        Ok(())
    }
}

fn integer_at(record: &Record, slot: usize, position: usize) -> Result<i64> {
    record.get(slot).and_then(Json::as_i64).ok_or_else(|| {
        impossible(
            FROM,
            format!("record #{} has a non-integer key: {record}", position + 1),
        )
    })
}

fn key_part(part: &Json, position: usize) -> Result<i64> {
    part.as_i64().ok_or_else(|| {
        impossible(
            FROM,
            format!("batch record #{} has a non-integer key part: {part}", position + 1),
        )
    })
}
