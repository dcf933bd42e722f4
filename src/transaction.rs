//! Transactions: the records folded into a [`BenchmarkResult`](crate::result::BenchmarkResult)
//!
//! ## Wire format
//!
//! ```text
//! ["version", 3]
//! ["benchmark", {"n_learners": 2, "n_simulations": 1}]
//! ["L", 0, {"full_name": "UCB(alpha=0.5)", "family": "UCB", "alpha": 0.5}]
//! ["S", 0, {"source": "covtype", "shuffle": "1", "take": "None", "pipe": "..."}]
//! ["I", [0, 0], {"N": 5, "_packed": {"reward": [1, 0, 1]}}]
//! ```
//!
//! Build transactions with the factory functions in this module; they are
//! the only shapes the log writer accepts.

use std::fmt::Write as _;

use serde_json::json;

use crate::migration::CURRENT_VERSION;
use crate::value::{
    fields_from_json, fields_to_json, packed_to_json, take_packed, Fields, Packed, Value,
    PACKED_FIELD,
};

/// Kind tag of the version record.
pub const VERSION_KIND: &str = "version";
/// Kind tag of the benchmark metadata record.
pub const BENCHMARK_KIND: &str = "benchmark";
/// Kind tag of learner records.
pub const LEARNER_KIND: &str = "L";
/// Kind tag of simulation records.
pub const SIMULATION_KIND: &str = "S";
/// Kind tag of interaction records.
pub const INTERACTION_KIND: &str = "I";

/// One atomic, self-describing store record.
#[derive(Debug, Clone, PartialEq)]
pub enum Transaction {
    /// Schema version of the log
    Version(u32),
    /// Free-form benchmark metadata
    Benchmark(Fields),
    /// Learner metadata row
    Learner {
        /// Learner primary key
        learner_id: i64,
        /// Flat columns
        fields: Fields,
        /// Packed columns
        packed: Option<Packed>,
    },
    /// Simulation metadata row
    Simulation {
        /// Simulation primary key
        simulation_id: i64,
        /// Flat columns
        fields: Fields,
        /// Packed columns
        packed: Option<Packed>,
    },
    /// Per-interaction outcomes of one learner on one simulation
    Interaction {
        /// Simulation half of the key
        simulation_id: i64,
        /// Learner half of the key
        learner_id: i64,
        /// Flat columns
        fields: Fields,
        /// Packed columns
        packed: Option<Packed>,
    },
}

/// `["version", n]`, defaulting to the current schema version when `n` is `None`.
#[must_use]
pub fn version_record(version: Option<u32>) -> Transaction {
    Transaction::Version(version.unwrap_or(CURRENT_VERSION))
}

/// `["benchmark", {n_learners, n_simulations}]`.
#[must_use]
pub fn benchmark_record(n_learners: usize, n_simulations: usize) -> Transaction {
    let mut metadata = Fields::new();
    metadata.insert("n_learners".to_string(), count_value(n_learners));
    metadata.insert("n_simulations".to_string(), count_value(n_simulations));
    Transaction::Benchmark(metadata)
}

/// `["L", learner_id, fields]`.
#[must_use]
pub fn learner_record(learner_id: i64, fields: Fields) -> Transaction {
    Transaction::Learner {
        learner_id,
        fields,
        packed: None,
    }
}

/// `["S", simulation_id, fields]`.
#[must_use]
pub fn simulation_record(simulation_id: i64, fields: Fields) -> Transaction {
    Transaction::Simulation {
        simulation_id,
        fields,
        packed: None,
    }
}

/// `["I", [simulation_id, learner_id], fields + {_packed: packed}]`.
#[must_use]
pub fn interaction_record(
    simulation_id: i64,
    learner_id: i64,
    fields: Fields,
    packed: Option<Packed>,
) -> Transaction {
    Transaction::Interaction {
        simulation_id,
        learner_id,
        fields,
        packed,
    }
}

/// Description of a learner as the execution engine knows it.
#[derive(Debug, Clone, Default)]
pub struct LearnerInfo {
    /// Learner family, e.g. `"UCB"`
    pub family: String,
    /// Hyperparameters, rendered into `full_name` and stored as columns
    pub params: Fields,
}

/// Description of a simulation pipeline as the execution engine knows it.
#[derive(Debug, Clone, Default)]
pub struct SimulationInfo {
    /// Source name
    pub source: String,
    /// Shuffle seed, if the pipeline shuffles
    pub shuffle: Option<u64>,
    /// Take count, if the pipeline truncates
    pub take: Option<u64>,
    /// Rendered pipeline
    pub pipe: String,
}

/// Learner records numbered by position, with `full_name` rendered as `family(k=v,...)`.
pub fn learner_records(learners: &[LearnerInfo]) -> impl Iterator<Item = Transaction> + '_ {
    learners.iter().zip(0_i64..).map(|(learner, learner_id)| {
        let mut full_name = learner.family.clone();
        if !learner.params.is_empty() {
            full_name.push('(');
            for (i, (k, v)) in learner.params.iter().enumerate() {
                if i > 0 {
                    full_name.push(',');
                }
                let _ = write!(full_name, "{k}={v}");
            }
            full_name.push(')');
        }

        let mut fields = Fields::with_capacity(learner.params.len() + 2);
        fields.insert("full_name".to_string(), Value::Text(full_name));
        fields.insert("family".to_string(), Value::Text(learner.family.clone()));
        fields.extend(learner.params.iter().map(|(k, v)| (k.clone(), v.clone())));

        learner_record(learner_id, fields)
    })
}

/// Simulation records numbered by position.
pub fn simulation_records(
    simulations: &[SimulationInfo],
) -> impl Iterator<Item = Transaction> + '_ {
    fn rendered(value: Option<u64>) -> Value {
        Value::Text(value.map_or_else(|| "None".to_string(), |v| v.to_string()))
    }

    simulations
        .iter()
        .zip(0_i64..)
        .map(|(simulation, simulation_id)| {
            let mut fields = Fields::with_capacity(4);
            fields.insert("source".to_string(), Value::Text(simulation.source.clone()));
            fields.insert("shuffle".to_string(), rendered(simulation.shuffle));
            fields.insert("take".to_string(), rendered(simulation.take));
            fields.insert("pipe".to_string(), Value::Text(simulation.pipe.clone()));
            simulation_record(simulation_id, fields)
        })
}

fn count_value(n: usize) -> Value {
    Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

impl Transaction {
    /// Kind tag as written on the wire.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Version(_) => VERSION_KIND,
            Self::Benchmark(_) => BENCHMARK_KIND,
            Self::Learner { .. } => LEARNER_KIND,
            Self::Simulation { .. } => SIMULATION_KIND,
            Self::Interaction { .. } => INTERACTION_KIND,
        }
    }

    /// Encode as a wire record (a JSON array).
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Version(version) => json!([VERSION_KIND, version]),
            Self::Benchmark(metadata) => json!([BENCHMARK_KIND, fields_to_json(metadata)]),
            Self::Learner {
                learner_id,
                fields,
                packed,
            } => json!([LEARNER_KIND, learner_id, wire_fields(fields, packed.as_ref())]),
            Self::Simulation {
                simulation_id,
                fields,
                packed,
            } => json!([
                SIMULATION_KIND,
                simulation_id,
                wire_fields(fields, packed.as_ref())
            ]),
            Self::Interaction {
                simulation_id,
                learner_id,
                fields,
                packed,
            } => json!([
                INTERACTION_KIND,
                [simulation_id, learner_id],
                wire_fields(fields, packed.as_ref())
            ]),
        }
    }

    /// Decode a wire record of the current schema.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the record is not one of the
    /// five recognized shapes.
    pub fn from_json(record: serde_json::Value) -> std::result::Result<Self, String> {
        let serde_json::Value::Array(items) = record else {
            return Err(format!("expected a JSON array, got {record}"));
        };
        let mut items = items.into_iter();

        let kind = match items.next() {
            Some(serde_json::Value::String(kind)) => kind,
            other => return Err(format!("expected a string kind tag, got {other:?}")),
        };

        let transaction = match kind.as_str() {
            VERSION_KIND => {
                let version = items
                    .next()
                    .and_then(|v| v.as_u64())
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or("version record must carry a non-negative integer")?;
                Self::Version(version)
            }
            BENCHMARK_KIND => Self::Benchmark(object(items.next(), "benchmark metadata")?),
            LEARNER_KIND => {
                let learner_id = integer(items.next(), "learner_id")?;
                let (fields, packed) = split_fields(object(items.next(), "learner fields")?)?;
                Self::Learner {
                    learner_id,
                    fields,
                    packed,
                }
            }
            SIMULATION_KIND => {
                let simulation_id = integer(items.next(), "simulation_id")?;
                let (fields, packed) = split_fields(object(items.next(), "simulation fields")?)?;
                Self::Simulation {
                    simulation_id,
                    fields,
                    packed,
                }
            }
            INTERACTION_KIND => {
                let key = match items.next() {
                    Some(serde_json::Value::Array(key)) if key.len() == 2 => key,
                    other => {
                        return Err(format!(
                            "interaction key must be [simulation_id, learner_id], got {other:?}"
                        ))
                    }
                };
                let mut key = key.into_iter();
                let simulation_id = integer(key.next(), "simulation_id")?;
                let learner_id = integer(key.next(), "learner_id")?;
                let (fields, packed) =
                    split_fields(object(items.next(), "interaction fields")?)?;
                Self::Interaction {
                    simulation_id,
                    learner_id,
                    fields,
                    packed,
                }
            }
            other => return Err(format!("unrecognized transaction kind '{other}'")),
        };

        if items.next().is_some() {
            return Err(format!("trailing elements in '{kind}' record"));
        }

        Ok(transaction)
    }
}

fn wire_fields(fields: &Fields, packed: Option<&Packed>) -> serde_json::Value {
    let mut map = fields_to_json(fields);
    if let Some(packed) = packed {
        map.insert(PACKED_FIELD.to_string(), packed_to_json(packed));
    }
    serde_json::Value::Object(map)
}

fn integer(value: Option<serde_json::Value>, what: &str) -> std::result::Result<i64, String> {
    value
        .as_ref()
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| format!("{what} must be an integer, got {value:?}"))
}

fn object(value: Option<serde_json::Value>, what: &str) -> std::result::Result<Fields, String> {
    match value {
        Some(serde_json::Value::Object(map)) => Ok(fields_from_json(map)),
        other => Err(format!("{what} must be an object, got {other:?}")),
    }
}

fn split_fields(mut fields: Fields) -> std::result::Result<(Fields, Option<Packed>), String> {
    let packed = take_packed(&mut fields)?;
    Ok((fields, packed))
}
