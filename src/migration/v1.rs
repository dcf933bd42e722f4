//! Version 0 → 1: primary keys move out of the field maps
//!
//! Version 0 nested every payload as `[kind, [<unused>, {fields}]]`, with the
//! primary key stored among the fields. Version 1 writes `[kind, key, {fields}]`.
//! Batch rewards were statistic objects (`{"estimate": ...}`); they become
//! plain numbers rounded to five decimals.

use serde_json::{json, Map, Value as Json};
use tracing::debug;

use super::{fields_at, impossible, record_kind, Record};
use crate::transaction::{BENCHMARK_KIND, LEARNER_KIND, SIMULATION_KIND, VERSION_KIND};
use crate::Result;

const FROM: u32 = 0;

/// Kind tag of per-batch reward records (versions 0 to 2).
pub const BATCH_KIND: &str = "B";

/// Key columns of a version 1 batch record, in key order.
pub const BATCH_KEY_COLUMNS: [&str; 4] = ["simulation_id", "learner_id", "seed", "batch_index"];

/// Promote version 0 records to version 1.
///
/// # Errors
///
/// [`crate::Error::MigrationImpossible`] if a record lacks its key columns or
/// a batch record has no reward.
pub fn promote(records: &[Record]) -> Result<Vec<Record>> {
    let mut promoted = Vec::with_capacity(records.len() + 1);
    promoted.push(json!([VERSION_KIND, 1]));

    for (position, record) in records.iter().enumerate() {
        match record_kind(record) {
            Some(LEARNER_KIND) => {
                promoted.push(move_key(record, LEARNER_KIND, "learner_id", position)?);
            }
            Some(SIMULATION_KIND) => {
                promoted.push(move_key(record, SIMULATION_KIND, "simulation_id", position)?);
            }
            Some(BATCH_KIND) => promoted.push(promote_batch(record, position)?),
            Some(BENCHMARK_KIND) => promoted.push(promote_benchmark(record, position)?),
            kind => debug!(?kind, position, "dropping record during v0 -> v1 promotion"),
        }
    }

    Ok(promoted)
}

fn payload(record: &Record, position: usize) -> Result<Map<String, Json>> {
    record
        .get(1)
        .and_then(|nested| nested.get(1))
        .and_then(Json::as_object)
        .cloned()
        .ok_or_else(|| {
            impossible(
                FROM,
                format!("record #{} is not [kind, [_, {{fields}}]]: {record}", position + 1),
            )
        })
}

fn take_column(
    fields: &mut Map<String, Json>,
    column: &str,
    position: usize,
) -> Result<Json> {
    fields.shift_remove(column).ok_or_else(|| {
        impossible(
            FROM,
            format!("record #{} has no '{column}' field", position + 1),
        )
    })
}

fn move_key(record: &Record, kind: &str, key_column: &str, position: usize) -> Result<Record> {
    let mut fields = payload(record, position)?;
    let key = take_column(&mut fields, key_column, position)?;

    if !key.is_i64() {
        return Err(impossible(
            FROM,
            format!("record #{} has a non-integer '{key_column}': {key}", position + 1),
        ));
    }

    Ok(json!([kind, key, fields]))
}

fn promote_batch(record: &Record, position: usize) -> Result<Record> {
    let mut fields = payload(record, position)?;

    let key = BATCH_KEY_COLUMNS
        .iter()
        .map(|column| take_column(&mut fields, column, position))
        .collect::<Result<Vec<_>>>()?;

    if let Some(raw) = fields.get("reward").cloned() {
        fields.insert("reward".to_string(), estimate(&raw, position)?);
    }
    if let Some(raw) = fields.shift_remove("mean_reward") {
        fields.insert("reward".to_string(), estimate(&raw, position)?);
    }

    let reward = fields
        .get("reward")
        .and_then(Json::as_f64)
        .ok_or_else(|| impossible(FROM, format!("batch record #{} has no reward", position + 1)))?;
    fields.insert("reward".to_string(), json!(round5(reward)));

    Ok(json!([BATCH_KIND, key, fields]))
}

fn promote_benchmark(record: &Record, position: usize) -> Result<Record> {
    let metadata = match record.get(1) {
        Some(Json::Object(map)) => map.clone(),
        Some(nested @ Json::Array(_)) => fields_at(nested, 1, FROM, position)?,
        _ => {
            return Err(impossible(
                FROM,
                format!("benchmark record #{} has no metadata: {record}", position + 1),
            ))
        }
    };

    Ok(json!([BENCHMARK_KIND, metadata]))
}

/// A reward statistic is either a bare number or an object with an `estimate`.
fn estimate(raw: &Json, position: usize) -> Result<Json> {
    raw.as_f64()
        .or_else(|| raw.get("estimate").and_then(Json::as_f64))
        .map(|v| json!(v))
        .ok_or_else(|| {
            impossible(
                FROM,
                format!("batch record #{} has an unreadable reward: {raw}", position + 1),
            )
        })
}

fn round5(value: f64) -> f64 {
    (value * 1e5).round() / 1e5
}
