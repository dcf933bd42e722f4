//! Schema migration for transaction logs
//!
//! Logs written under an older schema are upgraded one version at a time.
//! Each step is a pure function over the full record sequence, because some
//! steps regroup records (per-seed simulations, batch accumulation) and cannot
//! be expressed as a per-record map.
//!
//! ```text
//! v0 ──v1::promote──> v1 ──v2::promote──> v2 ──v3::promote──> v3 (current)
//! ```
//!
//! A log without a leading `["version", n]` record is version 0 when its
//! records use the nested version 0 layout, and current otherwise.

pub mod v1;
pub mod v2;
pub mod v3;

use serde_json::{Map, Value as Json};
use tracing::debug;

use crate::transaction::VERSION_KIND;
use crate::{Error, Result};

/// Schema version written by this crate.
pub const CURRENT_VERSION: u32 = 3;

/// A raw wire record (a JSON array whose first element is the kind tag).
pub type Record = Json;

type Step = fn(&[Record]) -> Result<Vec<Record>>;

/// `STEPS[v]` promotes version `v` to `v + 1`.
const STEPS: [Step; CURRENT_VERSION as usize] = [v1::promote, v2::promote, v3::promote];

/// Outcome of [`promote`].
#[derive(Debug, Clone, PartialEq)]
pub enum Promotion {
    /// The records are already at [`CURRENT_VERSION`]; nothing to rewrite.
    Current,
    /// The records were upgraded.
    Upgraded {
        /// Version the input was written under
        from: u32,
        /// Equivalent records at [`CURRENT_VERSION`]
        records: Vec<Record>,
    },
}

/// Schema version of a record sequence.
///
/// A leading `["version", n]` record wins. Without one, the sequence is
/// version 0 if any record nests its payload as `[kind, [_, {fields}]]`, and
/// current otherwise (an unversioned log already written in today's shape).
///
/// # Errors
///
/// [`Error::MalformedRecord`] if the leading version record has no usable number.
pub fn detect_version(records: &[Record]) -> Result<u32> {
    let Some(first) = records.first() else {
        return Ok(CURRENT_VERSION);
    };

    if record_kind(first) != Some(VERSION_KIND) {
        let legacy = records.iter().any(is_v0_shaped);
        return Ok(if legacy { 0 } else { CURRENT_VERSION });
    }

    first
        .get(1)
        .and_then(Json::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| Error::MalformedRecord {
            record: 1,
            reason: format!("version record must carry a non-negative integer, got {first}"),
        })
}

fn is_v0_shaped(record: &Record) -> bool {
    record
        .get(1)
        .and_then(|nested| nested.get(1))
        .is_some_and(Json::is_object)
}

/// Upgrade a record sequence to [`CURRENT_VERSION`].
///
/// # Errors
///
/// [`Error::MigrationImpossible`] if a step cannot be computed from the
/// records, or if the log declares a version newer than this crate supports.
pub fn promote(records: &[Record]) -> Result<Promotion> {
    let from = detect_version(records)?;

    if from == CURRENT_VERSION || records.is_empty() {
        return Ok(Promotion::Current);
    }

    if from > CURRENT_VERSION {
        return Err(Error::MigrationImpossible {
            from,
            to: CURRENT_VERSION,
            reason: "the log was written by a newer schema than this reader supports".to_string(),
        });
    }

    let mut promoted = STEPS[from as usize](records)?;
    debug!(from, to = from + 1, records = promoted.len(), "promoted transaction records");

    for version in from + 1..CURRENT_VERSION {
        promoted = STEPS[version as usize](&promoted)?;
        debug!(
            from = version,
            to = version + 1,
            records = promoted.len(),
            "promoted transaction records"
        );
    }

    Ok(Promotion::Upgraded {
        from,
        records: promoted,
    })
}

/// Kind tag of a record, if it has one.
pub(crate) fn record_kind(record: &Record) -> Option<&str> {
    record.get(0).and_then(Json::as_str)
}

pub(crate) fn impossible(from: u32, reason: impl Into<String>) -> Error {
    Error::MigrationImpossible {
        from,
        to: from + 1,
        reason: reason.into(),
    }
}

/// The fields object at `record[slot]`.
pub(crate) fn fields_at(
    record: &Record,
    slot: usize,
    from: u32,
    position: usize,
) -> Result<Map<String, Json>> {
    record
        .get(slot)
        .and_then(Json::as_object)
        .cloned()
        .ok_or_else(|| {
            impossible(
                from,
                format!("record #{} has no fields object: {record}", position + 1),
            )
        })
}
