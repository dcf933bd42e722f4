//! Version 2 → 3: batch records become packed interaction records

use serde_json::json;

use super::v1::BATCH_KIND;
use super::{fields_at, impossible, record_kind, Record};
use crate::transaction::{INTERACTION_KIND, VERSION_KIND};
use crate::value::PACKED_FIELD;
use crate::Result;

const FROM: u32 = 2;

/// Promote version 2 records to version 3.
///
/// # Errors
///
/// [`crate::Error::MigrationImpossible`] if a batch record has no key array
/// or no fields object.
pub fn promote(records: &[Record]) -> Result<Vec<Record>> {
    let mut promoted = Vec::with_capacity(records.len() + 1);
    promoted.push(json!([VERSION_KIND, 3]));

    for (position, record) in records.iter().enumerate() {
        match record_kind(record) {
            Some(VERSION_KIND) => {}
            Some(BATCH_KIND) => {
                let key = record.get(1).filter(|key| key.is_array()).cloned().ok_or_else(|| {
                    impossible(FROM, format!("batch record #{} has no key", position + 1))
                })?;
                let mut fields = fields_at(record, 2, FROM, position)?;
                if let Some(reward) = fields.shift_remove("reward") {
                    fields.insert(PACKED_FIELD.to_string(), json!({ "reward": reward }));
                }
                promoted.push(json!([INTERACTION_KIND, key, fields]));
            }
            _ => promoted.push(record.clone()),
        }
    }

    Ok(promoted)
}
