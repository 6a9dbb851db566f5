//! Purpose: Pre-mutation validation of decoded operations.
//! Exports: `validate_request`, `RANGE_PLACEHOLDER`.
//! Role: Gate between decoding and execution; never touches storage.
//! Invariants: All findings across all sub-operations are collected before
//! returning; nothing short-circuits.
//! Invariants: An empty finding list means the operation may execute.

use crate::api::request::Operation;
use crate::core::key::{
    ValidationResult, validate_key, validate_partition_key, validate_sort_key,
};
use crate::core::query::SortKeyRange;

/// Stands in for an absent range boundary so absence never reads as a blank
/// sort key. Non-empty and separator-free by construction.
pub const RANGE_PLACEHOLDER: &str = "*";

/// Collects every validation finding for one decoded operation. Single-item
/// operations validate their one key; queries validate the partition key once
/// plus each boundary value as a synthetic sort key; transaction batches
/// concatenate the findings of every nested write, in operation order.
pub fn validate_request(op: &Operation) -> Vec<ValidationResult> {
    match op {
        Operation::Put { item, .. } | Operation::Update { item, .. } => validate_key(&item.key),
        Operation::Get { key, .. } | Operation::Delete { key, .. } => validate_key(key),
        Operation::Query {
            partition_key,
            range,
            ..
        } => validate_query(partition_key, range.as_ref()),
        Operation::TransactWrite { operations } => operations
            .iter()
            .flat_map(|write| validate_key(write.key()))
            .collect(),
    }
}

fn validate_query(partition_key: &str, range: Option<&SortKeyRange>) -> Vec<ValidationResult> {
    // The paired start/end checks share one partition key, so partition
    // findings are emitted once rather than per synthetic key.
    let mut findings = validate_partition_key(partition_key);

    let start = range
        .and_then(|range| range.start.as_ref())
        .map_or(RANGE_PLACEHOLDER, |boundary| boundary.value.as_str());
    let end = range
        .and_then(|range| range.end.as_ref())
        .map_or(RANGE_PLACEHOLDER, |boundary| boundary.value.as_str());
    findings.extend(validate_sort_key(start));
    findings.extend(validate_sort_key(end));

    if let Some(range) = range {
        if range.start.is_none() && range.end.is_none() {
            findings.push(ValidationResult::invalid(
                "Sort key range must have at least one boundary",
            ));
        }
    }

    findings
}
