//! Purpose: Sort-key range model and the partition range scan.
//! Exports: `BoundaryKind`, `RangeBoundary`, `SortKeyRange`, `scan_partition`.
//! Invariants: Results are byte-lexicographic by sort key, materialized, and
//! bounded by `limit`; the engine holds no cursor state between calls.
//! Invariants: An Inclusive start is a byte-wise greater-or-equal seek, not a
//! prefix filter; callers wanting prefix semantics pass true prefixes.

use std::sync::Arc;

use rocksdb::{BoundColumnFamily, MultiThreaded, TransactionDB};
use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::key::{Key, partition_prefix, sort_key_after_prefix};
use crate::core::value::{Item, deserialize_attributes};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryKind {
    Inclusive,
    Exclusive,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RangeBoundary {
    pub value: String,
    pub kind: BoundaryKind,
}

impl RangeBoundary {
    pub fn inclusive(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: BoundaryKind::Inclusive,
        }
    }

    pub fn exclusive(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: BoundaryKind::Exclusive,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SortKeyRange {
    pub start: Option<RangeBoundary>,
    pub end: Option<RangeBoundary>,
}

impl SortKeyRange {
    pub fn between(start: RangeBoundary, end: RangeBoundary) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn from(start: RangeBoundary) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn to(end: RangeBoundary) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }
}

/// Forward scan over one partition's key space.
///
/// Seeks to `prefix + start.value` (or the bare prefix), skips the exact
/// match for an Exclusive start, then accumulates items while the storage key
/// still carries the partition prefix and `limit` is not reached. End
/// boundaries stop the scan: past the value for Inclusive, at the value for
/// Exclusive. Pagination is caller-driven via an Exclusive start equal to the
/// last sort key of the previous page.
pub(crate) fn scan_partition(
    db: &TransactionDB<MultiThreaded>,
    cf: &Arc<BoundColumnFamily<'_>>,
    partition_key: &str,
    limit: usize,
    range: Option<&SortKeyRange>,
) -> Result<Vec<Item>, Error> {
    let prefix = partition_prefix(partition_key);
    let start = range.and_then(|range| range.start.as_ref());
    let end = range.and_then(|range| range.end.as_ref());

    let mut seek_key = prefix.clone();
    if let Some(start) = start {
        seek_key.extend_from_slice(start.value.as_bytes());
    }

    let mut iter = db.raw_iterator_cf(cf);
    iter.seek(&seek_key);

    if let Some(start) = start {
        // Exclusive start skips the exact match only; a seek that landed past
        // the boundary value is already where scanning should begin.
        if start.kind == BoundaryKind::Exclusive
            && iter.valid()
            && iter.key() == Some(seek_key.as_slice())
        {
            iter.next();
        }
    }

    let mut items = Vec::new();
    while iter.valid() && items.len() < limit {
        let Some(storage_key) = iter.key() else {
            break;
        };
        let Some(sort_key) = sort_key_after_prefix(storage_key, &prefix) else {
            // Left the partition's prefixed key space.
            break;
        };
        if let Some(end) = end {
            if sort_key > end.value.as_str() {
                break;
            }
            if end.kind == BoundaryKind::Exclusive && sort_key == end.value {
                break;
            }
        }

        let sort_key = sort_key.to_string();
        let attributes = deserialize_attributes(iter.value().unwrap_or_default())?;
        items.push(Item::new(Key::new(partition_key, sort_key), attributes));
        iter.next();
    }

    Ok(items)
}
