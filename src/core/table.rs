// Logical table name -> column family resolution. Creation is serialized by
// a mutex and re-checked under it, so concurrent first use of an unseen table
// creates exactly one column family.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use rocksdb::{BoundColumnFamily, MultiThreaded, Options, TransactionDB};
use tracing::debug;

use crate::core::error::{Error, ErrorKind};

pub struct TableRegistry {
    known: Mutex<BTreeSet<String>>,
}

impl TableRegistry {
    /// Seeds the registry with the column families discovered at open.
    pub fn new(existing: impl IntoIterator<Item = String>) -> Self {
        Self {
            known: Mutex::new(existing.into_iter().collect()),
        }
    }

    /// Idempotent resolve-or-create. The handle is owned by the engine; the
    /// registry owns the creation discipline and the name list.
    pub fn resolve<'db>(
        &self,
        db: &'db TransactionDB<MultiThreaded>,
        table: &str,
    ) -> Result<Arc<BoundColumnFamily<'db>>, Error> {
        if let Some(cf) = db.cf_handle(table) {
            return Ok(cf);
        }

        let mut known = self.known.lock().unwrap_or_else(PoisonError::into_inner);
        // Re-check under the lock: another caller may have created the
        // column family between the fast path and lock acquisition.
        if db.cf_handle(table).is_none() {
            db.create_cf(table, &Options::default()).map_err(|err| {
                Error::new(ErrorKind::Storage)
                    .with_message("failed to create column family")
                    .with_table(table)
                    .with_source(err)
            })?;
            debug!(table, "column family created");
        }
        known.insert(table.to_string());

        db.cf_handle(table).ok_or_else(|| {
            Error::new(ErrorKind::Internal)
                .with_message("column family missing after creation")
                .with_table(table)
        })
    }

    /// Names of every table resolved or discovered so far.
    pub fn tables(&self) -> Vec<String> {
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}
