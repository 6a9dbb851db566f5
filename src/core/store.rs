//! Purpose: Process-wide store handle over RocksDB `TransactionDB`.
//! Exports: `Store`, `TxnContext`.
//! Role: Owns the engine handle, table registry, and transaction coordinator;
//! every CRUD, query, and transactional operation goes through here.
//! Invariants: Update is a read-modify-write shallow merge; outside a
//! transaction it is not safe against concurrent writers to the same key.
//! Invariants: Transactions commit or roll back as a whole; the native handle
//! is released on both paths.

use std::path::{Path, PathBuf};

use rocksdb::{
    ColumnFamilyDescriptor, DB, MultiThreaded, Options, Transaction, TransactionDB,
    TransactionDBOptions,
};
use tracing::{debug, error, info};

use crate::core::error::{Error, ErrorKind};
use crate::core::key::Key;
use crate::core::query::{SortKeyRange, scan_partition};
use crate::core::table::TableRegistry;
use crate::core::value::{Item, deserialize_attributes, serialize_attributes};

const DEFAULT_CF: &str = "default";

pub struct Store {
    path: PathBuf,
    db: TransactionDB<MultiThreaded>,
    tables: TableRegistry,
    db_options: Options,
}

fn storage_error(action: &str, table: &str, key: &Key, err: rocksdb::Error) -> Error {
    Error::new(ErrorKind::Storage)
        .with_message(action)
        .with_table(table)
        .with_storage_key(key.display_key())
        .with_source(err)
}

impl Store {
    /// Opens (or creates) the store at `path`, re-attaching every column
    /// family present on disk. Engine statistics are enabled so `/statz` can
    /// expose them to an external collector.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        info!(path = %path.display(), "opening store");

        let mut db_options = Options::default();
        db_options.create_if_missing(true);
        db_options.create_missing_column_families(true);
        db_options.enable_statistics();

        let txn_options = TransactionDBOptions::default();

        // Existing column families must be listed explicitly at open. A
        // fresh directory has none; the default family is always supplied.
        let existing = DB::list_cf(&Options::default(), &path).unwrap_or_default();
        let mut names = vec![DEFAULT_CF.to_string()];
        names.extend(existing.into_iter().filter(|name| name != DEFAULT_CF));

        let descriptors: Vec<ColumnFamilyDescriptor> = names
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db: TransactionDB<MultiThreaded> =
            TransactionDB::open_cf_descriptors(&db_options, &txn_options, &path, descriptors)
                .map_err(|err| {
                    Error::new(ErrorKind::Storage)
                        .with_message("failed to open store")
                        .with_source(err)
                })?;

        let tables = TableRegistry::new(names.into_iter().filter(|name| name != DEFAULT_CF));
        info!("store opened");
        Ok(Self {
            path,
            db,
            tables,
            db_options,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of every table resolved or discovered so far.
    pub fn tables(&self) -> Vec<String> {
        self.tables.tables()
    }

    /// Engine statistics dump, if available.
    pub fn statistics(&self) -> Option<String> {
        self.db_options.get_statistics()
    }

    pub fn put_item(&self, table: &str, item: &Item) -> Result<(), Error> {
        let cf = self.tables.resolve(&self.db, table)?;
        let payload = serialize_attributes(&item.attributes)?;
        self.db
            .put_cf(&cf, item.key.storage_key(), payload)
            .map_err(|err| storage_error("put failed", table, &item.key, err))?;
        debug!(table, key = %item.key.display_key(), "item put");
        Ok(())
    }

    pub fn get_item(&self, table: &str, key: &Key) -> Result<Option<Item>, Error> {
        let cf = self.tables.resolve(&self.db, table)?;
        let payload = self
            .db
            .get_cf(&cf, key.storage_key())
            .map_err(|err| storage_error("get failed", table, key, err))?;

        let Some(payload) = payload else {
            debug!(table, key = %key.display_key(), "item not found");
            return Ok(None);
        };

        let attributes = deserialize_attributes(&payload)?;
        debug!(table, key = %key.display_key(), "item found");
        Ok(Some(Item::new(key.clone(), attributes)))
    }

    /// Read-modify-write merge: absent key degrades to a plain put; present
    /// key keeps old attributes and overrides them with same-named new ones.
    pub fn update_item(&self, table: &str, item: &Item) -> Result<(), Error> {
        let Some(existing) = self.get_item(table, &item.key)? else {
            return self.put_item(table, item);
        };

        let mut attributes = existing.attributes;
        attributes.extend(item.attributes.clone());
        self.put_item(table, &Item::new(item.key.clone(), attributes))
    }

    pub fn delete_item(&self, table: &str, key: &Key) -> Result<(), Error> {
        let cf = self.tables.resolve(&self.db, table)?;
        self.db
            .delete_cf(&cf, key.storage_key())
            .map_err(|err| storage_error("delete failed", table, key, err))?;
        debug!(table, key = %key.display_key(), "item deleted");
        Ok(())
    }

    /// Range query over one partition; see `core::query` for the boundary
    /// and pagination semantics.
    pub fn query(
        &self,
        table: &str,
        partition_key: &str,
        limit: usize,
        range: Option<&SortKeyRange>,
    ) -> Result<Vec<Item>, Error> {
        let cf = self.tables.resolve(&self.db, table)?;
        let items = scan_partition(&self.db, &cf, partition_key, limit, range)?;
        debug!(table, partition_key, found = items.len(), "query done");
        Ok(items)
    }

    /// Runs `operations` against one native transaction. Ok commits; any
    /// error rolls back the whole batch and is re-raised. The transaction
    /// handle is released on both paths.
    pub fn execute_transaction<F>(&self, operations: F) -> Result<(), Error>
    where
        F: FnOnce(&TxnContext<'_>) -> Result<(), Error>,
    {
        let txn = self.db.transaction();
        let ctx = TxnContext {
            store: self,
            txn: &txn,
        };

        match operations(&ctx) {
            Ok(()) => {
                txn.commit().map_err(|err| {
                    Error::new(ErrorKind::Storage)
                        .with_message("transaction commit failed")
                        .with_source(err)
                })?;
                debug!("transaction committed");
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback() {
                    error!(error = %rollback_err, "transaction rollback failed");
                }
                error!(error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }

    /// Writes raw payload bytes, bypassing the attribute codec. Lets tests
    /// plant undecodable records.
    #[cfg(test)]
    pub(crate) fn put_raw(&self, table: &str, key: &Key, payload: &[u8]) -> Result<(), Error> {
        let cf = self.tables.resolve(&self.db, table)?;
        self.db
            .put_cf(&cf, key.storage_key(), payload)
            .map_err(|err| storage_error("raw put failed", table, key, err))
    }

    /// Explicit, idempotent-by-construction shutdown: dropping the store
    /// releases column family handles, the engine handle, and options in
    /// that order. Call after the server has drained in-flight work.
    pub fn close(self) {
        let table_count = self.tables.tables().len();
        info!(table_count, path = %self.path.display(), "closing store");
        drop(self);
        info!("store closed");
    }
}

/// Transaction-scoped context: put/update/delete/get routed through the
/// in-flight transaction rather than the outer handle. Reads use the
/// engine's exclusive `GetForUpdate`, so concurrent transactions touching
/// the same key serialize or abort in the engine.
pub struct TxnContext<'a> {
    store: &'a Store,
    txn: &'a Transaction<'a, TransactionDB<MultiThreaded>>,
}

impl TxnContext<'_> {
    pub fn put(&self, table: &str, item: &Item) -> Result<(), Error> {
        let cf = self.store.tables.resolve(&self.store.db, table)?;
        let payload = serialize_attributes(&item.attributes)?;
        self.txn
            .put_cf(&cf, item.key.storage_key(), payload)
            .map_err(|err| storage_error("transaction put failed", table, &item.key, err))?;
        debug!(table, key = %item.key.display_key(), "transaction put");
        Ok(())
    }

    pub fn update(&self, table: &str, item: &Item) -> Result<(), Error> {
        let Some(existing) = self.get(table, &item.key)? else {
            return self.put(table, item);
        };

        let mut attributes = existing.attributes;
        attributes.extend(item.attributes.clone());
        self.put(table, &Item::new(item.key.clone(), attributes))
    }

    pub fn delete(&self, table: &str, key: &Key) -> Result<(), Error> {
        let cf = self.store.tables.resolve(&self.store.db, table)?;
        self.txn
            .delete_cf(&cf, key.storage_key())
            .map_err(|err| storage_error("transaction delete failed", table, key, err))?;
        debug!(table, key = %key.display_key(), "transaction delete");
        Ok(())
    }

    pub fn get(&self, table: &str, key: &Key) -> Result<Option<Item>, Error> {
        let cf = self.store.tables.resolve(&self.store.db, table)?;
        let payload = self
            .txn
            .get_for_update_cf(&cf, key.storage_key(), true)
            .map_err(|err| storage_error("transaction get failed", table, key, err))?;

        let Some(payload) = payload else {
            debug!(table, key = %key.display_key(), "transaction item not found");
            return Ok(None);
        };

        let attributes = deserialize_attributes(&payload)?;
        Ok(Some(Item::new(key.clone(), attributes)))
    }
}
