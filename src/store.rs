//! LMDB-backed store: environment, named databases and transaction wrappers
//!
//! One `Store` backs every collaborator interface of the crate (entity
//! hierarchy, permission records, request log, product catalog, bundle
//! discounts). All writes go through [`Store::transact`]: a single LMDB write
//! transaction that commits only when the closure returns `Ok`. LMDB admits a
//! single writer at a time, so reads performed through [`Tx`] see no
//! concurrent writes until commit.

use std::path::Path;
use std::sync::Arc;

use heed::types::{Bytes, Str, U64};
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::constants::{MAP_SIZE, MAX_DBS};
use crate::error::{err, Result};

// Database type aliases
pub type DbJson = Database<Bytes, Str>;
pub type DbU64 = Database<Str, U64<byteorder::BigEndian>>;

/// All database handles
pub struct Dbs {
    /// id -> Entity
    pub entities: DbJson,
    /// path -> id
    pub paths: DbU64,
    /// entity/key/scope -> PermissionRecord
    pub records: DbJson,
    /// id -> PermissionRequest
    pub requests: DbJson,
    /// entity/SKU -> Product
    pub products: DbJson,
    /// entity/hash -> BundleDiscount
    pub bundles: DbJson,
    /// counter name -> next value
    pub meta: DbU64,
}

/// Handle to an opened LMDB environment. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    env: Env,
    dbs: Arc<Dbs>,
}

impl Store {
    /// Open (or create) a store rooted at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(err)?;
        // SAFETY: LMDB requires no other process to open this path with different options concurrently.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(MAP_SIZE)
                .max_dbs(MAX_DBS)
                .open(path)
                .map_err(err)?
        };
        let mut tx = env.write_txn().map_err(err)?;
        let dbs = Dbs {
            entities: env.create_database(&mut tx, Some("entities")).map_err(err)?,
            paths: env.create_database(&mut tx, Some("paths")).map_err(err)?,
            records: env.create_database(&mut tx, Some("records")).map_err(err)?,
            requests: env.create_database(&mut tx, Some("requests")).map_err(err)?,
            products: env.create_database(&mut tx, Some("products")).map_err(err)?,
            bundles: env.create_database(&mut tx, Some("bundles")).map_err(err)?,
            meta: env.create_database(&mut tx, Some("meta")).map_err(err)?,
        };
        tx.commit().map_err(err)?;
        tracing::debug!(path = %path.display(), "opened store");
        Ok(Store { env, dbs: Arc::new(dbs) })
    }

    /// Execute a read-only operation
    #[inline]
    pub(crate) fn read<T, F: FnOnce(&Dbs, &RoTxn) -> Result<T>>(&self, f: F) -> Result<T> {
        f(&self.dbs, &self.env.read_txn().map_err(err)?)
    }

    /// Run multiple operations in a single write transaction
    #[inline]
    pub fn transact<T, F: FnOnce(&mut Tx<'_>) -> Result<T>>(&self, f: F) -> Result<T> {
        let mut tx = Tx {
            txn: self.env.write_txn().map_err(err)?,
            dbs: &self.dbs,
        };
        let r = f(&mut tx)?;
        tx.commit()?;
        Ok(r)
    }

    /// Clear all databases (for testing)
    pub fn clear(&self) -> Result<()> {
        self.transact(|tx| {
            let d = tx.dbs();
            d.entities.clear(tx.tx()).map_err(err)?;
            d.paths.clear(tx.tx()).map_err(err)?;
            d.records.clear(tx.tx()).map_err(err)?;
            d.requests.clear(tx.tx()).map_err(err)?;
            d.products.clear(tx.tx()).map_err(err)?;
            d.bundles.clear(tx.tx()).map_err(err)?;
            d.meta.clear(tx.tx()).map_err(err)
        })
    }
}

/// Write transaction wrapper; dropped without commit means rolled back
pub struct Tx<'s> {
    txn: RwTxn<'s>,
    dbs: &'s Dbs,
}

impl<'s> Tx<'s> {
    #[inline]
    pub(crate) fn tx(&mut self) -> &mut RwTxn<'s> {
        &mut self.txn
    }

    #[inline]
    pub(crate) fn dbs(&self) -> &'s Dbs {
        self.dbs
    }

    /// Read view of this transaction, uncommitted writes included
    #[inline]
    pub(crate) fn ro(&self) -> &RoTxn<'s> {
        &self.txn
    }

    #[inline]
    fn commit(self) -> Result<()> {
        self.txn.commit().map_err(err)
    }

    /// Allocate the next value of a named counter (starts at 1)
    pub(crate) fn next_id(&mut self, counter: &str) -> Result<u64> {
        let meta = &self.dbs.meta;
        let id = meta.get(&self.txn, counter).map_err(err)?.unwrap_or(1);
        meta.put(&mut self.txn, counter, &(id + 1)).map_err(err)?;
        Ok(id)
    }

    #[inline]
    pub(crate) fn get_json<T: DeserializeOwned>(&self, db: &DbJson, key: &[u8]) -> Result<Option<T>> {
        get_json(db, &self.txn, key)
    }

    #[inline]
    pub(crate) fn scan_json<T: DeserializeOwned>(&self, db: &DbJson, prefix: &[u8]) -> Result<Vec<T>> {
        scan_json(db, &self.txn, prefix)
    }

    #[inline]
    pub(crate) fn put_json<T: Serialize>(&mut self, db: &DbJson, key: &[u8], value: &T) -> Result<()> {
        let s = serde_json::to_string(value).map_err(err)?;
        db.put(&mut self.txn, key, &s).map_err(err)
    }

    #[inline]
    pub(crate) fn delete(&mut self, db: &DbJson, key: &[u8]) -> Result<bool> {
        db.delete(&mut self.txn, key).map_err(err)
    }
}

/// Decode a JSON value stored under `key`
pub(crate) fn get_json<T: DeserializeOwned>(db: &DbJson, tx: &RoTxn, key: &[u8]) -> Result<Option<T>> {
    match db.get(tx, key).map_err(err)? {
        Some(s) => Ok(Some(serde_json::from_str(s).map_err(err)?)),
        None => Ok(None),
    }
}

/// Decode every JSON value whose key starts with `prefix`, in key order
pub(crate) fn scan_json<T: DeserializeOwned>(db: &DbJson, tx: &RoTxn, prefix: &[u8]) -> Result<Vec<T>> {
    let mut r = Vec::new();
    for item in db.prefix_iter(tx, prefix).map_err(err)? {
        let (_, v) = item.map_err(err)?;
        r.push(serde_json::from_str(v).map_err(err)?);
    }
    Ok(r)
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
