//! RocksDB-backed implementation of [`Store`].
//!
//! Unlike the teacher's two-column-family layout (`blocks` / `meta`), this
//! store's key namespace already disambiguates block, checkpoint, and
//! metadata records by prefix (§6), so a single `"store"` column family is
//! enough.

use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options};

use super::Store;
use crate::config::StoreConfig;

const CF_STORE: &str = "store";

#[derive(Debug)]
pub enum StorageError {
    RocksDb(rocksdb::Error),
    MissingColumnFamily(&'static str),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::RocksDb(e) => write!(f, "rocksdb error: {e}"),
            StorageError::MissingColumnFamily(name) => write!(f, "missing column family: {name}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::RocksDb(e)
    }
}

pub struct RocksDbStore {
    db: DB,
}

impl RocksDbStore {
    pub fn open(cfg: &StoreConfig) -> Result<Self, StorageError> {
        let path = Path::new(&cfg.path);

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        opts.create_missing_column_families(cfg.create_if_missing);

        let cfs = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new(CF_STORE, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;
        Ok(Self { db })
    }

    fn cf(&self) -> Result<std::sync::Arc<rocksdb::BoundColumnFamily<'_>>, StorageError> {
        self.db.cf_handle(CF_STORE).ok_or(StorageError::MissingColumnFamily(CF_STORE))
    }
}

impl Store for RocksDbStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let cf = self.cf().ok()?;
        self.db.get_cf(&cf, key).ok().flatten()
    }

    fn put(&self, key: &[u8], value: &[u8]) {
        match self.cf() {
            Ok(cf) => {
                if let Err(e) = self.db.put_cf(&cf, key, value) {
                    tracing::error!(error = %e, "RocksDbStore::put failed");
                }
            }
            Err(e) => tracing::error!(error = %e, "RocksDbStore::put"),
        }
    }

    fn delete(&self, key: &[u8]) {
        match self.cf() {
            Ok(cf) => {
                if let Err(e) = self.db.delete_cf(&cf, key) {
                    tracing::error!(error = %e, "RocksDbStore::delete failed");
                }
            }
            Err(e) => tracing::error!(error = %e, "RocksDbStore::delete"),
        }
    }

    fn range_iterate(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let cf = match self.cf() {
            Ok(cf) => cf,
            Err(_) => return Vec::new(),
        };
        self.db
            .iterator_cf(&cf, IteratorMode::From(prefix, rocksdb::Direction::Forward))
            .filter_map(|item| item.ok())
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect()
    }
}
