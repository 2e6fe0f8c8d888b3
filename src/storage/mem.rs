//! In-memory implementation of [`Store`], useful for tests and devnets.

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::Store;

#[derive(Default)]
pub struct InMemoryStore {
    values: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for InMemoryStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.values.lock().expect("store lock poisoned").get(key).cloned()
    }

    fn put(&self, key: &[u8], value: &[u8]) {
        self.values
            .lock()
            .expect("store lock poisoned")
            .insert(key.to_vec(), value.to_vec());
    }

    fn delete(&self, key: &[u8]) {
        self.values.lock().expect("store lock poisoned").remove(key);
    }

    fn range_iterate(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.values
            .lock()
            .expect("store lock poisoned")
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_get_roundtrip() {
        let store = InMemoryStore::new();
        store.put(b"metadata-chain-height", b"5");
        assert_eq!(store.get(b"metadata-chain-height"), Some(b"5".to_vec()));
    }

    #[test]
    fn range_iterate_is_scoped_to_prefix() {
        let store = InMemoryStore::new();
        store.put(b"block-1", b"a");
        store.put(b"block-2", b"b");
        store.put(b"checkpoint-1-hash", b"c");

        let blocks = store.range_iterate(b"block-");
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn delete_removes_key() {
        let store = InMemoryStore::new();
        store.put(b"k", b"v");
        store.delete(b"k");
        assert!(store.get(b"k").is_none());
    }
}
