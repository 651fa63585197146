use crate::{Error, Identity, KeyBundle, Result, StorageAdapter};
use std::sync::Arc;

/// Durable per-identity cache of key bundles.
///
/// At most one bundle is persisted per identity; a bundle that is present
/// must be reused rather than regenerated. A malformed stored entry reads as
/// absent, so the caller falls back to fresh derivation instead of failing.
pub struct KeyStore {
    storage: Arc<dyn StorageAdapter>,
}

const KEY_PREFIX: &str = "keys_";

impl KeyStore {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    fn entry_key(identity: &Identity) -> String {
        format!("{KEY_PREFIX}{identity}")
    }

    pub fn load(&self, identity: &Identity) -> Result<Option<KeyBundle>> {
        let raw = self
            .storage
            .get(&Self::entry_key(identity))
            .map_err(|e| Error::Persistence(e.to_string()))?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str::<KeyBundle>(&raw) {
            Ok(bundle) if bundle.address == *identity => Ok(Some(bundle)),
            // malformed data, or an entry bound to a different identity,
            // reads as absent
            _ => Ok(None),
        }
    }

    pub fn save(&self, identity: &Identity, bundle: &KeyBundle) -> Result<()> {
        let raw = serde_json::to_string(bundle)?;
        self.storage
            .put(&Self::entry_key(identity), raw)
            .map_err(|e| Error::Persistence(e.to_string()))
    }

    /// Remove every stored bundle. External user action, e.g. logout.
    pub fn clear(&self) -> Result<()> {
        for key in self
            .storage
            .list(KEY_PREFIX)
            .map_err(|e| Error::Persistence(e.to_string()))?
        {
            self.storage
                .del(&key)
                .map_err(|e| Error::Persistence(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{now_ms, InMemoryStorage};

    fn bundle_for(identity: &Identity) -> KeyBundle {
        KeyBundle {
            address: identity.clone(),
            secret_key: [9u8; 32],
            created_at: now_ms(),
        }
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let store = KeyStore::new(Arc::new(InMemoryStorage::new()));
        let identity = Identity::new("0x0ad3a479b31072bc14bde6aad601e4cbf13e78a8").unwrap();
        let bundle = bundle_for(&identity);

        store.save(&identity, &bundle).unwrap();
        assert_eq!(store.load(&identity).unwrap(), Some(bundle));
    }

    #[test]
    fn test_load_without_save_is_absent() {
        let store = KeyStore::new(Arc::new(InMemoryStorage::new()));
        let identity = Identity::new("0x01").unwrap();
        assert!(store.load(&identity).unwrap().is_none());
    }

    #[test]
    fn test_malformed_entry_reads_as_absent() {
        let storage = Arc::new(InMemoryStorage::new());
        let store = KeyStore::new(storage.clone());
        let identity = Identity::new("0x01").unwrap();

        storage
            .put(&KeyStore::entry_key(&identity), "{not json".to_string())
            .unwrap();
        assert!(store.load(&identity).unwrap().is_none());
    }

    #[test]
    fn test_entries_are_isolated_per_identity() {
        let store = KeyStore::new(Arc::new(InMemoryStorage::new()));
        let alice = Identity::new("0x01").unwrap();
        let bob = Identity::new("0x02").unwrap();

        store.save(&alice, &bundle_for(&alice)).unwrap();
        assert!(store.load(&bob).unwrap().is_none());
    }

    #[test]
    fn test_save_overwrites_prior_entry() {
        let store = KeyStore::new(Arc::new(InMemoryStorage::new()));
        let identity = Identity::new("0x01").unwrap();

        let first = bundle_for(&identity);
        let mut second = bundle_for(&identity);
        second.secret_key = [1u8; 32];

        store.save(&identity, &first).unwrap();
        store.save(&identity, &second).unwrap();
        assert_eq!(store.load(&identity).unwrap(), Some(second));
    }

    #[test]
    fn test_clear_removes_all_bundles() {
        let store = KeyStore::new(Arc::new(InMemoryStorage::new()));
        let identity = Identity::new("0x01").unwrap();

        store.save(&identity, &bundle_for(&identity)).unwrap();
        store.clear().unwrap();
        assert!(store.load(&identity).unwrap().is_none());
    }
}
