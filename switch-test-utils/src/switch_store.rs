//! [`InMemorySwitchStore`]: a [`SwitchStore`] backed by a plain
//! `HashMap`, sufficient for unit and scenario tests that don't need
//! durability across a process restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use switch_types::error::SwitchError;
use switch_types::ids::SwitchId;
use switch_types::store::SwitchStore;
use switch_types::switch::Switch;

/// An in-memory [`SwitchStore`]. Table-level operations (`insert`,
/// `list_ids`) take the outer lock only long enough to touch the map;
/// `update` takes only the per-row lock once the row's `Arc` has been
/// cloned out, mirroring the table-lock/row-lock split described in §5.
#[derive(Clone, Default)]
pub struct InMemorySwitchStore {
    table: Arc<Mutex<HashMap<SwitchId, Arc<Mutex<Switch>>>>>,
}

impl InMemorySwitchStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SwitchStore for InMemorySwitchStore {
    async fn insert(&self, switch: Switch) -> Result<(), SwitchError> {
        let mut table = self.table.lock();
        if table.contains_key(&switch.id()) {
            return Err(SwitchError::StateConflict(format!(
                "switch {} already enrolled",
                switch.id()
            )));
        }
        table.insert(switch.id(), Arc::new(Mutex::new(switch)));
        Ok(())
    }

    async fn get(&self, id: SwitchId) -> Result<Option<Switch>, SwitchError> {
        let row = self.table.lock().get(&id).cloned();
        Ok(row.map(|row| row.lock().clone()))
    }

    async fn update(
        &self,
        id: SwitchId,
        f: Box<dyn FnOnce(&mut Switch) -> Result<(), SwitchError> + Send + '_>,
    ) -> Result<(), SwitchError> {
        let row = self.table.lock().get(&id).cloned().ok_or_else(|| {
            SwitchError::StateConflict(format!("no such switch {id}"))
        })?;
        let mut switch = row.lock();
        f(&mut switch)
    }

    async fn list_ids(&self) -> Result<Vec<SwitchId>, SwitchError> {
        Ok(self.table.lock().keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::time::{Duration, SystemTime};
    use switch_core::schnorr::PrivateKey;
    use switch_types::switch::ThresholdParams;

    fn new_switch() -> Switch {
        let key = PrivateKey::generate(&mut rand::rngs::StdRng::from_seed([2u8; 32]));
        Switch::new(
            uuid::Uuid::new_v4(),
            vec![0u8; 8],
            ThresholdParams::new(3, 2).unwrap(),
            Duration::from_secs(3600),
            SystemTime::UNIX_EPOCH,
            Vec::new(),
            key.public_key(),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn insert_then_get_roundtrips() {
        let store = InMemorySwitchStore::new();
        let switch = new_switch();
        let id = switch.id();
        store.insert(switch).await.unwrap();
        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.id(), id);
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let store = InMemorySwitchStore::new();
        let switch = new_switch();
        let again = switch.clone();
        store.insert(switch).await.unwrap();
        assert!(store.insert(again).await.is_err());
    }

    #[tokio::test]
    async fn update_mutates_the_stored_row() {
        let store = InMemorySwitchStore::new();
        let switch = new_switch();
        let id = switch.id();
        store.insert(switch).await.unwrap();

        store
            .update(
                id,
                Box::new(|s| {
                    s.refresh(SystemTime::UNIX_EPOCH + Duration::from_secs(1))
                }),
            )
            .await
            .unwrap();

        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(
            fetched.deadline(),
            SystemTime::UNIX_EPOCH + Duration::from_secs(1) + Duration::from_secs(3600)
        );
    }
}
