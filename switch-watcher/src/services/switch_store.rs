//! The production switch table.
//!
//! [`DashMapSwitchStore`] is the default, in-process implementation:
//! sufficient for a single watcher instance that does not need to
//! survive a process restart. With the `postgres` feature enabled,
//! [`postgres::PostgresSwitchStore`] persists the same rows durably.
//!
//! Both implement [`SwitchStore`] and are interchangeable from
//! `services::release_fsm` and `services::timer`'s point of view.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use switch_types::error::SwitchError;
use switch_types::ids::SwitchId;
use switch_types::store::SwitchStore;
use switch_types::switch::Switch;
use tokio::sync::Mutex;

#[cfg(feature = "postgres")]
pub mod postgres;

/// A [`SwitchStore`] backed by a sharded `DashMap`. Table-level
/// operations (`insert`, `list_ids`) touch only the map's sharded
/// buckets; `update` clones out the per-row `Arc<Mutex<Switch>>` and
/// locks only that row, mirroring the table-lock/row-lock split
/// described for the switch table.
#[derive(Clone, Default)]
pub struct DashMapSwitchStore {
    table: Arc<DashMap<SwitchId, Arc<Mutex<Switch>>>>,
}

impl DashMapSwitchStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SwitchStore for DashMapSwitchStore {
    async fn insert(&self, switch: Switch) -> Result<(), SwitchError> {
        let id = switch.id();
        match self.table.entry(id) {
            Entry::Occupied(_) => Err(SwitchError::StateConflict(format!(
                "switch {id} already enrolled"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(switch)));
                Ok(())
            }
        }
    }

    async fn get(&self, id: SwitchId) -> Result<Option<Switch>, SwitchError> {
        let Some(row) = self.table.get(&id).map(|entry| entry.value().clone()) else {
            return Ok(None);
        };
        Ok(Some(row.lock().await.clone()))
    }

    async fn update(
        &self,
        id: SwitchId,
        f: Box<dyn FnOnce(&mut Switch) -> Result<(), SwitchError> + Send + '_>,
    ) -> Result<(), SwitchError> {
        let row = self
            .table
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SwitchError::StateConflict(format!("no such switch {id}")))?;
        let mut switch = row.lock().await;
        f(&mut switch)
    }

    async fn list_ids(&self) -> Result<Vec<SwitchId>, SwitchError> {
        Ok(self.table.iter().map(|entry| *entry.key()).collect())
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
        let key = PrivateKey::generate(&mut rand::rngs::StdRng::from_seed([4u8; 32]));
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
    async fn insert_get_update_roundtrip() {
        let store = DashMapSwitchStore::new();
        let switch = new_switch();
        let id = switch.id();
        store.insert(switch).await.unwrap();
        assert!(store.list_ids().await.unwrap().contains(&id));

        store
            .update(
                id,
                Box::new(|s| s.refresh(SystemTime::UNIX_EPOCH + Duration::from_secs(10))),
            )
            .await
            .unwrap();

        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(
            fetched.deadline(),
            SystemTime::UNIX_EPOCH + Duration::from_secs(10) + Duration::from_secs(3600)
        );
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let store = DashMapSwitchStore::new();
        let switch = new_switch();
        let again = switch.clone();
        store.insert(switch).await.unwrap();
        assert!(store.insert(again).await.is_err());
    }
}
