//! The switch table: a mapping from [`SwitchId`] to [`Switch`] aggregate,
//! abstracted as a trait so the watcher daemon can run against an
//! in-memory map in tests and a durable backend (e.g. Postgres) in
//! production without the release state machine knowing the difference.
//!
//! §5 describes the concurrency shape this trait is built to express: a
//! table-level lock for insert/delete, and a per-row lock for mutation,
//! with readers taking only the per-row lock. [`SwitchStore::update`]
//! is the one access path that needs both correctness properties at
//! once - fetch, mutate, and persist a single switch atomically without
//! holding a lock over the whole table - so it takes a closure rather
//! than separate get/put calls that a caller could race between.

use async_trait::async_trait;

use crate::error::SwitchError;
use crate::ids::SwitchId;
use crate::switch::Switch;

/// Storage for the switch table. Implementations must serialize
/// concurrent [`SwitchStore::update`] calls against the *same* switch id
/// but may run updates against different switch ids fully in parallel.
#[async_trait]
pub trait SwitchStore: Send + Sync {
    /// Inserts a newly enrolled switch. Fails with
    /// [`SwitchError::StateConflict`] if a switch with this id already exists.
    async fn insert(&self, switch: Switch) -> Result<(), SwitchError>;

    /// Returns a snapshot of the switch, if it exists. The returned value
    /// is a copy; mutating it has no effect on the stored row - use
    /// [`SwitchStore::update`] to persist changes.
    async fn get(&self, id: SwitchId) -> Result<Option<Switch>, SwitchError>;

    /// Applies `f` to the stored switch under that switch's row lock and
    /// persists the result. `f` returning `Err` aborts the update with no
    /// change to the stored row. Fails with [`SwitchError::StateConflict`]
    /// if no switch with `id` exists.
    async fn update(
        &self,
        id: SwitchId,
        f: Box<dyn FnOnce(&mut Switch) -> Result<(), SwitchError> + Send + '_>,
    ) -> Result<(), SwitchError>;

    /// All switch ids currently in the table, for the timer to scan.
    /// Implementations may return a weakly-consistent snapshot.
    async fn list_ids(&self) -> Result<Vec<SwitchId>, SwitchError>;
}
