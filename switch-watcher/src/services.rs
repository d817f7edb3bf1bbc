//! Core services that make up a switch-watcher instance.
//!
//! Each service encapsulates one responsibility of the release pipeline
//! and is wired together by [`crate::start`].
//!
//! # Services overview
//!
//! - [`switch_store`] - the switch table, in-memory or Postgres-backed.
//! - [`substrate`] - the local publish/subscribe broker this watcher
//!   binary ships with. The distributed substrate protocol itself is
//!   out of scope for this workspace (see `DESIGN.md`); this is a
//!   single-process implementation of the same [`switch_types::Substrate`]
//!   contract, suitable for a standalone watcher deployment.
//! - [`monitor`] - the timer & monitor loop: ingests heartbeats and
//!   cancellations, drives the warning/expiry transitions, and
//!   dispatches owner reminders.
//! - [`release_fsm`] - publishes this watcher's own release record once
//!   a switch expires, and tracks quorum to mark a switch `Released`.
pub(crate) mod collect;
pub mod monitor;
pub mod release_fsm;
pub mod substrate;
pub mod switch_store;
