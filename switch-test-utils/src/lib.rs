#![deny(missing_docs)]
//! Test doubles shared across the dead man's switch workspace.
//!
//! [`InMemorySubstrate`] satisfies [`switch_types::Substrate`] with a
//! single-process broadcast log; [`InMemorySwitchStore`] satisfies
//! [`switch_types::SwitchStore`] with a plain `HashMap`. Neither is
//! durable or distributed - that's the point, they exist so the
//! protocol and state-machine logic can be exercised without a real
//! broker or database.

pub mod substrate;
pub mod switch_store;

pub use substrate::InMemorySubstrate;
pub use switch_store::InMemorySwitchStore;
