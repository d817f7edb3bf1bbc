//! Identifier newtypes used throughout the release pipeline.
//!
//! Each identifier is a thin wrapper around a [`Uuid`] so that a switch
//! id can never be accidentally passed where a watcher id is expected,
//! while still serializing as a plain UUID string on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The stable identifier of a [`crate::Switch`], assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwitchId(Uuid);

/// The identifier of a watcher holding one share of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatcherId(Uuid);

/// The identifier of a recipient addressed by a release record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(Uuid);

macro_rules! uuid_newtype {
    ($ty:ident) => {
        impl $ty {
            /// Generates a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// The underlying UUID.
            pub fn into_uuid(self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_newtype!(SwitchId);
uuid_newtype!(WatcherId);
uuid_newtype!(RecipientId);
