//! Opaque, stable entity identifiers.
//!
//! The distilled spec calls every entity id "string/UUID" and compared
//! as a value. The teacher's [`crate::general::AddressType`]-bound
//! `Address<Ix>` newtype does the analogous job for hardware
//! addresses; here the same newtype trick is generalized from a
//! `Copy` numeric type to an owned, cheaply-clonable string so ids can
//! be authored by a human (`"s1"`, `"t1"`) or generated as a UUID.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Arc<str>);

        impl $name {
            /// Creates an id from any string-like value.
            pub fn new(value: impl Into<String>) -> Self {
                $name(Arc::from(value.into()))
            }

            /// Generates a fresh random id, for elements created at runtime
            /// (e.g. automatic routes) that have no natural human-authored name.
            pub fn generate() -> Self {
                $name::new(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:?})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name::new(value)
            }
        }
    };
}

entity_id!(BlockId, "Identifies a [`crate::model::block::Block`].");
entity_id!(TurnoutId, "Identifies a [`crate::model::turnout::Turnout`].");
entity_id!(FeedbackId, "Identifies a [`crate::model::feedback::Feedback`] sensor.");
entity_id!(TransitionId, "Identifies a [`crate::model::transition::Transition`].");
entity_id!(TrainId, "Identifies a [`crate::model::train::Train`].");
entity_id!(RouteId, "Identifies a [`crate::model::route::Route`].");
