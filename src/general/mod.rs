//! Shared type bounds used across the crate.
//!
//! `AddressType` is the bound for hardware (control-bus) addresses —
//! locomotive, turnout and feedback addresses — kept distinct from the
//! topology-level [`crate::ids`] used to identify blocks, turnouts,
//! trains and routes in the document model.

use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// The default control-bus address representation: a 14-bit decoder
/// address family fits comfortably in a `u16`.
pub type DefaultAddressType = u16;

/// A control-bus hardware address (locomotive, turnout or feedback).
pub trait AddressType: Copy + Clone + Debug + Eq + Hash + Send + Sync + Ord + 'static {}

impl AddressType for u16 {}
impl AddressType for u32 {}

/// A speed expressed in kilometers per hour, clamped to a sane range
/// for model-scale operation. Kept as a thin newtype (rather than a
/// bare `u16`) so arithmetic on speeds cannot silently mix with
/// unrelated integers.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Serialize, Deserialize)]
pub struct Kph(pub u16);

impl Kph {
    pub const ZERO: Kph = Kph(0);

    pub fn saturating_add(self, rhs: Kph) -> Kph {
        Kph(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Kph) -> Kph {
        Kph(self.0.saturating_sub(rhs.0))
    }
}

impl std::fmt::Display for Kph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} km/h", self.0)
    }
}
