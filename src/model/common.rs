//! Shared vocabulary used across the topology model: sockets, the two
//! independent notions of "direction" the spec distinguishes, and a
//! reference to "some element" (block or turnout) that owns sockets.

use serde::{Deserialize, Serialize};

use crate::ids::{BlockId, TurnoutId};

/// A socket index on a block or turnout. Blocks only ever use sockets
/// `0` (previous) and `1` (next); turnouts use as many as their
/// category defines.
pub type Socket = u8;

/// The "previous" socket of a block, by convention.
pub const PREVIOUS: Socket = 0;
/// The "next" socket of a block, by convention.
pub const NEXT: Socket = 1;

/// Orientation of travel relative to a block's natural axis
/// (`previous -> next`). Distinct from [`BodyDirection`], which is the
/// orientation of the locomotive itself.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TravelDirection {
    Next,
    Previous,
}

impl TravelDirection {
    pub fn reversed(self) -> TravelDirection {
        match self {
            TravelDirection::Next => TravelDirection::Previous,
            TravelDirection::Previous => TravelDirection::Next,
        }
    }

    /// The socket a train exits a block through when traveling in this direction.
    pub fn exit_socket(self) -> Socket {
        match self {
            TravelDirection::Next => NEXT,
            TravelDirection::Previous => PREVIOUS,
        }
    }

    /// The socket a train enters a block through when traveling in this direction.
    pub fn entry_socket(self) -> Socket {
        self.reversed().exit_socket()
    }

    /// The travel direction implied by entering a block through `socket`.
    pub fn from_entry_socket(socket: Socket) -> TravelDirection {
        if socket == PREVIOUS {
            TravelDirection::Next
        } else {
            TravelDirection::Previous
        }
    }
}

/// Orientation of the locomotive body, independent of block direction.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BodyDirection {
    Forward,
    Backward,
}

impl std::ops::Not for BodyDirection {
    type Output = BodyDirection;

    fn not(self) -> BodyDirection {
        match self {
            BodyDirection::Forward => BodyDirection::Backward,
            BodyDirection::Backward => BodyDirection::Forward,
        }
    }
}

/// A reference to either kind of topology element that owns sockets.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ElementRef {
    Block(BlockId),
    Turnout(TurnoutId),
}

impl ElementRef {
    pub fn as_block(&self) -> Option<&BlockId> {
        match self {
            ElementRef::Block(id) => Some(id),
            ElementRef::Turnout(_) => None,
        }
    }

    pub fn as_turnout(&self) -> Option<&TurnoutId> {
        match self {
            ElementRef::Turnout(id) => Some(id),
            ElementRef::Block(_) => None,
        }
    }
}

impl From<BlockId> for ElementRef {
    fn from(id: BlockId) -> Self {
        ElementRef::Block(id)
    }
}

impl From<TurnoutId> for ElementRef {
    fn from(id: TurnoutId) -> Self {
        ElementRef::Turnout(id)
    }
}
