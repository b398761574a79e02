//! Turnouts — routable junctions whose geometry is fixed by category
//! (spec §4.1 "Turnout geometry").

use serde::{Deserialize, Serialize};

use crate::general::AddressType;
use crate::ids::TurnoutId;
use crate::model::common::Socket;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TurnoutCategory {
    SingleLeft,
    SingleRight,
    ThreeWay,
    DoubleSlip,
    DoubleSlip2,
}

/// The position a turnout's motor(s) must hold to connect a given
/// (entry, exit) socket pair. Distinct categories reuse variants where
/// the physical meaning coincides (e.g. every category has a
/// `Straight` pair).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TurnoutState {
    Straight,
    Branch,
    Left,
    Right,
    Cross,
}

impl TurnoutCategory {
    /// The fixed socket set for this category.
    pub fn sockets(self) -> &'static [Socket] {
        match self {
            TurnoutCategory::SingleLeft | TurnoutCategory::SingleRight => &[0, 1, 2],
            TurnoutCategory::ThreeWay => &[0, 1, 2, 3],
            TurnoutCategory::DoubleSlip | TurnoutCategory::DoubleSlip2 => &[0, 1, 2, 3],
        }
    }

    /// The state required to connect `entry` to `exit`, or `None` if
    /// the pair is not a legal route through this turnout.
    pub fn state_for(self, entry: Socket, exit: Socket) -> Option<TurnoutState> {
        if entry == exit {
            return None;
        }
        match self {
            TurnoutCategory::SingleLeft | TurnoutCategory::SingleRight => match (entry, exit) {
                (0, 1) | (1, 0) => Some(TurnoutState::Straight),
                (0, 2) | (2, 0) => Some(TurnoutState::Branch),
                _ => None,
            },
            TurnoutCategory::ThreeWay => match (entry, exit) {
                (0, 1) | (1, 0) => Some(TurnoutState::Straight),
                (0, 2) | (2, 0) => Some(TurnoutState::Left),
                (0, 3) | (3, 0) => Some(TurnoutState::Right),
                _ => None,
            },
            // Two non-overlapping straight pairs (0,1) and (2,3); two
            // crossing pairs (0,3) and (1,2).
            TurnoutCategory::DoubleSlip => match (entry, exit) {
                (0, 1) | (1, 0) | (2, 3) | (3, 2) => Some(TurnoutState::Straight),
                (0, 3) | (3, 0) | (1, 2) | (2, 1) => Some(TurnoutState::Cross),
                _ => None,
            },
            // Same shape, socket numbering rotated by one position
            // relative to `DoubleSlip` — the two crossing pairs are
            // (0,2) and (1,3) instead.
            TurnoutCategory::DoubleSlip2 => match (entry, exit) {
                (0, 1) | (1, 0) | (2, 3) | (3, 2) => Some(TurnoutState::Straight),
                (0, 2) | (2, 0) | (1, 3) | (3, 1) => Some(TurnoutState::Cross),
                _ => None,
            },
        }
    }

    /// All legal exit sockets reachable from `entry`, with the state
    /// each requires.
    pub fn exits_from(self, entry: Socket) -> Vec<(Socket, TurnoutState)> {
        self.sockets()
            .iter()
            .copied()
            .filter_map(|exit| self.state_for(entry, exit).map(|state| (exit, state)))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turnout<SwitchAddr: AddressType = crate::general::DefaultAddressType> {
    pub id: TurnoutId,
    pub category: TurnoutCategory,
    /// One control-bus address per physical motor; single/three-way
    /// turnouts need one, double slips commonly need two.
    pub addresses: Vec<SwitchAddr>,
    pub state: TurnoutState,
    pub length_m: Option<f64>,
    #[serde(default)]
    pub reservation: Option<crate::ids::TrainId>,
}

impl<SwitchAddr: AddressType> Turnout<SwitchAddr> {
    pub fn new(id: TurnoutId, category: TurnoutCategory, addresses: Vec<SwitchAddr>) -> Self {
        Turnout {
            id,
            category,
            addresses,
            state: TurnoutState::Straight,
            length_m: None,
            reservation: None,
        }
    }

    pub fn is_reserved_by_other(&self, train: &crate::ids::TrainId) -> bool {
        self.reservation.as_ref().is_some_and(|t| t != train)
    }
}
