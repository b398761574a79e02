//! Trains — long-lived entities whose runtime fields change
//! continuously as they move (spec §3 "Train").

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::general::{AddressType, Kph};
use crate::ids::{BlockId, RouteId, TrainId};
use crate::model::common::BodyDirection;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Scheduling {
    Manual,
    AutomaticRunning,
    AutomaticFinishing,
    Stopped,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TrainState {
    Stopped,
    Running,
    Braking,
    Stopping,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum StopTrigger {
    None,
    StopCompletely,
    StopAndRestart(Duration),
    StopTemporarily,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TrainSpeed {
    pub current: Kph,
    pub requested: Kph,
    pub max: Kph,
}

impl TrainSpeed {
    pub fn new(max: Kph) -> Self {
        TrainSpeed {
            current: Kph::ZERO,
            requested: Kph::ZERO,
            max,
        }
    }
}

/// A locomotive decoder family, kept open-ended since the bus
/// transport (out of scope here, §1) determines what is actually valid.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum DecoderFamily {
    Generic14Step,
    Generic28Step,
    Generic128Step,
    Custom(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Train<LocoAddr: AddressType = crate::general::DefaultAddressType> {
    pub id: TrainId,
    pub name: String,
    pub locomotive_address: LocoAddr,
    pub decoder_family: DecoderFamily,
    pub body_direction: BodyDirection,
    pub current_block: Option<BlockId>,
    pub position: usize,
    pub current_route: Option<RouteId>,
    pub route_step_index: usize,
    /// The `route_step_index` the train had when it last transitioned
    /// into `Running` — the reference point leading-reservation counts
    /// and trailing-release windows are measured from.
    pub start_route_index: usize,
    pub scheduling: Scheduling,
    pub state: TrainState,
    pub stop_trigger: StopTrigger,
    pub max_leading_reserved_blocks: usize,
    pub trailing_reserved_steps: usize,
    pub speed: TrainSpeed,
}

impl<LocoAddr: AddressType> Train<LocoAddr> {
    pub fn new(id: TrainId, name: impl Into<String>, locomotive_address: LocoAddr) -> Self {
        Train {
            id,
            name: name.into(),
            locomotive_address,
            decoder_family: DecoderFamily::Generic28Step,
            body_direction: BodyDirection::Forward,
            current_block: None,
            position: 0,
            current_route: None,
            route_step_index: 0,
            start_route_index: 0,
            scheduling: Scheduling::Manual,
            state: TrainState::Stopped,
            stop_trigger: StopTrigger::None,
            max_leading_reserved_blocks: 2,
            trailing_reserved_steps: 1,
            speed: TrainSpeed::new(Kph(80)),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state == TrainState::Stopped && self.speed.current == Kph::ZERO
    }

    /// The block-relative travel direction implied by this train's
    /// body direction, used whenever no route step direction is
    /// available (manual driving, or a route that has run out).
    pub fn body_direction_travel(&self) -> crate::model::TravelDirection {
        match self.body_direction {
            BodyDirection::Forward => crate::model::TravelDirection::Next,
            BodyDirection::Backward => crate::model::TravelDirection::Previous,
        }
    }
}
