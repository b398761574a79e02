//! Routes — an ordered, directed sequence of blocks a train will
//! traverse (spec §3 "Route").

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ids::{BlockId, RouteId};
use crate::model::common::TravelDirection;

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub block: BlockId,
    pub direction: TravelDirection,
    /// Waiting time to use if this step turns out to be a station stop,
    /// overriding the block's own `station_waiting_time` (spec §9 open
    /// question: "route step's value preferred, falling back to the
    /// block's value, else 10s").
    #[serde(default)]
    pub waiting_time: Option<Duration>,
}

/// How a route was produced and whether it should be regenerated once
/// exhausted (spec §3 "Route.mode").
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum RouteMode {
    /// Hand-authored, never regenerated automatically.
    Fixed,
    /// Found by the path finder for a single run to `destination`.
    AutomaticOnce {
        destination: BlockId,
        direction: Option<TravelDirection>,
    },
    /// Found by the path finder, regenerated every time it is consumed.
    Automatic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub steps: Vec<RouteStep>,
    pub mode: RouteMode,
    pub enabled: bool,
}

impl Route {
    pub fn new(id: RouteId, steps: Vec<RouteStep>, mode: RouteMode) -> Self {
        Route {
            id,
            steps,
            mode,
            enabled: true,
        }
    }

    pub fn step(&self, index: usize) -> Option<&RouteStep> {
        self.steps.get(index)
    }

    pub fn is_last_step(&self, index: usize) -> bool {
        index + 1 >= self.steps.len()
    }
}
