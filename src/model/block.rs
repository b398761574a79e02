//! Blocks — the unit of reservation (spec §3 "Block").

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ids::{BlockId, FeedbackId, TrainId};
use crate::model::common::TravelDirection;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BlockCategory {
    Station,
    Free,
    SidingPrevious,
    SidingNext,
}

impl BlockCategory {
    /// Siding blocks only expose the open side; station/free blocks
    /// expose both sockets 0 (previous) and 1 (next).
    pub fn sockets(self) -> &'static [u8] {
        match self {
            BlockCategory::Station | BlockCategory::Free => &[0, 1],
            BlockCategory::SidingPrevious => &[0],
            BlockCategory::SidingNext => &[1],
        }
    }
}

/// Per-direction feedback selectors: which feedback in
/// [`Block::feedbacks`] (by index) is the brake/stop point when
/// traveling in a given direction.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct DirectionalFeedback {
    pub next: Option<usize>,
    pub previous: Option<usize>,
}

impl DirectionalFeedback {
    pub fn for_direction(&self, direction: TravelDirection) -> Option<usize> {
        match direction {
            TravelDirection::Next => self.next,
            TravelDirection::Previous => self.previous,
        }
    }
}

/// A train physically present in a block, independent of reservation
/// (spec §3 "Occupancy").
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TrainInstance {
    pub train: TrainId,
    pub direction: TravelDirection,
}

/// A claim on a block by a train (spec §3 "Reservation state").
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub train: TrainId,
    pub direction: TravelDirection,
    /// Whether this reservation is a "leading" (ahead-of-train)
    /// reservation, as opposed to the block the train currently
    /// occupies.
    pub leading: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
    pub category: BlockCategory,
    pub enabled: bool,
    /// Feedbacks ordered 0..n-1 along the block's natural direction
    /// (socket 0 -> socket 1).
    pub feedbacks: Vec<FeedbackId>,
    /// Physical block length, if known.
    pub length_m: Option<f64>,
    /// Distance (meters) of each feedback from the block's start, if known.
    pub feedback_distances_m: Option<Vec<f64>>,
    pub brake_feedback: DirectionalFeedback,
    pub stop_feedback: DirectionalFeedback,
    pub station_waiting_time: Option<Duration>,
    #[serde(default)]
    pub reservation: Option<Reservation>,
    #[serde(default)]
    pub occupancy: Option<TrainInstance>,
}

impl Block {
    pub fn new(id: BlockId, name: impl Into<String>, category: BlockCategory) -> Self {
        Block {
            id,
            name: name.into(),
            category,
            enabled: true,
            feedbacks: Vec::new(),
            length_m: None,
            feedback_distances_m: None,
            brake_feedback: DirectionalFeedback::default(),
            stop_feedback: DirectionalFeedback::default(),
            station_waiting_time: None,
            reservation: None,
            occupancy: None,
        }
    }

    pub fn sockets(&self) -> &'static [u8] {
        self.category.sockets()
    }

    pub fn is_reserved_by_other(&self, train: &TrainId) -> bool {
        self.reservation
            .as_ref()
            .is_some_and(|r| &r.train != train)
    }

    pub fn is_occupied_by_other(&self, train: &TrainId) -> bool {
        self.occupancy.as_ref().is_some_and(|o| &o.train != train)
    }

    /// Invariant (§7 #5): position must fall within `0..=feedbacks.len()`.
    pub fn position_in_range(&self, position: usize) -> bool {
        position <= self.feedbacks.len()
    }

    /// The index of the first feedback a train crossing into this
    /// block (traveling `direction`) would hit, if the block has any
    /// feedbacks at all.
    pub fn entry_feedback_index(&self, direction: TravelDirection) -> Option<usize> {
        if self.feedbacks.is_empty() {
            return None;
        }
        Some(match direction {
            TravelDirection::Next => 0,
            TravelDirection::Previous => self.feedbacks.len() - 1,
        })
    }

    /// The position a train occupies immediately after being placed in
    /// this block by crossing in from `direction` (before any feedback
    /// fires).
    pub fn entry_position(&self, direction: TravelDirection) -> usize {
        match direction {
            TravelDirection::Next => 0,
            TravelDirection::Previous => self.feedbacks.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn siding_blocks_expose_one_socket() {
        assert_eq!(BlockCategory::SidingPrevious.sockets(), &[0]);
        assert_eq!(BlockCategory::SidingNext.sockets(), &[1]);
        assert_eq!(BlockCategory::Station.sockets(), &[0, 1]);
    }

    #[test]
    fn reservation_ownership() {
        let mut block = Block::new(BlockId::new("b1"), "B1", BlockCategory::Free);
        let t1 = TrainId::new("t1");
        let t2 = TrainId::new("t2");
        assert!(!block.is_reserved_by_other(&t1));
        block.reservation = Some(Reservation {
            train: t1.clone(),
            direction: TravelDirection::Next,
            leading: false,
        });
        assert!(!block.is_reserved_by_other(&t1));
        assert!(block.is_reserved_by_other(&t2));
    }
}
