//! The events a train's handler pipeline reacts to (spec §6 "Train
//! events"). Grounded on the teacher's ad hoc `Train` entry points
//! (`sensor_entered`, `request_next_block`, `drive_ok` in
//! `control/train.rs`) — here collected into one enum so the
//! controller can dispatch through a single match instead of one
//! method per trigger.

use std::time::Duration;

use crate::ids::FeedbackId;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TrainEvent {
    /// A feedback sensor this train is expected to pass reported occupied.
    FeedbackTriggered(FeedbackId),
    /// The train's tracked position moved within its current block
    /// without crossing into the next one.
    MovedInsideBlock { position: usize },
    /// The train crossed into the next block of its route.
    MovedToNextBlock,
    /// A station (or manual stop) restart timer elapsed.
    RestartTimerFired,
    /// The operator or controller changed the train's scheduling mode.
    SchedulingChanged,
    /// The train's run state changed (e.g. Running -> Braking).
    StateChanged,
    /// A stop was requested — immediately, at the next station, or
    /// with a restart after `Duration`.
    StopRequested(StopRequest),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StopRequest {
    Immediate,
    AtNextStation,
    AtNextStationThenRestart(Duration),
}
