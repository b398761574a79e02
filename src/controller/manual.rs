//! Manual-mode handlers (spec §4.4 "Manual handlers").
//!
//! `MoveWithinBlock` is shared verbatim with the automatic handler set
//! ([`crate::controller::automatic::move_within_block`]); this module
//! covers the two that differ: next-block movement not tied to a
//! pre-planned route, and the end-of-track stop a route-less train
//! needs when it runs out of layout ahead of it.

use crate::bus::{Command, CommandInterface};
use crate::controller::events::TrainEvent;
use crate::error::Result;
use crate::general::AddressType;
use crate::model::{ElementRef, Train, TrainState};
use crate::topology::Topology;

/// `ManualMoveToNextBlock`. Event: `feedbackTriggered`.
///
/// Uses the layout's own notion of "the next block" — whatever is
/// wired to the exit socket the train is currently heading towards —
/// rather than a planned route step, since a manually driven train has
/// none.
pub async fn manual_move_to_next_block<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    train: &mut Train<L>,
    triggered_feedback: usize,
) -> Result<Vec<TrainEvent>> {
    let Some(current_block_id) = train.current_block.clone() else {
        return Ok(Vec::new());
    };
    let direction = train.body_direction_travel();

    let Some((next_block_id, entry_direction)) =
        topology.next_block(&current_block_id, direction).await?
    else {
        return Ok(Vec::new());
    };

    let next_block_mutex = topology.block(&next_block_id)?;
    let entry_feedback = {
        let block = next_block_mutex.lock().await;
        block.entry_feedback_index(entry_direction)
    };

    if entry_feedback != Some(triggered_feedback) {
        return Ok(Vec::new());
    }

    let entry_position = {
        let block = next_block_mutex.lock().await;
        block.entry_position(entry_direction)
    };

    train.current_block = Some(next_block_id);
    train.position = entry_position;

    Ok(vec![TrainEvent::MovedToNextBlock])
}

/// `StopTriggerDetection`. Stops a manually driven train when it
/// reaches an end of track (no transition wired at its exit socket)
/// without a planned route to fall back on.
pub async fn stop_trigger_detection<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    bus: &mut dyn CommandInterface<L, S>,
    train: &mut Train<L>,
) -> Result<Vec<TrainEvent>> {
    let Some(current_block_id) = train.current_block.clone() else {
        return Ok(Vec::new());
    };
    if train.speed.current == crate::general::Kph::ZERO {
        return Ok(Vec::new());
    }
    let direction = train.body_direction_travel();
    let has_next = topology.next_block(&current_block_id, direction).await?.is_some();

    if has_next {
        return Ok(Vec::new());
    }

    train.speed.requested = crate::general::Kph::ZERO;
    bus.execute(Command::SetLocoSpeed {
        address: train.locomotive_address,
        speed: crate::general::Kph::ZERO,
    })
    .await
    .ok();
    train.state = TrainState::Stopped;

    Ok(vec![TrainEvent::StateChanged])
}
