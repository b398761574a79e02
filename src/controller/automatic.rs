//! The eight automatic-mode handlers (spec §4.4 "Train Controller").
//!
//! Each handler takes exactly the locks it needs (already acquired by
//! the caller, the layout controller's event loop) and the bus to
//! command the locomotive/turnouts through — the same per-call locking
//! granularity the teacher's `Signal::next`/`Sensor::block` use, rather
//! than holding one big lock across a whole handler pipeline.

use crate::bus::{Command, CommandInterface};
use crate::config::RuntimeConfig;
use crate::controller::events::TrainEvent;
use crate::controller::position;
use crate::error::{LayoutError, Result};
use crate::general::AddressType;
use crate::ids::BlockId;
use crate::model::{BlockCategory, Route, RouteMode, Scheduling, StopTrigger, Train, TrainState};
use crate::pathfinder::{self, Constraints};
use crate::reservation;
use crate::topology::Topology;

/// Handler 1 — `Start`. Event: `schedulingChanged`.
///
/// Commands the train's default running speed and transitions to
/// `Running` once a leading-block reservation succeeds, regenerating
/// an endless automatic route first if it has run out of steps.
pub async fn start<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    config: &RuntimeConfig,
    bus: &mut dyn CommandInterface<L, S>,
    train: &mut Train<L>,
    route: &mut Route,
) -> Result<Vec<TrainEvent>> {
    if train.speed.current != crate::general::Kph::ZERO || train.current_block.is_none() {
        return Ok(Vec::new());
    }

    if route.steps.is_empty() || train.route_step_index >= route.steps.len() {
        if matches!(route.mode, RouteMode::Automatic) {
            regenerate_route(topology, train, route).await?;
        } else {
            return Ok(Vec::new());
        }
    }

    let current_block = train.current_block.clone().expect("checked above");
    let current_direction = route
        .step(train.route_step_index)
        .map(|step| step.direction)
        .unwrap_or_else(|| train.body_direction_travel());
    let reserved = reservation::reserve_leading(
        topology,
        &train.id,
        route,
        current_block,
        current_direction,
        train.route_step_index + 1,
        train.max_leading_reserved_blocks,
    )
    .await?;

    if !reserved {
        return Ok(Vec::new());
    }

    train.start_route_index = train.route_step_index;
    train.stop_trigger = StopTrigger::None;
    let running_speed = crate::general::Kph(config.default_running_speed_kph).min(train.speed.max);
    train.speed.requested = running_speed;
    bus.execute(Command::SetLocoSpeed {
        address: train.locomotive_address,
        speed: running_speed,
    })
    .await
    .ok();
    train.state = TrainState::Running;

    Ok(vec![TrainEvent::StateChanged])
}

/// Handler 2 — `MoveWithinBlock`. Event: `feedbackTriggered`.
///
/// `strict` picks between the two position-tracking modes spec §4.4
/// describes: in strict mode only the feedback immediately ahead of
/// the current position advances it; in lenient mode any feedback
/// ahead of the current position jumps straight to it.
pub async fn move_within_block<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    train: &mut Train<L>,
    block_id: &BlockId,
    feedback_index: usize,
    direction: crate::model::TravelDirection,
    strict: bool,
) -> Result<Vec<TrainEvent>> {
    let moved = match position::new_position(train.position, feedback_index, direction, strict) {
        Ok(new_position) if new_position != train.position => {
            train.position = new_position;
            vec![TrainEvent::MovedInsideBlock { position: new_position }]
        }
        _ => Vec::new(),
    };

    // Invariant (§7 #5): position must stay within the current block's
    // feedback range no matter which tracking mode moved it.
    if let Ok(mutex) = topology.block(block_id) {
        let block = mutex.lock().await;
        let position = train.position;
        crate::invariants::check(block.position_in_range(position), || {
            format!(
                "train {:?} position {position} out of range for block {block_id:?} ({} feedbacks)",
                block.feedbacks.len()
            )
        });
    }

    Ok(moved)
}

/// Handler 3 — `MoveToNextBlock`. Event: `feedbackTriggered`.
///
/// Fires when the feedback that marks the boundary between the
/// current block and the route's next block has been detected.
pub async fn move_to_next_block<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    train: &mut Train<L>,
    route: &Route,
    triggered_feedback: usize,
) -> Result<Vec<TrainEvent>> {
    let Some(next_step) = route.steps.get(train.route_step_index + 1) else {
        return Ok(Vec::new());
    };

    let next_block_mutex = topology.block(&next_step.block)?;
    let entry_feedback = {
        let block = next_block_mutex.lock().await;
        block.entry_feedback_index(next_step.direction)
    };

    if entry_feedback != Some(triggered_feedback) {
        return Ok(Vec::new());
    }

    let entry_position = {
        let block = next_block_mutex.lock().await;
        block.entry_position(next_step.direction)
    };

    train.current_block = Some(next_step.block.clone());
    train.position = entry_position;
    train.route_step_index += 1;

    reservation::free_trailing(
        topology,
        &train.id,
        route,
        train.route_step_index,
        train.trailing_reserved_steps,
    )
    .await?;

    // Invariant (§7 #4): the steps just kept by `free_trailing` must form
    // a contiguous reserved path ending at the train's current block.
    let kept_from = train
        .route_step_index
        .saturating_sub(train.trailing_reserved_steps);
    for idx in kept_from..=train.route_step_index {
        let Some(step) = route.steps.get(idx) else {
            continue;
        };
        if let Ok(mutex) = topology.block(&step.block) {
            let block = mutex.lock().await;
            let held = block
                .reservation
                .as_ref()
                .is_some_and(|r| r.train == train.id);
            crate::invariants::check(held, || {
                format!(
                    "train {:?} trailing window expects step {idx} ({:?}) reserved but found {:?}",
                    train.id, step.block, block.reservation
                )
            });
        }
    }

    Ok(vec![TrainEvent::MovedToNextBlock])
}

/// Handler 4 — `DetectStop`. Event: `movedToNextBlock`.
///
/// Decides, from the route's mode and the block just entered, whether
/// a stop should now be armed — and with what restart behavior.
pub async fn detect_stop<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    config: &RuntimeConfig,
    train: &mut Train<L>,
    route: &Route,
) -> Result<()> {
    let Some(block_id) = train.current_block.clone() else {
        return Ok(());
    };
    let block = topology.block(&block_id)?.lock().await;

    let current_step_index = train.route_step_index;
    let is_final_step = route.is_last_step(current_step_index);
    let is_station = block.category == BlockCategory::Station;
    let started_here = current_step_index == train.start_route_index;

    train.stop_trigger = match &route.mode {
        RouteMode::AutomaticOnce {
            destination,
            direction,
        } if is_final_step => {
            let direction_ok = match direction {
                None => true,
                Some(d) => route
                    .step(current_step_index)
                    .is_some_and(|step| step.direction == *d),
            };
            if &block_id != destination || !direction_ok {
                return Err(LayoutError::DestinationMismatch {
                    train: train.id.clone(),
                    route: route.id.clone(),
                });
            }
            StopTrigger::StopCompletely
        }
        RouteMode::Fixed if is_final_step => StopTrigger::StopCompletely,
        // Point-to-point routes run through intermediate stations untouched;
        // only `Fixed` opts into station stop/restart handling below.
        RouteMode::AutomaticOnce { .. } => StopTrigger::None,
        _ if is_station && !started_here => {
            if train.scheduling == Scheduling::AutomaticFinishing {
                StopTrigger::StopCompletely
            } else {
                let wait = route
                    .step(current_step_index)
                    .and_then(|step| step.waiting_time)
                    .or(block.station_waiting_time)
                    .unwrap_or(std::time::Duration::from_secs(
                        config.default_station_wait_secs,
                    ));
                StopTrigger::StopAndRestart(wait)
            }
        }
        _ => StopTrigger::None,
    };

    Ok(())
}

/// Handler 5 — `ExecuteStopInBlock`. Event: `feedbackTriggered`.
///
/// Watches for the block's brake feedback while running, then its
/// stop feedback while braking, commanding speed changes as each
/// fires.
pub async fn execute_stop_in_block<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    config: &RuntimeConfig,
    bus: &mut dyn CommandInterface<L, S>,
    train: &mut Train<L>,
    triggered_feedback: usize,
) -> Result<Vec<TrainEvent>> {
    if train.stop_trigger == StopTrigger::None {
        return Ok(Vec::new());
    }
    let Some(block_id) = train.current_block.clone() else {
        return Ok(Vec::new());
    };
    let block = topology.block(&block_id)?.lock().await;
    let direction = train.body_direction_travel();

    if train.state == TrainState::Running {
        if block.brake_feedback.for_direction(direction) == Some(triggered_feedback) {
            train.speed.requested = crate::general::Kph(config.default_braking_speed_kph);
            bus.execute(Command::SetLocoSpeed {
                address: train.locomotive_address,
                speed: train.speed.requested,
            })
            .await
            .ok();
            train.state = TrainState::Braking;
            return Ok(vec![TrainEvent::StateChanged]);
        }
    } else if train.state == TrainState::Braking
        && block.stop_feedback.for_direction(direction) == Some(triggered_feedback)
    {
        train.speed.requested = crate::general::Kph::ZERO;
        bus.execute(Command::SetLocoSpeed {
            address: train.locomotive_address,
            speed: crate::general::Kph::ZERO,
        })
        .await
        .ok();
        train.state = TrainState::Stopped;

        if let StopTrigger::StopCompletely = train.stop_trigger {
            train.scheduling = crate::model::Scheduling::Manual;
        }
        return Ok(vec![TrainEvent::StateChanged]);
    }

    Ok(Vec::new())
}

/// Handler 6 — `ReserveLeadingBlocks`. Events: `movedToNextBlock`,
/// `movedInsideBlock`.
///
/// On failure to reserve forward, attempts one automatic route
/// regeneration around the obstruction before giving up: a train that
/// finds its next block reserved by another train reroutes around it
/// rather than waiting indefinitely. A `fixed` route is never
/// regenerated, so a blocked fixed route goes straight to
/// `stopTemporarily`.
pub async fn reserve_leading_blocks<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    train: &mut Train<L>,
    route: &mut Route,
) -> Result<Vec<TrainEvent>> {
    if train.stop_trigger != StopTrigger::None || train.state == TrainState::Stopped {
        return Ok(Vec::new());
    }
    let Some(current_block) = train.current_block.clone() else {
        return Ok(Vec::new());
    };

    async fn try_reserve<S: AddressType, D: AddressType, L: AddressType>(
        topology: &Topology<S, D, L>,
        train: &Train<L>,
        route: &Route,
        current_block: crate::ids::BlockId,
    ) -> Result<bool> {
        let current_direction = route
            .step(train.route_step_index)
            .map(|step| step.direction)
            .unwrap_or_else(|| train.body_direction_travel());
        reservation::reserve_leading(
            topology,
            &train.id,
            route,
            current_block,
            current_direction,
            train.route_step_index + 1,
            train.max_leading_reserved_blocks,
        )
        .await
    }

    if try_reserve(topology, train, route, current_block.clone()).await? {
        return Ok(Vec::new());
    }

    if !matches!(route.mode, RouteMode::Fixed) {
        regenerate_route(topology, train, route).await?;
        if try_reserve(topology, train, route, current_block).await? {
            return Ok(Vec::new());
        }
    }

    train.stop_trigger = StopTrigger::StopTemporarily;
    Ok(vec![TrainEvent::StopRequested(
        crate::controller::events::StopRequest::Immediate,
    )])
}

/// Handler 7 — `SpeedLimitEvent`. Event: `stateChanged`.
///
/// A no-op when the train isn't crossing a turnout with a length-based
/// speed limit; otherwise lowers the requested speed to the limit.
pub async fn speed_limit_event<S: AddressType, D: AddressType, L: AddressType>(
    _topology: &Topology<S, D, L>,
    bus: &mut dyn CommandInterface<L, S>,
    train: &mut Train<L>,
    limit: Option<crate::general::Kph>,
) -> Result<()> {
    if let Some(limit) = limit {
        if train.speed.requested > limit {
            train.speed.requested = limit;
            bus.execute(Command::SetLocoSpeed {
                address: train.locomotive_address,
                speed: limit,
            })
            .await
            .ok();
        }
    }
    Ok(())
}

/// Handler 8 — `StopPushingWagons`. Safety interlock: a locomotive
/// pushing wagons with an undetermined next block must not coast past
/// the end of its current one.
pub async fn stop_pushing_wagons<S: AddressType, D: AddressType, L: AddressType>(
    bus: &mut dyn CommandInterface<L, S>,
    train: &mut Train<L>,
    pushing: bool,
    next_block_known: bool,
) -> Result<()> {
    if pushing && !next_block_known && train.speed.current != crate::general::Kph::ZERO {
        train.speed.requested = crate::general::Kph::ZERO;
        bus.execute(Command::SetLocoSpeed {
            address: train.locomotive_address,
            speed: crate::general::Kph::ZERO,
        })
        .await
        .ok();
        train.state = TrainState::Stopping;
    }
    Ok(())
}

/// Invokes the path finder from the train's current position and
/// replaces `route`'s steps in place, resetting `routeStepIndex`.
/// Shared by `Start` and `ReserveLeadingBlocks` (spec §4.4 "Automatic
/// route regeneration").
pub async fn regenerate_route<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    train: &mut Train<L>,
    route: &mut Route,
) -> Result<()> {
    let Some(current_block) = train.current_block.clone() else {
        return Ok(());
    };

    let mut constraints = Constraints::new(train.id.clone());
    let destination = match &route.mode {
        RouteMode::AutomaticOnce { destination, .. } => Some(destination.clone()),
        RouteMode::Automatic => {
            constraints.stop_at_first_station = true;
            None
        }
        RouteMode::Fixed => return Ok(()),
    };

    let direction = train.body_direction_travel();
    let settings = crate::pathfinder::Settings::default();
    let ahead = pathfinder::find_path(
        topology,
        &current_block,
        direction,
        destination.as_ref(),
        &constraints,
        &settings,
    )
    .await?;

    route.steps = with_current_step(current_block, direction, ahead);
    train.route_step_index = 0;

    Ok(())
}

/// The path finder never includes the block a search started from, but
/// `move_to_next_block`/`detect_stop` index `route.steps` on the
/// assumption that `steps[route_step_index]` is the block the train is
/// currently in. Prepends that block so a freshly (re)generated route
/// satisfies the same convention as a hand-authored one.
pub(crate) fn with_current_step(
    current_block: crate::ids::BlockId,
    direction: crate::model::TravelDirection,
    ahead: Vec<crate::model::RouteStep>,
) -> Vec<crate::model::RouteStep> {
    let mut steps = Vec::with_capacity(ahead.len() + 1);
    steps.push(crate::model::RouteStep {
        block: current_block,
        direction,
        waiting_time: None,
    });
    steps.extend(ahead);
    steps
}

