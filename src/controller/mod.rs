//! The per-train handler pipeline (spec §4.4 "Train Controller").
//!
//! Grounded on the teacher's `Sensor`/`Signal` callback chains
//! (`components/mod.rs`), which react to a bus event by directly
//! mutating state and returning whatever follow-on checks it triggers.
//! Here that shape is made explicit: [`dispatch`] drains a queue of
//! [`events::TrainEvent`]s, running every handler interested in the
//! event at the front of the queue — in the fixed order §4.4 numbers
//! them — and pushing whatever follow-on events they return onto the
//! back, until the queue empties (spec §9 "coroutine-like 'run until no
//! further work' dispatch").

pub mod automatic;
pub mod events;
pub mod manual;
pub mod position;

use std::collections::VecDeque;

use crate::bus::{Command, CommandInterface};
use crate::config::RuntimeConfig;
use crate::controller::events::{StopRequest, TrainEvent};
use crate::error::Result;
use crate::general::{AddressType, Kph};
use crate::ids::FeedbackId;
use crate::model::{Route, Scheduling, Train, TrainState};
use crate::topology::Topology;

/// The local (0-based, block-ordered) index of `feedback` within
/// `block`'s own feedback list, if it is one of them. A feedback id
/// triggered on the bus is global; every handler that reasons about
/// "which feedback of *this* block fired" needs it translated first.
async fn local_feedback_index<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    block: &crate::ids::BlockId,
    feedback: &FeedbackId,
) -> Result<Option<usize>> {
    let block = topology.block(block)?.lock().await;
    Ok(block.feedbacks.iter().position(|id| id == feedback))
}

/// Runs the automatic (route-driven) handler set for a single `event`,
/// in §4.4's numbered order, returning whatever follow-on events fired.
async fn run_automatic<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    config: &RuntimeConfig,
    bus: &mut dyn CommandInterface<L, S>,
    train: &mut Train<L>,
    route: Option<&mut Route>,
    event: &TrainEvent,
) -> Result<Vec<TrainEvent>> {
    let Some(route) = route else {
        return Ok(Vec::new());
    };

    let mut follow_on = Vec::new();
    match event {
        TrainEvent::SchedulingChanged | TrainEvent::RestartTimerFired => {
            follow_on.extend(automatic::start(topology, config, bus, train, route).await?);
        }
        TrainEvent::FeedbackTriggered(feedback) => {
            let direction = route
                .step(train.route_step_index)
                .map(|step| step.direction)
                .unwrap_or_else(|| train.body_direction_travel());

            if let Some(current_block) = train.current_block.clone() {
                if let Some(index) =
                    local_feedback_index(topology, &current_block, feedback).await?
                {
                    follow_on.extend(
                        automatic::move_within_block(
                            topology,
                            train,
                            &current_block,
                            index,
                            direction,
                            true,
                        )
                        .await?,
                    );
                }

                if let Some(next_step) = route.steps.get(train.route_step_index + 1) {
                    if let Some(index) =
                        local_feedback_index(topology, &next_step.block, feedback).await?
                    {
                        follow_on.extend(
                            automatic::move_to_next_block(topology, train, route, index).await?,
                        );
                    }
                }

                if let Some(index) = local_feedback_index(topology, &current_block, feedback).await? {
                    follow_on.extend(
                        automatic::execute_stop_in_block(topology, config, bus, train, index)
                            .await?,
                    );
                }
            }
        }
        TrainEvent::MovedToNextBlock => {
            automatic::detect_stop(topology, config, train, route).await?;
            follow_on.extend(automatic::reserve_leading_blocks(topology, train, route).await?);

            let pushing = matches!(train.body_direction, crate::model::BodyDirection::Backward);
            let next_block_known = route.steps.get(train.route_step_index + 1).is_some();
            automatic::stop_pushing_wagons(bus, train, pushing, next_block_known).await?;
        }
        TrainEvent::MovedInsideBlock { .. } => {
            follow_on.extend(automatic::reserve_leading_blocks(topology, train, route).await?);
        }
        TrainEvent::StateChanged => {
            automatic::speed_limit_event(topology, bus, train, None).await?;
        }
        TrainEvent::StopRequested(request) => {
            apply_stop_request(bus, train, *request).await;
        }
    }

    Ok(follow_on)
}

/// Runs the manual (operator-driven) handler set for a single `event`.
async fn run_manual<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    bus: &mut dyn CommandInterface<L, S>,
    train: &mut Train<L>,
    event: &TrainEvent,
) -> Result<Vec<TrainEvent>> {
    let mut follow_on = Vec::new();
    match event {
        TrainEvent::FeedbackTriggered(feedback) => {
            let direction = train.body_direction_travel();
            if let Some(current_block) = train.current_block.clone() {
                if let Some(index) =
                    local_feedback_index(topology, &current_block, feedback).await?
                {
                    follow_on.extend(
                        automatic::move_within_block(
                            topology,
                            train,
                            &current_block,
                            index,
                            direction,
                            false,
                        )
                        .await?,
                    );
                }

                if let Some((next_block, _)) =
                    topology.next_block(&current_block, direction).await?
                {
                    if let Some(index) =
                        local_feedback_index(topology, &next_block, feedback).await?
                    {
                        follow_on.extend(
                            manual::manual_move_to_next_block(topology, train, index).await?,
                        );
                    }
                }
            }
            follow_on.extend(manual::stop_trigger_detection(topology, bus, train).await?);
        }
        TrainEvent::MovedToNextBlock | TrainEvent::MovedInsideBlock { .. } => {
            follow_on.extend(manual::stop_trigger_detection(topology, bus, train).await?);
        }
        TrainEvent::StopRequested(request) => {
            apply_stop_request(bus, train, *request).await;
        }
        TrainEvent::SchedulingChanged
        | TrainEvent::RestartTimerFired
        | TrainEvent::StateChanged => {}
    }
    Ok(follow_on)
}

/// Applies an operator- or handler-issued stop request directly to the
/// bus/train state, independent of whichever handler set is active.
/// `AtNextStation` is expressed by switching scheduling to
/// `AutomaticFinishing`, reusing `DetectStop`'s existing
/// finishing-vs-restart branch rather than adding a second code path.
async fn apply_stop_request<L: AddressType, S: AddressType>(
    bus: &mut dyn CommandInterface<L, S>,
    train: &mut Train<L>,
    request: StopRequest,
) {
    match request {
        StopRequest::Immediate => {
            train.speed.requested = Kph::ZERO;
            let _ = bus
                .execute(Command::SetLocoSpeed {
                    address: train.locomotive_address,
                    speed: Kph::ZERO,
                })
                .await;
            train.state = TrainState::Stopping;
            train.stop_trigger = crate::model::StopTrigger::StopCompletely;
        }
        StopRequest::AtNextStation => {
            train.scheduling = Scheduling::AutomaticFinishing;
        }
        StopRequest::AtNextStationThenRestart(_) => {}
    }
}

/// Drains `initial` and every follow-on event it produces to
/// completion for a single train, choosing the automatic or manual
/// handler set for each event from the train's *current* scheduling
/// (which a handler may itself change mid-drain, e.g. via
/// `apply_stop_request`).
pub async fn dispatch<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    config: &RuntimeConfig,
    bus: &mut dyn CommandInterface<L, S>,
    train: &mut Train<L>,
    mut route: Option<&mut Route>,
    initial: Vec<TrainEvent>,
) -> Result<()> {
    let mut queue: VecDeque<TrainEvent> = initial.into();

    while let Some(event) = queue.pop_front() {
        let automatic_mode = matches!(
            train.scheduling,
            Scheduling::AutomaticRunning | Scheduling::AutomaticFinishing
        );

        let follow_on = if automatic_mode {
            run_automatic(topology, config, bus, train, route.as_deref_mut(), &event).await?
        } else {
            run_manual(topology, bus, train, &event).await?
        };
        queue.extend(follow_on);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusEvent;
    use crate::general::DefaultAddressType;
    use crate::ids::{BlockId, RouteId, TrainId, TransitionId};
    use crate::model::{
        Block, BlockCategory, DecoderFamily, ElementRef, Route, RouteMode, RouteStep, Transition,
        NEXT, PREVIOUS,
    };
    use crate::topology::TopologyBuilder;
    use async_trait::async_trait;

    struct NullBus;

    #[async_trait]
    impl CommandInterface for NullBus {
        async fn execute(&mut self, _command: Command) -> std::io::Result<()> {
            Ok(())
        }
        async fn next_event(&mut self) -> std::io::Result<Option<BusEvent>> {
            Ok(None)
        }
        async fn connect(&mut self) -> std::io::Result<()> {
            Ok(())
        }
        async fn disconnect(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn two_block_topology() -> Topology {
        let mut builder =
            TopologyBuilder::<DefaultAddressType, DefaultAddressType, DefaultAddressType>::new();
        let mut a = Block::new(BlockId::new("a"), "A", BlockCategory::Free);
        a.feedbacks = vec![FeedbackId::new("fa")];
        let mut b = Block::new(BlockId::new("b"), "B", BlockCategory::Station);
        b.feedbacks = vec![FeedbackId::new("fb")];
        builder.add_block(a);
        builder.add_block(b);
        builder
            .add_transition(Transition::new(
                TransitionId::new("a-b"),
                (ElementRef::Block(BlockId::new("a")), NEXT),
                (ElementRef::Block(BlockId::new("b")), PREVIOUS),
            ))
            .unwrap();
        builder.build()
    }

    #[tokio::test]
    async fn scheduling_changed_starts_a_waiting_train() {
        let topo = two_block_topology();
        let config = RuntimeConfig::default();
        let mut bus = NullBus;
        let mut train = Train::new(TrainId::new("t1"), "Loco 1", 3u16);
        train.decoder_family = DecoderFamily::Generic28Step;
        train.current_block = Some(BlockId::new("a"));
        train.scheduling = Scheduling::AutomaticRunning;

        let mut route = Route::new(
            RouteId::new("r1"),
            vec![
                RouteStep {
                    block: BlockId::new("a"),
                    direction: crate::model::TravelDirection::Next,
                    waiting_time: None,
                },
                RouteStep {
                    block: BlockId::new("b"),
                    direction: crate::model::TravelDirection::Next,
                    waiting_time: None,
                },
            ],
            RouteMode::Fixed,
        );

        dispatch(
            &topo,
            &config,
            &mut bus,
            &mut train,
            Some(&mut route),
            vec![TrainEvent::SchedulingChanged],
        )
        .await
        .unwrap();

        assert_eq!(train.state, TrainState::Running);
        assert!(train.speed.current == Kph::ZERO || train.speed.requested != Kph::ZERO);

        let b_reservation = topo
            .block(&BlockId::new("b"))
            .unwrap()
            .lock()
            .await
            .reservation
            .clone();
        assert_eq!(b_reservation.unwrap().train, train.id);
    }
}
