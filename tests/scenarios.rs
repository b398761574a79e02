//! End-to-end scenarios driving the public controller/reservation/path
//! finder surface the way a real layout runtime would, one dispatch
//! call at a time, asserting on the resulting train/block/turnout
//! state rather than on individual handler return values.

use std::time::Duration;

use async_trait::async_trait;

use layoutlogic::bus::{BusEvent, Command, CommandInterface};
use layoutlogic::config::RuntimeConfig;
use layoutlogic::controller::dispatch;
use layoutlogic::controller::events::TrainEvent;
use layoutlogic::general::{DefaultAddressType, Kph};
use layoutlogic::ids::{BlockId, RouteId, TrainId, TransitionId, TurnoutId};
use layoutlogic::model::{
    Block, BlockCategory, DirectionalFeedback, ElementRef, Reservation, Route, RouteMode,
    RouteStep, Scheduling, StopTrigger, Train, TrainState, Transition, Turnout, TurnoutCategory,
    TurnoutState, TravelDirection, NEXT, PREVIOUS,
};
use layoutlogic::pathfinder::{self, Constraints, Settings};
use layoutlogic::reservation;
use layoutlogic::topology::{Topology, TopologyBuilder};

/// A bus double that records every command it was sent and never
/// produces events of its own, the same shape as the `NullBus`es
/// colocated with the unit tests in `controller::mod` and `layout`.
struct RecordingBus {
    sent: Vec<Command>,
}

impl RecordingBus {
    fn new() -> Self {
        RecordingBus { sent: Vec::new() }
    }
}

#[async_trait]
impl CommandInterface for RecordingBus {
    async fn execute(&mut self, command: Command) -> std::io::Result<()> {
        self.sent.push(command);
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

fn step(block: &str, direction: TravelDirection) -> RouteStep {
    RouteStep {
        block: BlockId::new(block),
        direction,
        waiting_time: None,
    }
}

fn new_train(id: &str, current_block: &str) -> Train<DefaultAddressType> {
    let mut train = Train::new(TrainId::new(id), id, 3u16);
    train.current_block = Some(BlockId::new(current_block));
    train.scheduling = Scheduling::AutomaticRunning;
    train
}

/// Five free/station blocks in a straight line, no turnouts:
/// `s1 -> b1 -> b2 -> b3 -> s2`.
fn single_lap_topology() -> Topology {
    let mut builder = TopologyBuilder::<DefaultAddressType, DefaultAddressType, DefaultAddressType>::new();

    builder.add_block(Block::new(BlockId::new("s1"), "S1", BlockCategory::Station));

    let mut b1 = Block::new(BlockId::new("b1"), "B1", BlockCategory::Free);
    b1.feedbacks = vec![layoutlogic::ids::FeedbackId::new("f_b1")];
    builder.add_block(b1);

    let mut b2 = Block::new(BlockId::new("b2"), "B2", BlockCategory::Free);
    b2.feedbacks = vec![layoutlogic::ids::FeedbackId::new("f_b2")];
    builder.add_block(b2);

    let mut b3 = Block::new(BlockId::new("b3"), "B3", BlockCategory::Free);
    b3.feedbacks = vec![layoutlogic::ids::FeedbackId::new("f_b3")];
    builder.add_block(b3);

    let mut s2 = Block::new(BlockId::new("s2"), "S2", BlockCategory::Station);
    let f_s2 = layoutlogic::ids::FeedbackId::new("f_s2");
    s2.feedbacks = vec![f_s2];
    s2.brake_feedback = DirectionalFeedback { next: Some(0), previous: None };
    s2.stop_feedback = DirectionalFeedback { next: Some(0), previous: None };
    builder.add_block(s2);

    builder
        .add_transition(Transition::new(
            TransitionId::new("s1-b1"),
            (ElementRef::Block(BlockId::new("s1")), NEXT),
            (ElementRef::Block(BlockId::new("b1")), PREVIOUS),
        ))
        .unwrap();
    builder
        .add_transition(Transition::new(
            TransitionId::new("b1-b2"),
            (ElementRef::Block(BlockId::new("b1")), NEXT),
            (ElementRef::Block(BlockId::new("b2")), PREVIOUS),
        ))
        .unwrap();
    builder
        .add_transition(Transition::new(
            TransitionId::new("b2-b3"),
            (ElementRef::Block(BlockId::new("b2")), NEXT),
            (ElementRef::Block(BlockId::new("b3")), PREVIOUS),
        ))
        .unwrap();
    builder
        .add_transition(Transition::new(
            TransitionId::new("b3-s2"),
            (ElementRef::Block(BlockId::new("b3")), NEXT),
            (ElementRef::Block(BlockId::new("s2")), PREVIOUS),
        ))
        .unwrap();

    builder.build()
}

/// A single train completes a fixed route with a station stop at the
/// end, braking and stopping on the station's feedback, and the
/// scheduling falls back to manual once it's parked.
#[tokio::test]
async fn s1_single_lap_fixed_route_stops_at_the_final_station() {
    let topo = single_lap_topology();
    let config = RuntimeConfig::default();
    let mut bus = RecordingBus::new();
    let mut train = new_train("t1", "s1");

    let mut route = Route::new(
        RouteId::new("r1"),
        vec![
            step("s1", TravelDirection::Next),
            step("b1", TravelDirection::Next),
            step("b2", TravelDirection::Next),
            step("b3", TravelDirection::Next),
            step("s2", TravelDirection::Next),
        ],
        RouteMode::Fixed,
    );

    dispatch(&topo, &config, &mut bus, &mut train, Some(&mut route), vec![TrainEvent::SchedulingChanged])
        .await
        .unwrap();
    assert_eq!(train.state, TrainState::Running);
    assert_eq!(train.speed.requested, Kph(60));

    let b1_reserved = topo.block(&BlockId::new("b1")).unwrap().lock().await.reservation.clone();
    assert_eq!(b1_reserved.unwrap().train, train.id);

    for feedback in ["f_b1", "f_b2", "f_b3"] {
        dispatch(
            &topo,
            &config,
            &mut bus,
            &mut train,
            Some(&mut route),
            vec![TrainEvent::FeedbackTriggered(layoutlogic::ids::FeedbackId::new(feedback))],
        )
        .await
        .unwrap();
    }
    assert_eq!(train.current_block, Some(BlockId::new("b3")));
    assert_eq!(train.route_step_index, 3);
    assert!(topo.block(&BlockId::new("b1")).unwrap().lock().await.reservation.is_none());

    // Entry into s2: crosses f_s2 as the station's entry feedback.
    dispatch(
        &topo,
        &config,
        &mut bus,
        &mut train,
        Some(&mut route),
        vec![TrainEvent::FeedbackTriggered(layoutlogic::ids::FeedbackId::new("f_s2"))],
    )
    .await
    .unwrap();
    assert_eq!(train.current_block, Some(BlockId::new("s2")));
    assert_eq!(train.stop_trigger, StopTrigger::StopCompletely);
    assert_eq!(train.state, TrainState::Running);

    // f_s2 fires again as the brake point (same sensor, see the block's
    // brake/stop feedback selectors both pointing at index 0).
    dispatch(
        &topo,
        &config,
        &mut bus,
        &mut train,
        Some(&mut route),
        vec![TrainEvent::FeedbackTriggered(layoutlogic::ids::FeedbackId::new("f_s2"))],
    )
    .await
    .unwrap();
    assert_eq!(train.state, TrainState::Braking);
    assert_eq!(train.position, 1);

    // f_s2 a third time as the stop point.
    dispatch(
        &topo,
        &config,
        &mut bus,
        &mut train,
        Some(&mut route),
        vec![TrainEvent::FeedbackTriggered(layoutlogic::ids::FeedbackId::new("f_s2"))],
    )
    .await
    .unwrap();
    assert_eq!(train.state, TrainState::Stopped);
    assert_eq!(train.speed.requested, Kph::ZERO);
    assert_eq!(train.scheduling, Scheduling::Manual);
}

/// A branching endless-automatic route reroutes around a block another
/// train already holds, rather than stopping in front of it.
#[tokio::test]
async fn s2_automatic_route_regenerates_around_a_reserved_block() {
    let mut builder = TopologyBuilder::<DefaultAddressType, DefaultAddressType, DefaultAddressType>::new();
    builder.add_block(Block::new(BlockId::new("a"), "A", BlockCategory::Free));
    builder.add_block(Block::new(BlockId::new("b"), "B", BlockCategory::Station));
    builder.add_block(Block::new(BlockId::new("c"), "C", BlockCategory::Station));
    builder.add_turnout(Turnout::<DefaultAddressType>::new(
        TurnoutId::new("t1"),
        TurnoutCategory::SingleLeft,
        vec![7],
    ));
    builder
        .add_transition(Transition::new(
            TransitionId::new("a-t1"),
            (ElementRef::Block(BlockId::new("a")), NEXT),
            (ElementRef::Turnout(TurnoutId::new("t1")), 0),
        ))
        .unwrap();
    builder
        .add_transition(Transition::new(
            TransitionId::new("t1-b"),
            (ElementRef::Turnout(TurnoutId::new("t1")), 1),
            (ElementRef::Block(BlockId::new("b")), PREVIOUS),
        ))
        .unwrap();
    builder
        .add_transition(Transition::new(
            TransitionId::new("t1-c"),
            (ElementRef::Turnout(TurnoutId::new("t1")), 2),
            (ElementRef::Block(BlockId::new("c")), PREVIOUS),
        ))
        .unwrap();
    let topo = builder.build();

    let other_train = TrainId::new("t2");
    topo.block(&BlockId::new("b")).unwrap().lock().await.reservation = Some(Reservation {
        train: other_train,
        direction: TravelDirection::Next,
        leading: false,
    });

    let config = RuntimeConfig::default();
    let mut bus = RecordingBus::new();
    let mut train = new_train("t1", "a");
    let mut route = Route::new(RouteId::new("r1"), Vec::new(), RouteMode::Automatic);

    dispatch(&topo, &config, &mut bus, &mut train, Some(&mut route), vec![TrainEvent::SchedulingChanged])
        .await
        .unwrap();

    assert_eq!(
        route.steps,
        vec![step("a", TravelDirection::Next), step("c", TravelDirection::Next)]
    );
    assert_eq!(train.state, TrainState::Running);

    let t1_state = topo.turnout(&TurnoutId::new("t1")).unwrap().lock().await.state;
    assert_eq!(t1_state, TurnoutState::Branch);

    let c_reservation = topo.block(&BlockId::new("c")).unwrap().lock().await.reservation.clone();
    assert_eq!(c_reservation.unwrap().train, train.id);

    let b_reservation = topo.block(&BlockId::new("b")).unwrap().lock().await.reservation.clone();
    assert_eq!(b_reservation.unwrap().train, TrainId::new("t2"));
}

/// A station stop mid-route arms a timed restart rather than parking
/// the train permanently, and clears the trigger once it resumes.
#[tokio::test]
async fn s3_station_stop_restarts_after_its_timer_fires() {
    let mut builder = TopologyBuilder::<DefaultAddressType, DefaultAddressType, DefaultAddressType>::new();
    builder.add_block(Block::new(BlockId::new("start"), "Start", BlockCategory::Free));

    let mut mid = Block::new(BlockId::new("mid"), "Mid", BlockCategory::Station);
    mid.feedbacks = vec![layoutlogic::ids::FeedbackId::new("m0")];
    mid.brake_feedback = DirectionalFeedback { next: Some(0), previous: None };
    mid.stop_feedback = DirectionalFeedback { next: Some(0), previous: None };
    builder.add_block(mid);

    let mut finish = Block::new(BlockId::new("finish"), "Finish", BlockCategory::Free);
    finish.feedbacks = vec![layoutlogic::ids::FeedbackId::new("e0")];
    builder.add_block(finish);

    builder
        .add_transition(Transition::new(
            TransitionId::new("start-mid"),
            (ElementRef::Block(BlockId::new("start")), NEXT),
            (ElementRef::Block(BlockId::new("mid")), PREVIOUS),
        ))
        .unwrap();
    builder
        .add_transition(Transition::new(
            TransitionId::new("mid-finish"),
            (ElementRef::Block(BlockId::new("mid")), NEXT),
            (ElementRef::Block(BlockId::new("finish")), PREVIOUS),
        ))
        .unwrap();
    let topo = builder.build();

    let config = RuntimeConfig::default();
    let mut bus = RecordingBus::new();
    let mut train = new_train("t1", "start");
    let mut route = Route::new(
        RouteId::new("r1"),
        vec![
            step("start", TravelDirection::Next),
            step("mid", TravelDirection::Next),
            step("finish", TravelDirection::Next),
        ],
        RouteMode::Fixed,
    );

    dispatch(&topo, &config, &mut bus, &mut train, Some(&mut route), vec![TrainEvent::SchedulingChanged])
        .await
        .unwrap();
    assert_eq!(train.state, TrainState::Running);

    // Entering mid arms the restart timer.
    dispatch(
        &topo,
        &config,
        &mut bus,
        &mut train,
        Some(&mut route),
        vec![TrainEvent::FeedbackTriggered(layoutlogic::ids::FeedbackId::new("m0"))],
    )
    .await
    .unwrap();
    assert_eq!(train.current_block, Some(BlockId::new("mid")));
    assert_eq!(train.stop_trigger, StopTrigger::StopAndRestart(Duration::from_secs(10)));
    assert_eq!(train.state, TrainState::Running);

    // Braking.
    dispatch(
        &topo,
        &config,
        &mut bus,
        &mut train,
        Some(&mut route),
        vec![TrainEvent::FeedbackTriggered(layoutlogic::ids::FeedbackId::new("m0"))],
    )
    .await
    .unwrap();
    assert_eq!(train.state, TrainState::Braking);

    // Stopping.
    dispatch(
        &topo,
        &config,
        &mut bus,
        &mut train,
        Some(&mut route),
        vec![TrainEvent::FeedbackTriggered(layoutlogic::ids::FeedbackId::new("m0"))],
    )
    .await
    .unwrap();
    assert_eq!(train.state, TrainState::Stopped);
    assert_eq!(train.scheduling, Scheduling::AutomaticRunning);
    assert_eq!(train.stop_trigger, StopTrigger::StopAndRestart(Duration::from_secs(10)));

    // The layout controller's restart timer fired; the train resumes
    // and, critically, its stop trigger is cleared rather than
    // permanently disabling further leading-block reservation.
    dispatch(&topo, &config, &mut bus, &mut train, Some(&mut route), vec![TrainEvent::RestartTimerFired])
        .await
        .unwrap();
    assert_eq!(train.state, TrainState::Running);
    assert_eq!(train.stop_trigger, StopTrigger::None);
    assert_eq!(train.speed.requested, Kph(60));
}

/// Two trains contend for the same turnout; the second stays put until
/// the first releases it, then takes the branch it actually needs.
#[tokio::test]
async fn s4_two_trains_contend_for_a_shared_turnout() {
    let mut builder = TopologyBuilder::<DefaultAddressType, DefaultAddressType, DefaultAddressType>::new();
    builder.add_block(Block::new(BlockId::new("a"), "A", BlockCategory::Free));
    builder.add_block(Block::new(BlockId::new("b"), "B", BlockCategory::Free));
    builder.add_block(Block::new(BlockId::new("c"), "C", BlockCategory::Free));
    builder.add_turnout(Turnout::<DefaultAddressType>::new(
        TurnoutId::new("t1"),
        TurnoutCategory::ThreeWay,
        vec![9],
    ));
    builder
        .add_transition(Transition::new(
            TransitionId::new("a-t1"),
            (ElementRef::Block(BlockId::new("a")), NEXT),
            (ElementRef::Turnout(TurnoutId::new("t1")), 0),
        ))
        .unwrap();
    builder
        .add_transition(Transition::new(
            TransitionId::new("t1-b"),
            (ElementRef::Turnout(TurnoutId::new("t1")), 1),
            (ElementRef::Block(BlockId::new("b")), PREVIOUS),
        ))
        .unwrap();
    builder
        .add_transition(Transition::new(
            TransitionId::new("t1-c"),
            (ElementRef::Turnout(TurnoutId::new("t1")), 2),
            (ElementRef::Block(BlockId::new("c")), PREVIOUS),
        ))
        .unwrap();
    let topo = builder.build();

    let config = RuntimeConfig::default();
    let mut bus_a = RecordingBus::new();
    let mut train_a = new_train("ta", "a");
    let mut route_a = Route::new(RouteId::new("ra"), vec![step("a", TravelDirection::Next), step("b", TravelDirection::Next)], RouteMode::Fixed);

    dispatch(&topo, &config, &mut bus_a, &mut train_a, Some(&mut route_a), vec![TrainEvent::SchedulingChanged])
        .await
        .unwrap();
    assert_eq!(train_a.state, TrainState::Running);
    let t1_state = topo.turnout(&TurnoutId::new("t1")).unwrap().lock().await.state;
    assert_eq!(t1_state, TurnoutState::Straight);

    let mut bus_b = RecordingBus::new();
    let mut train_b = new_train("tb", "a");
    let mut route_b = Route::new(RouteId::new("rb"), vec![step("a", TravelDirection::Next), step("c", TravelDirection::Next)], RouteMode::Fixed);

    dispatch(&topo, &config, &mut bus_b, &mut train_b, Some(&mut route_b), vec![TrainEvent::SchedulingChanged])
        .await
        .unwrap();
    assert_eq!(train_b.state, TrainState::Stopped);
    assert_eq!(train_b.speed.requested, Kph::ZERO);
    let t1_reservation = topo.turnout(&TurnoutId::new("t1")).unwrap().lock().await.reservation.clone();
    assert_eq!(t1_reservation, Some(train_a.id.clone()));

    // Train A releases its reservation once it reaches b.
    reservation::free_between(&topo, &train_a.id, &route_a, 0, 2).await.unwrap();
    assert!(topo.turnout(&TurnoutId::new("t1")).unwrap().lock().await.reservation.is_none());

    // Train B's next attempt succeeds and throws the turnout its way.
    dispatch(&topo, &config, &mut bus_b, &mut train_b, Some(&mut route_b), vec![TrainEvent::SchedulingChanged])
        .await
        .unwrap();
    assert_eq!(train_b.state, TrainState::Running);
    let t1_state = topo.turnout(&TurnoutId::new("t1")).unwrap().lock().await.state;
    assert_eq!(t1_state, TurnoutState::Left);
}

/// A path through a reversing connection (the kind a point-to-loop
/// wiring uses) correctly flips the travel direction recorded on each
/// step, and the reservation engine can still claim the whole span.
#[tokio::test]
async fn s5_path_through_a_reversing_loop_connection_tracks_direction() {
    let mut builder = TopologyBuilder::<DefaultAddressType, DefaultAddressType, DefaultAddressType>::new();
    builder.add_block(Block::new(BlockId::new("entry"), "Entry", BlockCategory::Free));
    builder.add_block(Block::new(BlockId::new("loop1"), "Loop1", BlockCategory::Free));
    builder.add_block(Block::new(BlockId::new("finish"), "Finish", BlockCategory::Free));

    // Both transitions connect same-named sockets rather than the usual
    // previous<->next pairing, the wiring a reversing loop splice uses.
    builder
        .add_transition(Transition::new(
            TransitionId::new("entry-loop1"),
            (ElementRef::Block(BlockId::new("entry")), NEXT),
            (ElementRef::Block(BlockId::new("loop1")), NEXT),
        ))
        .unwrap();
    builder
        .add_transition(Transition::new(
            TransitionId::new("loop1-finish"),
            (ElementRef::Block(BlockId::new("loop1")), PREVIOUS),
            (ElementRef::Block(BlockId::new("finish")), PREVIOUS),
        ))
        .unwrap();
    let topo = builder.build();

    let constraints = Constraints::new(TrainId::new("t1"));
    let settings = Settings::default();
    let steps = pathfinder::find_path(
        &topo,
        &BlockId::new("entry"),
        TravelDirection::Next,
        Some(&BlockId::new("finish")),
        &constraints,
        &settings,
    )
    .await
    .unwrap();

    assert_eq!(
        steps,
        vec![step("loop1", TravelDirection::Previous), step("finish", TravelDirection::Next)]
    );

    let reserved = reservation::reserve(
        &topo,
        &TrainId::new("t1"),
        &Route::new(RouteId::new("r1"), steps, RouteMode::Fixed),
        BlockId::new("entry"),
        TravelDirection::Next,
        0,
        2,
    )
    .await
    .unwrap();
    assert!(reserved);
    let loop1_reservation = topo.block(&BlockId::new("loop1")).unwrap().lock().await.reservation.clone();
    assert_eq!(loop1_reservation.unwrap().direction, TravelDirection::Previous);
}

/// Reaching the last step of a fixed route arms an unconditional stop,
/// distinct from a station's restart: the train parks and goes manual.
#[tokio::test]
async fn s6_fixed_route_end_stops_completely_and_goes_manual() {
    let mut builder = TopologyBuilder::<DefaultAddressType, DefaultAddressType, DefaultAddressType>::new();
    builder.add_block(Block::new(BlockId::new("a"), "A", BlockCategory::Free));

    let mut terminus = Block::new(BlockId::new("terminus"), "Terminus", BlockCategory::Free);
    let f0 = layoutlogic::ids::FeedbackId::new("f0");
    terminus.feedbacks = vec![f0];
    terminus.brake_feedback = DirectionalFeedback { next: Some(0), previous: None };
    terminus.stop_feedback = DirectionalFeedback { next: Some(0), previous: None };
    builder.add_block(terminus);

    builder
        .add_transition(Transition::new(
            TransitionId::new("a-terminus"),
            (ElementRef::Block(BlockId::new("a")), NEXT),
            (ElementRef::Block(BlockId::new("terminus")), PREVIOUS),
        ))
        .unwrap();
    let topo = builder.build();

    let config = RuntimeConfig::default();
    let mut bus = RecordingBus::new();
    let mut train = new_train("t1", "a");
    let mut route = Route::new(
        RouteId::new("r1"),
        vec![step("a", TravelDirection::Next), step("terminus", TravelDirection::Next)],
        RouteMode::Fixed,
    );

    dispatch(&topo, &config, &mut bus, &mut train, Some(&mut route), vec![TrainEvent::SchedulingChanged])
        .await
        .unwrap();
    assert_eq!(train.state, TrainState::Running);

    dispatch(
        &topo,
        &config,
        &mut bus,
        &mut train,
        Some(&mut route),
        vec![TrainEvent::FeedbackTriggered(layoutlogic::ids::FeedbackId::new("f0"))],
    )
    .await
    .unwrap();
    assert_eq!(train.current_block, Some(BlockId::new("terminus")));
    assert_eq!(train.stop_trigger, StopTrigger::StopCompletely);

    dispatch(
        &topo,
        &config,
        &mut bus,
        &mut train,
        Some(&mut route),
        vec![TrainEvent::FeedbackTriggered(layoutlogic::ids::FeedbackId::new("f0"))],
    )
    .await
    .unwrap();
    assert_eq!(train.state, TrainState::Braking);

    dispatch(
        &topo,
        &config,
        &mut bus,
        &mut train,
        Some(&mut route),
        vec![TrainEvent::FeedbackTriggered(layoutlogic::ids::FeedbackId::new("f0"))],
    )
    .await
    .unwrap();
    assert_eq!(train.state, TrainState::Stopped);
    assert_eq!(train.speed.requested, Kph::ZERO);
    assert_eq!(train.scheduling, Scheduling::Manual);
}
