//! The layout controller (spec §4.5 "outer loop"): the single runtime
//! task that owns the topology, the control bus, every train's route,
//! the restart-timer registry, and fans `RuntimeInput` out into
//! per-train [`crate::controller::dispatch`] calls.
//!
//! Grounded on the teacher's `Railroad::run` event loop
//! (`railroad.rs`), which drains a channel of incoming bus/operator
//! events to completion before taking the next one — generalized here
//! from the teacher's `broadcast` fan-out (many subscribers) to a
//! unicast `mpsc::UnboundedReceiver<RuntimeInput>`, since §5's ordering
//! guarantee needs exactly one consumer.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bus::{BusEvent, Command, CommandInterface};
use crate::config::RuntimeConfig;
use crate::controller::events::{StopRequest, TrainEvent};
use crate::diagnostics::{self, Finding};
use crate::error::Result;
use crate::general::AddressType;
use crate::ids::{BlockId, RouteId, TrainId};
use crate::model::{Route, RouteMode, Scheduling};
use crate::pathfinder::{self, Constraints};
use crate::topology::Topology;

/// What how-to-discover-locomotives means for [`OperatorCommand::DiscoverLocomotives`]
/// (spec §6 "Operator-visible commands").
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DiscoveryMode {
    Merge,
    Replace,
}

/// Operator-issued commands (spec §6).
#[derive(Debug, Clone)]
pub enum OperatorCommand {
    Start {
        train: TrainId,
        route: RouteId,
        destination: Option<BlockId>,
    },
    Stop {
        train: TrainId,
        completely: bool,
    },
    Finish(TrainId),
    DiscoverLocomotives(DiscoveryMode),
    Diagnostics,
    RepairLayout,
}

/// Everything the runtime task can be handed (spec §4.5 "Receives").
/// `ImportLayout` is deliberately absent: swapping the whole topology
/// out from under a running controller is a restart operation, not an
/// in-band runtime input — callers stop the task, call
/// [`crate::persistence::load`], and start a fresh [`LayoutController`].
#[derive(Debug, Clone)]
pub enum RuntimeInput<LocoAddr: AddressType = crate::general::DefaultAddressType> {
    Bus(BusEvent<LocoAddr>),
    RestartTimerFired(TrainId),
    Operator(OperatorCommand),
}

/// A synchronous hook called once at the end of processing each
/// [`RuntimeInput`] (spec §9 "a minimal change-notification hook... a
/// callback list"), so a view layer can refresh without being woven
/// into the runtime task itself.
pub type ChangeHook = Arc<dyn Fn() + Send + Sync>;

/// Owns the topology, bus, routes, restart timers and change hooks;
/// [`LayoutController::run`] is the single task that drains
/// `RuntimeInput`s to completion per spec §5's FIFO ordering guarantee.
pub struct LayoutController<
    SwitchAddr: AddressType = crate::general::DefaultAddressType,
    DeviceAddr: AddressType = crate::general::DefaultAddressType,
    LocoAddr: AddressType = crate::general::DefaultAddressType,
> {
    topology: Topology<SwitchAddr, DeviceAddr, LocoAddr>,
    config: RuntimeConfig,
    bus: Box<dyn CommandInterface<LocoAddr, SwitchAddr>>,
    routes: HashMap<TrainId, Route>,
    restart_timers: HashMap<TrainId, JoinHandle<()>>,
    hooks: Vec<ChangeHook>,
    last_diagnostics: Vec<Finding>,
    /// A handle back onto the controller's own input queue, so a fired
    /// restart timer re-enters `run`'s loop as an ordinary
    /// `RuntimeInput` instead of calling back into `self` from a
    /// detached task.
    requeue: mpsc::UnboundedSender<RuntimeInput<LocoAddr>>,
}

impl<SwitchAddr: AddressType, DeviceAddr: AddressType, LocoAddr: AddressType>
    LayoutController<SwitchAddr, DeviceAddr, LocoAddr>
{
    pub fn new(
        topology: Topology<SwitchAddr, DeviceAddr, LocoAddr>,
        config: RuntimeConfig,
        bus: Box<dyn CommandInterface<LocoAddr, SwitchAddr>>,
        requeue: mpsc::UnboundedSender<RuntimeInput<LocoAddr>>,
    ) -> Self {
        LayoutController {
            topology,
            config,
            bus,
            routes: HashMap::new(),
            restart_timers: HashMap::new(),
            hooks: Vec::new(),
            last_diagnostics: Vec::new(),
            requeue,
        }
    }

    pub fn topology(&self) -> &Topology<SwitchAddr, DeviceAddr, LocoAddr> {
        &self.topology
    }

    /// Registers a callback invoked synchronously at the end of every
    /// processed input. Mutations inside the runtime task call every
    /// registered hook in order once the input is fully handled.
    pub fn on_change(&mut self, hook: ChangeHook) {
        self.hooks.push(hook);
    }

    fn notify(&self) {
        for hook in &self.hooks {
            hook();
        }
    }

    /// Drains `inputs` to exhaustion, one message at a time, running
    /// each to completion (including every follow-on `TrainEvent`)
    /// before the next is taken — spec §5's "within a single dequeued
    /// message, the event fan-out... runs to completion before the
    /// next input message is taken".
    pub async fn run(&mut self, mut inputs: mpsc::UnboundedReceiver<RuntimeInput<LocoAddr>>) {
        while let Some(input) = inputs.recv().await {
            if let Err(err) = self.handle(input).await {
                tracing::error!(error = %err, "runtime input handling failed");
            }
            self.notify();
        }
    }

    async fn handle(&mut self, input: RuntimeInput<LocoAddr>) -> Result<()> {
        match input {
            RuntimeInput::Bus(event) => self.handle_bus_event(event).await,
            RuntimeInput::RestartTimerFired(train) => {
                self.restart_timers.remove(&train);
                self.dispatch_train(&train, vec![TrainEvent::RestartTimerFired]).await
            }
            RuntimeInput::Operator(command) => self.handle_operator_command(command).await,
        }
    }

    async fn handle_bus_event(&mut self, event: BusEvent<LocoAddr>) -> Result<()> {
        match event {
            BusEvent::FeedbackChanged { contact, occupied } if occupied => {
                let feedback = self.feedback_id_for_contact(contact).await;
                if let Some(feedback) = feedback {
                    let trains: Vec<TrainId> = self.topology.train_ids().cloned().collect();
                    for train in trains {
                        self.dispatch_train(&train, vec![TrainEvent::FeedbackTriggered(feedback.clone())])
                            .await?;
                    }
                }
                Ok(())
            }
            BusEvent::FeedbackChanged { .. } => Ok(()),
            BusEvent::LocoDirectionReported { address, direction } => {
                let train = self.train_id_for_address(address).await;
                if let Some(train) = train {
                    let mut locked = self.topology.train(&train)?.lock().await;
                    locked.body_direction = direction;
                }
                Ok(())
            }
            BusEvent::Acknowledged | BusEvent::Rejected => Ok(()),
        }
    }

    async fn feedback_id_for_contact(&self, contact: u8) -> Option<crate::ids::FeedbackId> {
        for id in self.topology.feedback_ids() {
            let Ok(mutex) = self.topology.feedback(id) else { continue };
            let mut feedback = mutex.lock().await;
            if feedback.address.contact == contact {
                feedback.detected = true;
                return Some(id.clone());
            }
        }
        None
    }

    async fn train_id_for_address(&self, address: LocoAddr) -> Option<TrainId> {
        for id in self.topology.train_ids() {
            let Ok(mutex) = self.topology.train(id) else { continue };
            if mutex.lock().await.locomotive_address == address {
                return Some(id.clone());
            }
        }
        None
    }

    async fn handle_operator_command(&mut self, command: OperatorCommand) -> Result<()> {
        match command {
            OperatorCommand::Start { train, route, destination } => {
                self.start_train(&train, &route, destination).await
            }
            OperatorCommand::Stop { train, completely } => {
                let request = if completely {
                    StopRequest::Immediate
                } else {
                    StopRequest::AtNextStation
                };
                self.dispatch_train(&train, vec![TrainEvent::StopRequested(request)]).await
            }
            OperatorCommand::Finish(train) => {
                if let Ok(mutex) = self.topology.train(&train) {
                    mutex.lock().await.scheduling = Scheduling::AutomaticFinishing;
                }
                self.dispatch_train(&train, vec![TrainEvent::SchedulingChanged]).await
            }
            OperatorCommand::DiscoverLocomotives(_mode) => {
                self.bus.execute(Command::QueryLocomotives).await.ok();
                Ok(())
            }
            OperatorCommand::Diagnostics => {
                self.last_diagnostics = diagnostics::diagnose(&self.topology).await;
                Ok(())
            }
            OperatorCommand::RepairLayout => {
                let repairs = diagnostics::repair(&self.topology).await;
                tracing::info!(repairs, "layout repair pass complete");
                Ok(())
            }
        }
    }

    /// The most recent [`Finding`] list produced by `Diagnostics`.
    pub fn last_diagnostics(&self) -> &[Finding] {
        &self.last_diagnostics
    }

    async fn start_train(
        &mut self,
        train: &TrainId,
        route: &RouteId,
        destination: Option<BlockId>,
    ) -> Result<()> {
        let route = if let Some(destination) = destination {
            let mut locked = self.topology.train(train)?.lock().await;
            let direction = locked.body_direction_travel();
            let current_block = locked.current_block.clone();
            drop(locked);
            let Some(from) = current_block else {
                return Ok(());
            };
            let constraints = Constraints::new(train.clone());
            let settings = pathfinder::Settings::from_config(&self.config);
            let ahead =
                pathfinder::find_path(&self.topology, &from, direction, Some(&destination), &constraints, &settings)
                    .await?;
            Route::new(
                route.clone(),
                crate::controller::automatic::with_current_step(from, direction, ahead),
                RouteMode::AutomaticOnce {
                    destination,
                    direction: None,
                },
            )
        } else if let Ok(mutex) = self.topology.route(route) {
            mutex.lock().await.clone()
        } else {
            Route::new(route.clone(), Vec::new(), RouteMode::Automatic)
        };
        self.routes.insert(train.clone(), route);

        {
            let mut locked = self.topology.train(train)?.lock().await;
            locked.scheduling = Scheduling::AutomaticRunning;
            locked.route_step_index = 0;
        }
        self.dispatch_train(train, vec![TrainEvent::SchedulingChanged]).await
    }

    /// Runs `events` (and every follow-on event) through a single
    /// train's handler pipeline, locking the train (and its route, if
    /// it has one) for the duration.
    async fn dispatch_train(&mut self, train: &TrainId, events: Vec<TrainEvent>) -> Result<()> {
        let pending_restart = {
            let mutex = self.topology.train(train)?;
            let mut locked = mutex.lock().await;
            let route = self.routes.get_mut(train);

            crate::controller::dispatch(
                &self.topology,
                &self.config,
                self.bus.as_mut(),
                &mut locked,
                route,
                events,
            )
            .await?;

            restart_delay(&locked.stop_trigger)
        };

        if let StopTriggerRestart::Scheduled(delay) = pending_restart {
            self.arm_restart_timer(train.clone(), delay);
        }
        Ok(())
    }

    /// Cancels any existing timer for `train` and spawns a fresh one.
    /// Firing sends `RestartTimerFired` back onto this controller's own
    /// input queue, so the wakeup is handled by the next `run` iteration
    /// like any other input rather than racing `self` from a detached task.
    fn arm_restart_timer(&mut self, train: TrainId, delay: std::time::Duration) {
        if let Some(previous) = self.restart_timers.remove(&train) {
            previous.abort();
        }
        let requeue = self.requeue.clone();
        let fired_for = train.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = requeue.send(RuntimeInput::RestartTimerFired(fired_for));
        });
        self.restart_timers.insert(train, handle);
    }
}

enum StopTriggerRestart {
    None,
    Scheduled(std::time::Duration),
}

fn restart_delay(trigger: &crate::model::StopTrigger) -> StopTriggerRestart {
    match trigger {
        crate::model::StopTrigger::StopAndRestart(delay) => StopTriggerRestart::Scheduled(*delay),
        _ => StopTriggerRestart::None,
    }
}

/// Builds a [`LayoutController`] wired to its own input queue and
/// spawns its `run` loop as a background task. The returned
/// `UnboundedSender` is how a bus-reader task, a timer, or an operator
/// UI enqueues [`RuntimeInput`] — the same queue restart timers requeue
/// onto internally.
pub fn spawn<SwitchAddr, DeviceAddr, LocoAddr>(
    topology: Topology<SwitchAddr, DeviceAddr, LocoAddr>,
    config: RuntimeConfig,
    bus: Box<dyn CommandInterface<LocoAddr, SwitchAddr>>,
) -> (mpsc::UnboundedSender<RuntimeInput<LocoAddr>>, JoinHandle<()>)
where
    SwitchAddr: AddressType,
    DeviceAddr: AddressType,
    LocoAddr: AddressType,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let mut controller = LayoutController::new(topology, config, bus, tx.clone());
    let handle = tokio::spawn(async move {
        controller.run(rx).await;
    });
    (tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::general::DefaultAddressType;
    use crate::ids::{BlockId, FeedbackId, TransitionId};
    use crate::model::{Block, BlockCategory, DecoderFamily, ElementRef, Train, NEXT, PREVIOUS};
    use crate::topology::TopologyBuilder;
    use async_trait::async_trait;

    struct NullBus {
        sent: Vec<Command>,
    }

    #[async_trait]
    impl CommandInterface for NullBus {
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

    fn two_block_topology() -> Topology {
        let mut builder =
            TopologyBuilder::<DefaultAddressType, DefaultAddressType, DefaultAddressType>::new();
        let mut a = Block::new(BlockId::new("a"), "A", BlockCategory::Free);
        a.feedbacks = vec![FeedbackId::new("fa")];
        let mut b = Block::new(BlockId::new("b"), "B", BlockCategory::Station);
        b.feedbacks = vec![FeedbackId::new("fb")];
        builder.add_block(a);
        builder.add_block(b);
        builder.add_feedback(crate::model::Feedback::new(
            FeedbackId::new("fb"),
            crate::model::HardwareAddress { device: 1u16, contact: 5 },
        ));
        let mut train = Train::new(TrainId::new("t1"), "Loco 1", 3u16);
        train.decoder_family = DecoderFamily::Generic28Step;
        train.current_block = Some(BlockId::new("a"));
        builder.add_train(train);
        builder
            .add_transition(Transition::new(
                TransitionId::new("a-b"),
                (ElementRef::Block(BlockId::new("a")), NEXT),
                (ElementRef::Block(BlockId::new("b")), PREVIOUS),
            ))
            .unwrap();
        builder.build()
    }

    use crate::model::Transition;

    #[tokio::test]
    async fn diagnostics_command_populates_findings() {
        let topo = two_block_topology();
        let (requeue, _rx) = mpsc::unbounded_channel();
        let mut controller = LayoutController::new(
            topo,
            RuntimeConfig::default(),
            Box::new(NullBus { sent: Vec::new() }),
            requeue,
        );

        controller
            .handle(RuntimeInput::Operator(OperatorCommand::Diagnostics))
            .await
            .unwrap();

        assert!(!controller.last_diagnostics().is_empty());
    }

    #[tokio::test]
    async fn feedback_change_reaches_the_occupying_train() {
        let topo = two_block_topology();
        let (requeue, _rx) = mpsc::unbounded_channel();
        let mut controller = LayoutController::new(
            topo,
            RuntimeConfig::default(),
            Box::new(NullBus { sent: Vec::new() }),
            requeue,
        );

        controller
            .handle(RuntimeInput::Bus(BusEvent::FeedbackChanged { contact: 5, occupied: true }))
            .await
            .unwrap();

        let detected = controller
            .topology()
            .feedback(&FeedbackId::new("fb"))
            .unwrap()
            .try_lock()
            .map(|f| f.detected)
            .unwrap_or(false);
        assert!(detected);
    }
}
