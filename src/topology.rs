//! The layout's topology graph: blocks, turnouts and feedbacks wired
//! together by transitions, plus the registries that own every entity
//! by id.
//!
//! Structurally this mirrors the teacher's `Railroad`/`Builder` split —
//! an append-only `Builder` that assembles a `petgraph::DiGraph` and
//! per-kind registries, consumed into an immutable-shape `Topology`
//! whose entities are still individually mutable behind `Mutex` — but
//! the graph itself now carries one node per `(element, socket)` pair
//! rather than one node per sensor/switch/signal, since sockets (not
//! whole elements) are what transitions actually connect.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tokio::sync::Mutex;

use crate::error::{LayoutError, Result};
use crate::general::{AddressType, DefaultAddressType};
use crate::ids::{BlockId, FeedbackId, RouteId, TrainId, TransitionId, TurnoutId};
use crate::model::{
    Block, ElementRef, Feedback, Route, Socket, TravelDirection, Train, Transition, Turnout,
    TurnoutCategory,
};

/// A graph node: one socket of one element. Two nodes joined by an
/// edge means a [`Transition`] physically links those sockets.
pub type GraphNode = (ElementRef, Socket);

type Registry<K, V> = HashMap<K, Mutex<V>>;

/// The assembled layout: topology graph plus every entity registry,
/// ready for the path finder, reservation engine and controller to
/// operate on.
pub struct Topology<
    SwitchAddr: AddressType = DefaultAddressType,
    DeviceAddr: AddressType = DefaultAddressType,
    LocoAddr: AddressType = DefaultAddressType,
> {
    graph: DiGraph<GraphNode, TransitionId>,
    node_index: HashMap<GraphNode, NodeIndex>,
    /// Turnout categories, mirrored out of the registry so graph
    /// queries that only need the (immutable) geometry don't have to
    /// lock a turnout's `Mutex` just to read it.
    turnout_categories: HashMap<TurnoutId, TurnoutCategory>,
    blocks: Registry<BlockId, Block>,
    turnouts: Registry<TurnoutId, Turnout<SwitchAddr>>,
    feedbacks: Registry<FeedbackId, Feedback<DeviceAddr>>,
    transitions: Registry<TransitionId, Transition>,
    trains: Registry<TrainId, Train<LocoAddr>>,
    routes: Registry<RouteId, Route>,
}

impl<SwitchAddr: AddressType, DeviceAddr: AddressType, LocoAddr: AddressType>
    Topology<SwitchAddr, DeviceAddr, LocoAddr>
{
    pub fn block(&self, id: &BlockId) -> Result<&Mutex<Block>> {
        self.blocks.get(id).ok_or_else(|| LayoutError::UnknownBlock(id.clone()))
    }

    pub fn turnout(&self, id: &TurnoutId) -> Result<&Mutex<Turnout<SwitchAddr>>> {
        self.turnouts
            .get(id)
            .ok_or_else(|| LayoutError::UnknownTurnout(id.clone()))
    }

    pub fn feedback(&self, id: &FeedbackId) -> Result<&Mutex<Feedback<DeviceAddr>>> {
        self.feedbacks
            .get(id)
            .ok_or_else(|| LayoutError::UnknownFeedback(id.clone()))
    }

    pub fn transition(&self, id: &TransitionId) -> Result<&Mutex<Transition>> {
        self.transitions
            .get(id)
            .ok_or_else(|| LayoutError::UnknownTransition(id.clone()))
    }

    pub fn train(&self, id: &TrainId) -> Result<&Mutex<Train<LocoAddr>>> {
        self.trains.get(id).ok_or_else(|| LayoutError::UnknownTrain(id.clone()))
    }

    pub fn route(&self, id: &RouteId) -> Result<&Mutex<Route>> {
        self.routes.get(id).ok_or_else(|| LayoutError::UnknownRoute(id.clone()))
    }

    pub fn block_ids(&self) -> impl Iterator<Item = &BlockId> {
        self.blocks.keys()
    }

    pub fn turnout_ids(&self) -> impl Iterator<Item = &TurnoutId> {
        self.turnouts.keys()
    }

    pub fn feedback_ids(&self) -> impl Iterator<Item = &FeedbackId> {
        self.feedbacks.keys()
    }

    pub fn transition_ids(&self) -> impl Iterator<Item = &TransitionId> {
        self.transitions.keys()
    }

    pub fn train_ids(&self) -> impl Iterator<Item = &TrainId> {
        self.trains.keys()
    }

    pub fn route_ids(&self) -> impl Iterator<Item = &RouteId> {
        self.routes.keys()
    }

    pub fn graph(&self) -> &DiGraph<GraphNode, TransitionId> {
        &self.graph
    }

    pub fn node_index_of(&self, element: &ElementRef, socket: Socket) -> Option<NodeIndex> {
        self.node_index.get(&(element.clone(), socket)).copied()
    }

    /// The other end of whatever single transition leaves `(element,
    /// socket)`, if one is wired there. A socket has at most one
    /// transition attached (invariant enforced at build time).
    pub fn neighbor(&self, element: &ElementRef, socket: Socket) -> Option<GraphNode> {
        let node = *self.node_index.get(&(element.clone(), socket))?;
        self.graph
            .neighbors_directed(node, Direction::Outgoing)
            .next()
            .map(|n| self.graph[n].clone())
    }

    /// All sockets reachable in one step from `(element, entry_socket)`
    /// by walking through this element — a block only ever has its
    /// other socket, a turnout delegates to its category geometry —
    /// and then across the transition wired at each exit.
    pub fn step(&self, element: &ElementRef, entry_socket: Socket) -> Vec<(Socket, GraphNode)> {
        match element {
            ElementRef::Block(_) => {
                let exit = if entry_socket == crate::model::PREVIOUS {
                    crate::model::NEXT
                } else {
                    crate::model::PREVIOUS
                };
                self.neighbor(element, exit)
                    .map(|n| vec![(exit, n)])
                    .unwrap_or_default()
            }
            ElementRef::Turnout(id) => {
                let Some(category) = self.turnout_categories.get(id).copied() else {
                    return Vec::new();
                };
                category
                    .exits_from(entry_socket)
                    .into_iter()
                    .filter_map(|(exit_socket, _state)| {
                        self.neighbor(element, exit_socket)
                            .map(|n| (exit_socket, n))
                    })
                    .collect()
            }
        }
    }

    /// Walks forward from `from` (traveling `direction`) along the
    /// layout's *current physical state* — following each turnout's
    /// actual thrown position rather than searching — until a block is
    /// reached or the track runs out. This is what a manually driven
    /// train (no planned route) actually rolls onto next.
    pub async fn next_block(
        &self,
        from: &BlockId,
        direction: TravelDirection,
    ) -> Result<Option<(BlockId, TravelDirection)>> {
        let mut current = self.neighbor(&ElementRef::Block(from.clone()), direction.exit_socket());

        loop {
            match current {
                None => return Ok(None),
                Some((ElementRef::Block(id), entry_socket)) => {
                    return Ok(Some((id, TravelDirection::from_entry_socket(entry_socket))));
                }
                Some((ElementRef::Turnout(id), entry_socket)) => {
                    let state = self.turnout(&id)?.lock().await.state;
                    let category = self
                        .turnout_categories
                        .get(&id)
                        .copied()
                        .ok_or_else(|| LayoutError::UnknownTurnout(id.clone()))?;
                    let exit_socket = category
                        .exits_from(entry_socket)
                        .into_iter()
                        .find(|(_, s)| *s == state)
                        .map(|(socket, _)| socket);
                    let Some(exit_socket) = exit_socket else {
                        return Ok(None);
                    };
                    current = self.neighbor(&ElementRef::Turnout(id), exit_socket);
                }
            }
        }
    }
}

/// Assembles a [`Topology`]. Elements and transitions are added in any
/// order; [`TopologyBuilder::build`] validates every transition
/// endpoint resolves to a registered element/socket before handing
/// back the immutable-shape graph.
pub struct TopologyBuilder<
    SwitchAddr: AddressType = DefaultAddressType,
    DeviceAddr: AddressType = DefaultAddressType,
    LocoAddr: AddressType = DefaultAddressType,
> {
    graph: DiGraph<GraphNode, TransitionId>,
    node_index: HashMap<GraphNode, NodeIndex>,
    blocks: HashMap<BlockId, Block>,
    turnouts: HashMap<TurnoutId, Turnout<SwitchAddr>>,
    feedbacks: HashMap<FeedbackId, Feedback<DeviceAddr>>,
    transitions: HashMap<TransitionId, Transition>,
    trains: HashMap<TrainId, Train<LocoAddr>>,
    routes: HashMap<RouteId, Route>,
}

impl<SwitchAddr: AddressType, DeviceAddr: AddressType, LocoAddr: AddressType> Default
    for TopologyBuilder<SwitchAddr, DeviceAddr, LocoAddr>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<SwitchAddr: AddressType, DeviceAddr: AddressType, LocoAddr: AddressType>
    TopologyBuilder<SwitchAddr, DeviceAddr, LocoAddr>
{
    pub fn new() -> Self {
        TopologyBuilder {
            graph: DiGraph::new(),
            node_index: HashMap::new(),
            blocks: HashMap::new(),
            turnouts: HashMap::new(),
            feedbacks: HashMap::new(),
            transitions: HashMap::new(),
            trains: HashMap::new(),
            routes: HashMap::new(),
        }
    }

    fn node_for(&mut self, element: ElementRef, socket: Socket) -> NodeIndex {
        *self
            .node_index
            .entry((element.clone(), socket))
            .or_insert_with(|| self.graph.add_node((element, socket)))
    }

    pub fn add_block(&mut self, block: Block) -> &mut Self {
        for &socket in block.sockets() {
            self.node_for(ElementRef::Block(block.id.clone()), socket);
        }
        self.blocks.insert(block.id.clone(), block);
        self
    }

    pub fn add_turnout(&mut self, turnout: Turnout<SwitchAddr>) -> &mut Self {
        for &socket in turnout.category.sockets() {
            self.node_for(ElementRef::Turnout(turnout.id.clone()), socket);
        }
        self.turnouts.insert(turnout.id.clone(), turnout);
        self
    }

    pub fn add_feedback(&mut self, feedback: Feedback<DeviceAddr>) -> &mut Self {
        self.feedbacks.insert(feedback.id.clone(), feedback);
        self
    }

    pub fn add_train(&mut self, train: Train<LocoAddr>) -> &mut Self {
        self.trains.insert(train.id.clone(), train);
        self
    }

    pub fn add_route(&mut self, route: Route) -> &mut Self {
        self.routes.insert(route.id.clone(), route);
        self
    }

    /// Wires a transition between two `(element, socket)` endpoints.
    /// Both directions are added to the graph so traversal can walk
    /// either way across the link (spec §4.2: transitions are
    /// undirected).
    pub fn add_transition(&mut self, transition: Transition) -> Result<&mut Self> {
        let a = transition.a.clone();
        let b = transition.b.clone();
        self.require_socket(&a)?;
        self.require_socket(&b)?;

        let node_a = self.node_for(a.0.clone(), a.1);
        let node_b = self.node_for(b.0.clone(), b.1);
        self.graph.add_edge(node_a, node_b, transition.id.clone());
        self.graph.add_edge(node_b, node_a, transition.id.clone());

        self.transitions.insert(transition.id.clone(), transition);
        Ok(self)
    }

    fn require_socket(&self, endpoint: &GraphNode) -> Result<()> {
        let (element, socket) = endpoint;
        let valid = match element {
            ElementRef::Block(id) => self
                .blocks
                .get(id)
                .ok_or_else(|| LayoutError::UnknownBlock(id.clone()))?
                .sockets()
                .contains(socket),
            ElementRef::Turnout(id) => self
                .turnouts
                .get(id)
                .ok_or_else(|| LayoutError::UnknownTurnout(id.clone()))?
                .category
                .sockets()
                .contains(socket),
        };
        if valid {
            Ok(())
        } else {
            Err(LayoutError::UnknownSocket {
                element: format!("{element:?}"),
                socket: *socket,
            })
        }
    }

    pub fn build(self) -> Topology<SwitchAddr, DeviceAddr, LocoAddr> {
        let turnout_categories = self
            .turnouts
            .iter()
            .map(|(id, turnout)| (id.clone(), turnout.category))
            .collect();
        Topology {
            graph: self.graph,
            node_index: self.node_index,
            turnout_categories,
            blocks: self.blocks.into_iter().map(|(k, v)| (k, Mutex::new(v))).collect(),
            turnouts: self.turnouts.into_iter().map(|(k, v)| (k, Mutex::new(v))).collect(),
            feedbacks: self.feedbacks.into_iter().map(|(k, v)| (k, Mutex::new(v))).collect(),
            transitions: self.transitions.into_iter().map(|(k, v)| (k, Mutex::new(v))).collect(),
            trains: self.trains.into_iter().map(|(k, v)| (k, Mutex::new(v))).collect(),
            routes: self.routes.into_iter().map(|(k, v)| (k, Mutex::new(v))).collect(),
        }
    }
}
