//! Route discovery: a recursive, backtracking depth-first search over
//! the topology graph (spec §4 "Path finding").
//!
//! The recursion shape follows the teacher's `Signal::neighbours_free`
//! (`components/mod.rs`): an `#[async_recursion]` step function that
//! locks each element it visits just long enough to read its state,
//! walking the graph one transition at a time. Here the walk also
//! branches at turnouts and backtracks on dead ends, rather than just
//! testing reachability.

use async_recursion::async_recursion;
use fixedbitset::FixedBitSet;
use petgraph::graph::NodeIndex;
use petgraph::Direction;
use rand::seq::SliceRandom;

use crate::error::{LayoutError, Result};
use crate::general::{AddressType, DefaultAddressType};
use crate::ids::{BlockId, TrainId};
use crate::model::{BlockCategory, ElementRef, RouteStep, TravelDirection};
use crate::topology::Topology;

/// How a search should treat blocks (or turnouts) already reserved by
/// another train.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReservedBlockBehavior {
    /// Never route through a block reserved by another train.
    AvoidReserved,
    /// Avoid reserved blocks only among the first `n` steps of the
    /// resulting route; beyond that, reservations don't matter yet
    /// because the train won't reach them before they can clear.
    AvoidReservedUntil(usize),
    /// Ignore reservations entirely (manual routing override).
    IgnoreReserved,
}

impl ReservedBlockBehavior {
    fn blocks_at_step(self, step_index: usize) -> bool {
        match self {
            ReservedBlockBehavior::AvoidReserved => true,
            ReservedBlockBehavior::AvoidReservedUntil(n) => step_index < n,
            ReservedBlockBehavior::IgnoreReserved => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Constraints {
    pub train: TrainId,
    pub reserved_behavior: ReservedBlockBehavior,
    /// Stop at the first station block encountered rather than
    /// requiring the named destination (used by fully-automatic
    /// routing that only cares about reaching *a* station).
    pub stop_at_first_station: bool,
    /// Whether the search may route the train through a direction
    /// reversal (not modeled further here; carried for callers that
    /// need to reject reversing routes outright).
    pub allow_reverse: bool,
}

impl Constraints {
    pub fn new(train: TrainId) -> Self {
        Constraints {
            train,
            reserved_behavior: ReservedBlockBehavior::AvoidReserved,
            stop_at_first_station: false,
            allow_reverse: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub overflow_limit: usize,
    pub randomize_order: bool,
    pub samples: usize,
    pub verbose: bool,
}

impl Settings {
    pub fn from_config(config: &crate::config::RuntimeConfig) -> Self {
        Settings {
            overflow_limit: config.path_finder_overflow_limit,
            randomize_order: true,
            samples: config.path_finder_samples,
            verbose: false,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            overflow_limit: 256,
            randomize_order: false,
            samples: 1,
            verbose: false,
        }
    }
}

struct Search<'a, S: AddressType, D: AddressType, L: AddressType> {
    topology: &'a Topology<S, D, L>,
    from: &'a BlockId,
    destination: Option<&'a BlockId>,
    constraints: &'a Constraints,
    settings: &'a Settings,
    budget: usize,
}

/// Finds a route from `from` (traveling in `direction`) towards
/// `destination`, honoring `constraints`. When `destination` is `None`
/// the search stops at the first station block reached instead (spec
/// §4.2 "no destination given" — the caller is expected to also set
/// `constraints.stop_at_first_station`). When `settings.randomize_order`
/// is set and a destination is given, draws up to `settings.samples`
/// randomized searches and keeps the one with the fewest steps,
/// trading determinism for shorter routes around busy junctions.
///
/// ```
/// # use layoutlogic::ids::{BlockId, TransitionId, TrainId};
/// # use layoutlogic::model::{Block, BlockCategory, ElementRef, TravelDirection, NEXT, PREVIOUS, Transition};
/// # use layoutlogic::topology::TopologyBuilder;
/// # use layoutlogic::pathfinder::{find_path, Constraints, Settings};
/// # tokio_test::block_on(async {
/// let mut builder = TopologyBuilder::<u16, u16, u16>::new();
/// builder.add_block(Block::new(BlockId::new("a"), "A", BlockCategory::Free));
/// builder.add_block(Block::new(BlockId::new("b"), "B", BlockCategory::Free));
/// builder.add_transition(Transition::new(
///     TransitionId::new("a-b"),
///     (ElementRef::Block(BlockId::new("a")), NEXT),
///     (ElementRef::Block(BlockId::new("b")), PREVIOUS),
/// )).unwrap();
/// let topology = builder.build();
///
/// let steps = find_path(
///     &topology,
///     &BlockId::new("a"),
///     TravelDirection::Next,
///     Some(&BlockId::new("b")),
///     &Constraints::new(TrainId::new("t1")),
///     &Settings::default(),
/// ).await.unwrap();
/// assert_eq!(steps.len(), 1);
/// assert_eq!(steps[0].block, BlockId::new("b"));
/// # });
/// ```
pub async fn find_path<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    from: &BlockId,
    direction: TravelDirection,
    destination: Option<&BlockId>,
    constraints: &Constraints,
    settings: &Settings,
) -> Result<Vec<RouteStep>> {
    if let Some(destination) = destination {
        if from == destination {
            return Ok(Vec::new());
        }
    }

    let attempts = if destination.is_some() {
        settings.samples.max(1)
    } else {
        1
    };
    let mut best: Option<Vec<RouteStep>> = None;
    let mut last_err: Option<LayoutError> = None;

    for _ in 0..attempts {
        match find_path_once(topology, from, direction, destination, constraints, settings).await
        {
            Ok(steps) => {
                let shorter = match &best {
                    None => true,
                    Some(b) => steps.len() < b.len(),
                };
                if shorter {
                    best = Some(steps);
                }
                if !settings.randomize_order || destination.is_none() {
                    break;
                }
            }
            Err(err) => last_err = Some(err),
        }
    }

    best.ok_or_else(|| {
        last_err.unwrap_or(LayoutError::PathOverflow {
            from: from.clone(),
            limit: settings.overflow_limit,
        })
    })
}

async fn find_path_once<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    from: &BlockId,
    direction: TravelDirection,
    destination: Option<&BlockId>,
    constraints: &Constraints,
    settings: &Settings,
) -> Result<Vec<RouteStep>> {
    let start = topology
        .node_index_of(&ElementRef::Block(from.clone()), direction.exit_socket())
        .ok_or_else(|| LayoutError::UnknownBlock(from.clone()))?;

    let mut search = Search {
        topology,
        from,
        destination,
        constraints,
        settings,
        budget: 0,
    };

    let mut visited = FixedBitSet::with_capacity(topology.graph().node_count());
    visited.insert(start.index());

    let mut steps = Vec::new();
    if dfs_step(&mut search, start, visited, &mut steps).await? {
        Ok(steps)
    } else {
        Err(LayoutError::NoTransition(
            from.as_str().to_string(),
            destination
                .map(|d| d.as_str().to_string())
                .unwrap_or_else(|| "<any station>".to_string()),
        ))
    }
}

/// Attempts to extend the path past the transition leaving `node`,
/// recursing through any intervening turnouts until either the
/// destination block is reached, every branch dead-ends, or the
/// recursion budget is exhausted.
#[async_recursion]
async fn dfs_step<'a, S: AddressType, D: AddressType, L: AddressType>(
    search: &mut Search<'a, S, D, L>,
    node: NodeIndex,
    visited: FixedBitSet,
    steps: &mut Vec<RouteStep>,
) -> Result<bool> {
    search.budget += 1;
    if search.budget > search.settings.overflow_limit {
        return Err(LayoutError::PathOverflow {
            from: search.from.clone(),
            limit: search.settings.overflow_limit,
        });
    }

    let Some(next) = search
        .topology
        .graph()
        .neighbors_directed(node, Direction::Outgoing)
        .next()
    else {
        return Ok(false);
    };

    if visited.contains(next.index()) {
        return Ok(false);
    }

    let (element, entry_socket) = search.topology.graph()[next].clone();
    let mut visited = visited;
    visited.insert(next.index());

    match element {
        ElementRef::Block(id) => {
            let direction = TravelDirection::from_entry_socket(entry_socket);
            let blocked = {
                let block = search.topology.block(&id)?.lock().await;
                let reserved_blocks = search
                    .constraints
                    .reserved_behavior
                    .blocks_at_step(steps.len());
                (reserved_blocks && block.is_reserved_by_other(&search.constraints.train))
                    || block.is_occupied_by_other(&search.constraints.train)
                    || !block.enabled
            };
            if blocked {
                return Ok(false);
            }

            let is_destination = search.destination.is_some_and(|d| id == *d);
            let stop_here = is_destination
                || (search.constraints.stop_at_first_station && {
                    let block = search.topology.block(&id)?.lock().await;
                    block.category == BlockCategory::Station
                });

            steps.push(RouteStep {
                block: id.clone(),
                direction,
                waiting_time: None,
            });

            if stop_here {
                return Ok(true);
            }

            let exit_node = search
                .topology
                .node_index_of(&ElementRef::Block(id.clone()), direction.exit_socket())
                .ok_or_else(|| LayoutError::UnknownBlock(id.clone()))?;
            visited.insert(exit_node.index());

            if dfs_step(search, exit_node, visited, steps).await? {
                Ok(true)
            } else {
                steps.pop();
                Ok(false)
            }
        }
        ElementRef::Turnout(id) => {
            let (category, reserved) = {
                let turnout = search.topology.turnout(&id)?.lock().await;
                (
                    turnout.category,
                    turnout.is_reserved_by_other(&search.constraints.train),
                )
            };
            if reserved
                && search
                    .constraints
                    .reserved_behavior
                    .blocks_at_step(steps.len())
            {
                return Ok(false);
            }

            let mut exits = category.exits_from(entry_socket);
            if search.settings.randomize_order {
                exits.shuffle(&mut rand::thread_rng());
            }

            for (exit_socket, _state) in exits {
                let Some(exit_node) = search
                    .topology
                    .node_index_of(&ElementRef::Turnout(id.clone()), exit_socket)
                else {
                    continue;
                };
                if visited.contains(exit_node.index()) {
                    continue;
                }
                let mut branch_visited = visited.clone();
                branch_visited.insert(exit_node.index());
                if dfs_step(search, exit_node, branch_visited, steps).await? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{BlockId, TransitionId, TurnoutId};
    use crate::model::{Block, BlockCategory, Transition, Turnout, TurnoutCategory, NEXT, PREVIOUS};
    use crate::topology::TopologyBuilder;

    fn linear_topology() -> Topology {
        let mut builder =
            TopologyBuilder::<DefaultAddressType, DefaultAddressType, DefaultAddressType>::new();
        builder.add_block(Block::new(BlockId::new("a"), "A", BlockCategory::Free));
        builder.add_block(Block::new(BlockId::new("b"), "B", BlockCategory::Free));
        builder.add_block(Block::new(BlockId::new("c"), "C", BlockCategory::Free));
        builder
            .add_transition(Transition::new(
                TransitionId::new("a-b"),
                (ElementRef::Block(BlockId::new("a")), NEXT),
                (ElementRef::Block(BlockId::new("b")), PREVIOUS),
            ))
            .unwrap();
        builder
            .add_transition(Transition::new(
                TransitionId::new("b-c"),
                (ElementRef::Block(BlockId::new("b")), NEXT),
                (ElementRef::Block(BlockId::new("c")), PREVIOUS),
            ))
            .unwrap();
        builder.build()
    }

    fn branching_topology() -> Topology {
        let mut builder =
            TopologyBuilder::<DefaultAddressType, DefaultAddressType, DefaultAddressType>::new();
        builder.add_block(Block::new(BlockId::new("a"), "A", BlockCategory::Free));
        builder.add_block(Block::new(BlockId::new("b"), "B", BlockCategory::Free));
        builder.add_block(Block::new(BlockId::new("c"), "C", BlockCategory::Free));
        builder.add_turnout(Turnout::<DefaultAddressType>::new(
            TurnoutId::new("t1"),
            TurnoutCategory::SingleLeft,
            vec![1],
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
        builder.build()
    }

    #[tokio::test]
    async fn finds_direct_path_through_linear_blocks() {
        let topo = linear_topology();
        let constraints = Constraints::new(TrainId::new("t1"));
        let settings = Settings::default();
        let steps = find_path(
            &topo,
            &BlockId::new("a"),
            TravelDirection::Next,
            Some(&BlockId::new("c")),
            &constraints,
            &settings,
        )
        .await
        .unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].block, BlockId::new("b"));
        assert_eq!(steps[1].block, BlockId::new("c"));
    }

    #[tokio::test]
    async fn backtracks_past_a_branch_to_reach_destination() {
        let topo = branching_topology();
        let constraints = Constraints::new(TrainId::new("t1"));
        let settings = Settings::default();
        let steps = find_path(
            &topo,
            &BlockId::new("a"),
            TravelDirection::Next,
            Some(&BlockId::new("c")),
            &constraints,
            &settings,
        )
        .await
        .unwrap();
        assert_eq!(steps.last().unwrap().block, BlockId::new("c"));
    }

    #[tokio::test]
    async fn unreachable_destination_reports_no_transition() {
        let topo = linear_topology();
        let constraints = Constraints::new(TrainId::new("t1"));
        let settings = Settings::default();
        let result = find_path(
            &topo,
            &BlockId::new("a"),
            TravelDirection::Next,
            Some(&BlockId::new("nowhere")),
            &constraints,
            &settings,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn no_destination_stops_at_first_station() {
        let mut builder =
            TopologyBuilder::<DefaultAddressType, DefaultAddressType, DefaultAddressType>::new();
        builder.add_block(Block::new(BlockId::new("a"), "A", BlockCategory::Free));
        builder.add_block(Block::new(BlockId::new("b"), "B", BlockCategory::Station));
        builder.add_block(Block::new(BlockId::new("c"), "C", BlockCategory::Free));
        builder
            .add_transition(Transition::new(
                TransitionId::new("a-b"),
                (ElementRef::Block(BlockId::new("a")), NEXT),
                (ElementRef::Block(BlockId::new("b")), PREVIOUS),
            ))
            .unwrap();
        builder
            .add_transition(Transition::new(
                TransitionId::new("b-c"),
                (ElementRef::Block(BlockId::new("b")), NEXT),
                (ElementRef::Block(BlockId::new("c")), PREVIOUS),
            ))
            .unwrap();
        let topo = builder.build();

        let mut constraints = Constraints::new(TrainId::new("t1"));
        constraints.stop_at_first_station = true;
        let settings = Settings::default();
        let steps = find_path(
            &topo,
            &BlockId::new("a"),
            TravelDirection::Next,
            None,
            &constraints,
            &settings,
        )
        .await
        .unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].block, BlockId::new("b"));
    }
}
