//! The reservation engine: atomic, all-or-nothing claims on blocks and
//! the turnouts between them (spec §5 "Reservation").
//!
//! Grounded on the teacher's `Sensor::block`/`Sensor::free` pair
//! (`components/mod.rs`) — claim by recording the owning train,
//! release by comparing it back — generalized from a single sensor to
//! a whole span of route steps, locked together so a reservation
//! either fully succeeds or changes nothing.

use async_recursion::async_recursion;
use fixedbitset::FixedBitSet;
use petgraph::graph::NodeIndex;
use petgraph::Direction;

use crate::error::Result;
use crate::general::AddressType;
use crate::ids::{BlockId, TrainId, TurnoutId};
use crate::model::block::Reservation as BlockReservation;
use crate::model::{ElementRef, Route, TravelDirection, TurnoutState};
use crate::topology::Topology;

/// One block reservation plus the turnouts that must be thrown to
/// connect it to the previous step, computed on demand by walking the
/// topology between two known-adjacent route blocks.
struct Segment {
    block: BlockId,
    direction: TravelDirection,
    turnouts: Vec<(TurnoutId, TurnoutState)>,
}

/// Reserves route steps `[from_step, from_step + count)` for `train`,
/// all or nothing. Returns `false` (leaving every block/turnout
/// untouched) if any step in the span is already reserved or occupied
/// by a different train. This is the single-hop/whole-chain contract
/// (§4.3 `reserve(train, fromBlock, toBlock, direction)`) — callers
/// that want §4.3's `reserveLeading` partial-success semantics instead
/// should use [`reserve_leading`].
pub async fn reserve<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    train: &TrainId,
    route: &Route,
    mut from_block: BlockId,
    mut from_direction: TravelDirection,
    from_step: usize,
    count: usize,
) -> Result<bool> {
    let end = (from_step + count).min(route.steps.len());
    if from_step >= end {
        return Ok(true);
    }

    let mut segments = Vec::with_capacity(end - from_step);
    for step in &route.steps[from_step..end] {
        let turnouts = trace_turnouts(topology, &from_block, from_direction, &step.block).await?;
        segments.push(Segment {
            block: step.block.clone(),
            direction: step.direction,
            turnouts,
        });
        from_block = step.block.clone();
        from_direction = step.direction;
    }

    // First pass: every involved element must be free for this train
    // before anything is mutated.
    for segment in &segments {
        let block = topology.block(&segment.block)?.lock().await;
        if block.is_reserved_by_other(train) || block.is_occupied_by_other(train) {
            return Ok(false);
        }
        for (turnout_id, _) in &segment.turnouts {
            let turnout = topology.turnout(turnout_id)?.lock().await;
            if turnout.is_reserved_by_other(train) {
                return Ok(false);
            }
        }
    }

    // Second pass: commit.
    for (offset, segment) in segments.into_iter().enumerate() {
        let mut block = topology.block(&segment.block)?.lock().await;
        block.reservation = Some(BlockReservation {
            train: train.clone(),
            direction: segment.direction,
            leading: offset > 0 || from_step > 0,
        });
        drop(block);
        for (turnout_id, state) in segment.turnouts {
            let mut turnout = topology.turnout(&turnout_id)?.lock().await;
            turnout.reservation = Some(train.clone());
            turnout.state = state;

            // Invariant (§7 #3): a reserved turnout's state always agrees
            // with the value the reservation that claimed it required.
            crate::invariants::check(turnout.state == state, || {
                format!(
                    "turnout {turnout_id:?} reserved by {train:?} but state {:?} != required {state:?}",
                    turnout.state
                )
            });
        }
    }

    Ok(true)
}

/// Reserves as many of the `count` route steps starting at `from_step`
/// as can be claimed, one hop at a time, stopping at the first blocked
/// hop rather than failing the whole span (§4.3 `reserveLeading`:
/// "Returns success if at least one step was reserved; returns failure
/// otherwise... no side effect beyond partial reservations that were
/// individually valid; those stand"). Each hop that does succeed is
/// committed immediately through the atomic single-hop [`reserve`] and
/// is never rolled back by a later hop's failure.
pub async fn reserve_leading<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    train: &TrainId,
    route: &Route,
    from_block: BlockId,
    from_direction: TravelDirection,
    from_step: usize,
    count: usize,
) -> Result<bool> {
    let end = (from_step + count).min(route.steps.len());
    let mut current_block = from_block;
    let mut current_direction = from_direction;
    let mut reserved_any = false;

    for step_index in from_step..end {
        let ok = reserve(
            topology,
            train,
            route,
            current_block.clone(),
            current_direction,
            step_index,
            1,
        )
        .await?;
        if !ok {
            break;
        }
        reserved_any = true;
        let step = &route.steps[step_index];
        current_block = step.block.clone();
        current_direction = step.direction;
    }

    Ok(reserved_any)
}

/// Releases the reservation on a single block, if `train` is the
/// current owner. A no-op (returns `false`) if some other train holds it.
pub async fn free<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    train: &TrainId,
    block: &BlockId,
) -> Result<bool> {
    let mut block = topology.block(block)?.lock().await;
    match &block.reservation {
        Some(r) if &r.train == train => {
            block.reservation = None;
            Ok(true)
        }
        Some(_) => Ok(false),
        None => Ok(true),
    }
}

/// Releases a turnout's reservation if `train` is the current owner.
/// Does not touch `state` — the next train to reserve the turnout sets
/// that itself.
async fn free_turnout<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    train: &TrainId,
    turnout: &TurnoutId,
) -> Result<()> {
    let mut turnout = topology.turnout(turnout)?.lock().await;
    if turnout.reservation.as_ref() == Some(train) {
        turnout.reservation = None;
    }
    Ok(())
}

/// Releases reservations for route steps `[0, upto_step)`, keeping the
/// last `trailing` steps before `upto_step` reserved (a train only
/// drops blocks once its rear end has fully cleared them).
pub async fn free_trailing<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    train: &TrainId,
    route: &Route,
    upto_step: usize,
    trailing: usize,
) -> Result<()> {
    let release_end = upto_step.saturating_sub(trailing);
    free_between(topology, train, route, 0, release_end).await
}

/// Releases reservations for route steps `[from_step, to_step)`, plus
/// the turnouts bordering each pair of consecutive freed steps (the
/// turnout between `from_step - 1` and `from_step` is left alone since
/// the block behind it may not be part of this release).
pub async fn free_between<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    train: &TrainId,
    route: &Route,
    from_step: usize,
    to_step: usize,
) -> Result<()> {
    let to_step = to_step.min(route.steps.len());
    for idx in from_step..to_step {
        let step = &route.steps[idx];
        free(topology, train, &step.block).await?;
        if idx > from_step {
            let previous = &route.steps[idx - 1];
            let turnouts =
                trace_turnouts(topology, &previous.block, previous.direction, &step.block).await?;
            for (turnout_id, _) in turnouts {
                free_turnout(topology, train, &turnout_id).await?;
            }
        }
    }
    Ok(())
}

/// Walks the topology graph from `from`'s exit socket (traveling
/// `direction`) until it reaches `to`, recording the turnout states it
/// had to pass through. Fails (empty alternative) if `to` is not the
/// unique block reachable without passing through a third block first —
/// which should never happen for a route the path finder produced.
async fn trace_turnouts<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    from: &BlockId,
    direction: TravelDirection,
    to: &BlockId,
) -> Result<Vec<(TurnoutId, TurnoutState)>> {
    let start = match topology.node_index_of(&ElementRef::Block(from.clone()), direction.exit_socket())
    {
        Some(node) => node,
        None => return Ok(Vec::new()),
    };
    let mut visited = FixedBitSet::with_capacity(topology.graph().node_count());
    visited.insert(start.index());

    let mut trace = Vec::new();
    if trace_step(topology, start, to, visited, &mut trace).await? {
        Ok(trace)
    } else {
        Ok(Vec::new())
    }
}

#[async_recursion]
async fn trace_step<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
    node: NodeIndex,
    to: &BlockId,
    visited: FixedBitSet,
    trace: &mut Vec<(TurnoutId, TurnoutState)>,
) -> Result<bool> {
    let Some(next) = topology
        .graph()
        .neighbors_directed(node, Direction::Outgoing)
        .next()
    else {
        return Ok(false);
    };
    if visited.contains(next.index()) {
        return Ok(false);
    }

    let (element, entry_socket) = topology.graph()[next].clone();
    let mut visited = visited;
    visited.insert(next.index());

    match element {
        ElementRef::Block(id) => Ok(&id == to),
        ElementRef::Turnout(id) => {
            let category = topology.turnout(&id)?.lock().await.category;
            for (exit_socket, state) in category.exits_from(entry_socket) {
                let Some(exit_node) = topology.node_index_of(&ElementRef::Turnout(id.clone()), exit_socket)
                else {
                    continue;
                };
                if visited.contains(exit_node.index()) {
                    continue;
                }
                let mut branch = visited.clone();
                branch.insert(exit_node.index());
                let mut branch_trace = trace.clone();
                branch_trace.push((id.clone(), state));
                if trace_step(topology, exit_node, to, branch, &mut branch_trace).await? {
                    *trace = branch_trace;
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}
