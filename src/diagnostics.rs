//! Layout diagnostics (spec §4.6): a pure-query inspector plus a
//! `repair` entry point, grounded on the teacher's `Railroad::audit`
//! style consistency checks (`railroad.rs`), generalized here into a
//! typed finding list rather than a validation `Result` that stops at
//! the first problem.

use std::collections::HashMap;

use crate::general::AddressType;
use crate::ids::{BlockId, FeedbackId, TrainId, TurnoutId};
use crate::model::{ElementRef, Socket};
use crate::topology::Topology;

/// One consistency problem discovered by [`diagnose`]. Never fatal —
/// the runtime keeps operating with findings outstanding; they are
/// surfaced to the operator (spec §6 "Diagnostics" command).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// Two or more blocks share the same display name.
    DuplicateBlockName { name: String, blocks: Vec<BlockId> },
    /// Two or more turnouts share a control-bus address.
    DuplicateTurnoutAddress { address: String, turnouts: Vec<TurnoutId> },
    /// Two or more feedbacks share a (device, contact) hardware address.
    DuplicateFeedbackAddress { address: String, feedbacks: Vec<FeedbackId> },
    /// A socket with no transition wired to it.
    OrphanSocket { element: ElementRef, socket: Socket },
    /// A block has no declared physical length.
    MissingBlockLength(BlockId),
    /// A block has feedbacks but no per-feedback distance table.
    MissingFeedbackDistances(BlockId),
    /// A train's trailing-reservation window is zero, meaning no
    /// length is accounted for behind it.
    MissingTrainLength(TrainId),
}

/// Enumerates every [`Finding`] currently present in `topology`.
pub async fn diagnose<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
) -> Vec<Finding> {
    let mut findings = Vec::new();

    let mut names: HashMap<String, Vec<BlockId>> = HashMap::new();
    for id in topology.block_ids() {
        let Ok(mutex) = topology.block(id) else { continue };
        let block = mutex.lock().await;
        names.entry(block.name.clone()).or_default().push(id.clone());

        if block.length_m.is_none() {
            findings.push(Finding::MissingBlockLength(id.clone()));
        }
        if !block.feedbacks.is_empty() && block.feedback_distances_m.is_none() {
            findings.push(Finding::MissingFeedbackDistances(id.clone()));
        }
        for &socket in block.sockets() {
            if topology.neighbor(&ElementRef::Block(id.clone()), socket).is_none() {
                findings.push(Finding::OrphanSocket {
                    element: ElementRef::Block(id.clone()),
                    socket,
                });
            }
        }
    }
    for (name, blocks) in names {
        if blocks.len() > 1 {
            findings.push(Finding::DuplicateBlockName { name, blocks });
        }
    }

    let mut turnout_addresses: HashMap<S, Vec<TurnoutId>> = HashMap::new();
    for id in topology.turnout_ids() {
        let Ok(mutex) = topology.turnout(id) else { continue };
        let turnout = mutex.lock().await;
        for address in &turnout.addresses {
            turnout_addresses.entry(*address).or_default().push(id.clone());
        }
        for &socket in turnout.category.sockets() {
            if topology.neighbor(&ElementRef::Turnout(id.clone()), socket).is_none() {
                findings.push(Finding::OrphanSocket {
                    element: ElementRef::Turnout(id.clone()),
                    socket,
                });
            }
        }
    }
    for (address, turnouts) in turnout_addresses {
        if turnouts.len() > 1 {
            findings.push(Finding::DuplicateTurnoutAddress {
                address: format!("{address:?}"),
                turnouts,
            });
        }
    }

    let mut feedback_addresses: HashMap<crate::model::HardwareAddress<D>, Vec<FeedbackId>> =
        HashMap::new();
    for id in topology.feedback_ids() {
        let Ok(mutex) = topology.feedback(id) else { continue };
        let feedback = mutex.lock().await;
        feedback_addresses.entry(feedback.address).or_default().push(id.clone());
    }
    for (address, feedbacks) in feedback_addresses {
        if feedbacks.len() > 1 {
            findings.push(Finding::DuplicateFeedbackAddress {
                address: format!("{address:?}"),
                feedbacks,
            });
        }
    }

    for id in topology.train_ids() {
        let Ok(mutex) = topology.train(id) else { continue };
        let train = mutex.lock().await;
        if train.trailing_reserved_steps == 0 {
            findings.push(Finding::MissingTrainLength(id.clone()));
        }
    }

    findings
}

/// Removes trivially invalid state: self-referencing occupancy (a
/// block claiming a train that does not claim it back) and dangling
/// train references (a train whose `current_block` no longer resolves
/// to a registered block). Returns the number of repairs made.
///
/// Transitions with dangling endpoints cannot occur once a
/// [`crate::topology::TopologyBuilder`] has validated them at build
/// time, so unlike the distilled spec's "invalid transitions" check
/// this never has anything to repair — the invariant is structural
/// rather than continuously monitored.
pub async fn repair<S: AddressType, D: AddressType, L: AddressType>(
    topology: &Topology<S, D, L>,
) -> usize {
    let mut repairs = 0;

    for id in topology.block_ids() {
        let Ok(mutex) = topology.block(id) else { continue };
        let mut block = mutex.lock().await;
        if let Some(instance) = &block.occupancy {
            let claims_back = match topology.train(&instance.train) {
                Ok(train_mutex) => train_mutex.lock().await.current_block.as_ref() == Some(id),
                Err(_) => false,
            };
            if !claims_back {
                block.occupancy = None;
                repairs += 1;
            }
        }
    }

    for id in topology.train_ids() {
        let Ok(mutex) = topology.train(id) else { continue };
        let mut train = mutex.lock().await;
        if let Some(block_id) = train.current_block.clone() {
            if topology.block(&block_id).is_err() {
                train.current_block = None;
                repairs += 1;
            }
        }
    }

    repairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::general::DefaultAddressType;
    use crate::ids::BlockId;
    use crate::model::{Block, BlockCategory};
    use crate::topology::TopologyBuilder;

    #[tokio::test]
    async fn duplicate_names_and_missing_length_are_reported() {
        let mut builder =
            TopologyBuilder::<DefaultAddressType, DefaultAddressType, DefaultAddressType>::new();
        builder.add_block(Block::new(BlockId::new("a"), "Platform", BlockCategory::Free));
        builder.add_block(Block::new(BlockId::new("b"), "Platform", BlockCategory::Free));
        let topo = builder.build();

        let findings = diagnose(&topo).await;
        assert!(findings.iter().any(|f| matches!(f, Finding::DuplicateBlockName { .. })));
        assert!(findings.iter().any(|f| matches!(f, Finding::MissingBlockLength(id) if id == &BlockId::new("a"))));
        assert!(findings.iter().any(|f| matches!(f, Finding::OrphanSocket { .. })));
    }
}
