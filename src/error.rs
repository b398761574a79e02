//! The crate-wide error taxonomy (spec §7).
//!
//! Reservation conflicts are deliberately *not* represented here: the
//! reservation engine returns plain `bool`s for those (§9 — "kept as
//! booleans because the controller's policy distinguishes 'could not
//! reserve' from 'topology error'"). `LayoutError` otherwise covers the
//! fatal categories (topology errors, path-finder overflow) plus
//! [`LayoutError::InvariantViolation`], which [`crate::invariants::check`]
//! constructs to describe a continuous-invariant failure but never
//! returns to a caller — it is logged, not propagated.

use crate::ids::{BlockId, FeedbackId, RouteId, TrainId, TransitionId, TurnoutId};
use thiserror::Error;

/// Errors raised by the topology, path finder and reservation engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("no block with id {0:?}")]
    UnknownBlock(BlockId),

    #[error("no turnout with id {0:?}")]
    UnknownTurnout(TurnoutId),

    #[error("no feedback with id {0:?}")]
    UnknownFeedback(FeedbackId),

    #[error("no train with id {0:?}")]
    UnknownTrain(TrainId),

    #[error("no route with id {0:?}")]
    UnknownRoute(RouteId),

    #[error("no transition with id {0:?}")]
    UnknownTransition(TransitionId),

    #[error("no transition between {0:?} and {1:?}")]
    NoTransition(String, String),

    #[error("socket {socket} does not exist on {element}")]
    UnknownSocket { element: String, socket: u8 },

    #[error("train {train:?} reached the end of route {route:?} at a block other than the configured destination")]
    DestinationMismatch { train: TrainId, route: RouteId },

    #[error("path finder overflowed its step limit ({limit}) searching from {from:?}")]
    PathOverflow { from: BlockId, limit: usize },

    #[error("(block, turnout or transition) is reserved by a different train than expected")]
    ReservationConflict,

    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, LayoutError>;
