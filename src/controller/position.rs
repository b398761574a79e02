//! Pure position arithmetic for a train moving across a block's
//! ordered feedbacks (spec §4.4 handler 2 "MoveWithinBlock").
//!
//! Kept as a free function, with no topology or lock access, so the
//! automatic/manual handlers can unit test the arithmetic without
//! spinning up a [`crate::topology::Topology`].

use crate::error::Result;
use crate::model::TravelDirection;

/// Computes the position a train's reference point moves to once
/// `feedback_index` (0-based, ordered along the block's `previous ->
/// next` axis) reports occupied while the train travels `direction`.
///
/// In `strict` mode only the feedback exactly ahead of
/// `current_position` advances it, by one. In lenient mode, any
/// feedback still ahead of `current_position` jumps the position
/// straight to it — covering a train that slipped past an
/// intermediate sensor. A feedback that is not ahead of the current
/// position at all (behind, or already crossed) never moves it,
/// regardless of mode; this returns `current_position` unchanged
/// rather than an error, since a lagging or duplicate sensor report is
/// an expected occurrence, not a fault.
pub fn new_position(
    current_position: usize,
    feedback_index: usize,
    direction: TravelDirection,
    strict: bool,
) -> Result<usize> {
    let candidate = match direction {
        TravelDirection::Next => feedback_index + 1,
        TravelDirection::Previous => feedback_index,
    };

    let ahead = match direction {
        TravelDirection::Next => candidate > current_position,
        TravelDirection::Previous => candidate < current_position,
    };
    if !ahead {
        return Ok(current_position);
    }

    let exactly_ahead = match direction {
        TravelDirection::Next => feedback_index == current_position,
        TravelDirection::Previous => feedback_index + 1 == current_position,
    };

    if strict && !exactly_ahead {
        return Ok(current_position);
    }

    Ok(candidate)
}
