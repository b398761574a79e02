//! Continuous-invariant checking (spec §7 "Invariants to enforce
//! continuously"). A violation is a logic bug, not a condition an
//! operator or a flaky bus can trigger, so it is never propagated as a
//! [`LayoutError`] to a caller — it panics in development and is
//! logged in production, matching §7's "assert/panic during
//! development; logged error in production" without taking the
//! offending train's handler pipeline down in release.

use crate::error::LayoutError;

/// Asserts `condition` holds; `describe` is only evaluated on failure.
/// In debug builds this panics via [`debug_assert!`]; in release it
/// logs a [`LayoutError::InvariantViolation`] through `tracing` and
/// returns control to the caller unharmed.
pub fn check(condition: bool, describe: impl FnOnce() -> String) {
    if condition {
        return;
    }
    let message = describe();
    debug_assert!(condition, "{message}");
    let error = LayoutError::InvariantViolation(message);
    tracing::error!(%error, "layout invariant violated");
}
