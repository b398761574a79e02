//! `layoutlogic` — the layout runtime of a model railway control
//! system: the subsystem that drives one or more trains around a
//! shared track layout, responding to occupancy sensors, commanding
//! turnouts and locomotive speeds, and preventing collisions.
//!
//! The crate is organized bottom-up, the same way the system itself is
//! layered:
//!
//! - [`model`] and [`ids`] — the data model: blocks, turnouts,
//!   feedbacks, transitions, trains and routes, each keyed by a stable
//!   [`ids`] newtype.
//! - [`topology`] — the graph those elements are wired into, and the
//!   registries that own them for the life of the process.
//! - [`pathfinder`] — route discovery over the topology graph.
//! - [`reservation`] — atomic claims on the blocks/turnouts ahead of
//!   (and behind) a train.
//! - [`controller`] — the per-train event-driven handler pipeline.
//! - [`layout`] — the outer runtime loop fanning bus/timer/operator
//!   input out to the per-train controllers.
//! - [`bus`] — the abstract control-bus command/event interface, plus
//!   one concrete framed-byte binding.
//! - [`persistence`] — the on-disk layout document.
//! - [`diagnostics`] — consistency checks and light repair over a live
//!   topology.
//! - [`config`] and [`logging`] — the ambient runtime configuration and
//!   structured-logging setup.

/// The control bus abstraction and a concrete framed-byte binding.
pub mod bus;
/// Runtime configuration, loaded from a TOML file.
pub mod config;
/// Layout consistency checks and light repair.
pub mod diagnostics;
/// The crate-wide error taxonomy.
pub mod error;
/// Shared type bounds used across the crate.
pub mod general;
/// Opaque, stable entity identifiers.
pub mod ids;
/// The outer runtime loop (the "layout controller").
pub mod layout;
/// Continuous §7 invariant checking.
pub mod invariants;
/// The layout's data model.
pub mod model;
/// Structured logging setup.
pub mod logging;
/// Route discovery over the topology graph.
pub mod pathfinder;
/// The on-disk layout document.
pub mod persistence;
/// The reservation engine.
pub mod reservation;
/// The topology graph and its entity registries.
pub mod topology;
/// The per-train event-driven handler pipeline.
pub mod controller;

pub use error::{LayoutError, Result};
