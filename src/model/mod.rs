//! The layout's data model: the element kinds the topology graph
//! connects, and the runtime entities (trains, routes) that move
//! across them.

pub mod block;
pub mod common;
pub mod feedback;
pub mod route;
pub mod train;
pub mod transition;
pub mod turnout;

pub use block::{Block, BlockCategory, DirectionalFeedback, Reservation, TrainInstance};
pub use common::{BodyDirection, ElementRef, Socket, TravelDirection, NEXT, PREVIOUS};
pub use feedback::{Feedback, HardwareAddress};
pub use route::{Route, RouteMode, RouteStep};
pub use train::{DecoderFamily, Scheduling, StopTrigger, Train, TrainSpeed, TrainState};
pub use transition::Transition;
pub use turnout::{Turnout, TurnoutCategory, TurnoutState};
