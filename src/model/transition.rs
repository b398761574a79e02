//! Transitions — directed linkages between two sockets, compared as an
//! unordered pair (spec §3 "Transition").

use serde::{Deserialize, Serialize};

use crate::ids::{TrainId, TransitionId};
use crate::model::common::{ElementRef, Socket};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub id: TransitionId,
    pub a: (ElementRef, Socket),
    pub b: (ElementRef, Socket),
    #[serde(default)]
    pub reservation: Option<TrainId>,
}

impl Transition {
    pub fn new(id: TransitionId, a: (ElementRef, Socket), b: (ElementRef, Socket)) -> Self {
        Transition {
            id,
            a,
            b,
            reservation: None,
        }
    }

    /// The endpoint on the other side of `from`, if `from` is one of
    /// this transition's two endpoints.
    pub fn other_end(&self, from: &(ElementRef, Socket)) -> Option<&(ElementRef, Socket)> {
        if &self.a == from {
            Some(&self.b)
        } else if &self.b == from {
            Some(&self.a)
        } else {
            None
        }
    }

    pub fn is_reserved_by_other(&self, train: &TrainId) -> bool {
        self.reservation.as_ref().is_some_and(|t| t != train)
    }
}

/// Transitions compare `(a, b)` and `(b, a)` as the same physical link.
impl PartialEq for Transition {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && ((self.a == other.a && self.b == other.b)
                || (self.a == other.b && self.b == other.a))
    }
}

impl Eq for Transition {}
