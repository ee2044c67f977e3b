//! Simulation events.

use std::cmp::Ordering;

use downcast_rs::{impl_downcast, Downcast};
use serde::ser::Serialize;

use crate::component::Id;

/// Event identifier.
///
/// Identifiers are unique within a simulation and grow monotonically, so they also define the order
/// of events scheduled for the same time. The identifier returned on event creation serves as a handle
/// for cancelling the event.
pub type EventId = u64;

/// Trait implemented by event payloads.
///
/// Any `'static` type implementing [`Serialize`] can be used as event payload.
pub trait EventData: Downcast + erased_serde::Serialize {}

impl_downcast!(EventData);

erased_serde::serialize_trait_object!(EventData);

impl<T: Serialize + 'static> EventData for T {}

/// Event scheduled for delivery to a simulation component.
pub struct Event {
    /// Unique event identifier.
    pub id: EventId,
    /// Time at which the event is delivered.
    pub time: f64,
    /// Component which created the event.
    pub src: Id,
    /// Component to which the event is delivered.
    pub dst: Id,
    /// Event payload.
    pub data: Box<dyn EventData>,
}

impl Eq for Event {}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

// The order is reversed so that BinaryHeap<Event> pops the earliest event,
// and the event created first among the events with equal time.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other.time.total_cmp(&self.time).then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
