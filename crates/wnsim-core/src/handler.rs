//! Event handling.

use crate::event::Event;

/// Trait for components which consume events.
pub trait EventHandler {
    /// Processes the event delivered to the component.
    ///
    /// The handler runs to completion before the next event is delivered. It may emit new events
    /// via the component's [`SimulationContext`](crate::SimulationContext), including events for the
    /// current time, which are delivered after all events already scheduled for this time.
    fn on(&mut self, event: Event);
}

/// Matches the event payload against the listed event types.
///
/// Each arm destructures the payload of the corresponding type. Arms need not be exhaustive:
/// a payload which matches none of them is logged as unhandled at `ERROR` level.
///
/// # Examples
///
/// ```rust
/// use serde::Serialize;
/// use wnsim_core::{cast, Event, EventHandler, Simulation, SimulationContext};
///
/// #[derive(Clone, Serialize)]
/// pub struct FrameReceived {
///     size: u32,
/// }
///
/// #[derive(Clone, Serialize)]
/// pub struct Reset {}
///
/// pub struct Counter {
///     bytes: u64,
/// }
///
/// impl EventHandler for Counter {
///     fn on(&mut self, event: Event) {
///         cast!(match event.data {
///             FrameReceived { size } => {
///                 self.bytes += size as u64;
///             }
///             Reset {} => {
///                 self.bytes = 0;
///             }
///         })
///     }
/// }
///
/// let mut sim = Simulation::new(1);
/// let counter = std::rc::Rc::new(std::cell::RefCell::new(Counter { bytes: 0 }));
/// let counter_id = sim.add_handler("counter", counter.clone());
/// let client = sim.create_context("client");
/// client.emit(FrameReceived { size: 1500 }, counter_id, 0.5);
/// client.emit(FrameReceived { size: 40 }, counter_id, 0.7);
/// sim.step_until_no_events();
/// assert_eq!(counter.borrow().bytes, 1540);
/// ```
#[macro_export]
macro_rules! cast {
    ( match $event:ident.data { $( $type:ident { $($tt:tt)* } => { $($expr:tt)* } )+ } ) => {
        $(
            if $event.data.is::<$type>() {
                if let Ok(__value) = $event.data.downcast::<$type>() {
                    let $type { $($tt)* } = *__value;
                    $($expr)*
                }
            } else
        )*
        {
            $crate::log::log_unhandled_event($event);
        }
    }
}

/// Specifies which pending events are cancelled when an event handler is removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventCancellationPolicy {
    /// Cancel events destined to the component.
    Incoming,
    /// Cancel events created by the component.
    Outgoing,
    /// Cancel all events related to the component.
    All,
    /// Keep pending events.
    None,
}
