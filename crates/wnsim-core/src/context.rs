//! Accessing simulation from components.

use std::cell::RefCell;
use std::rc::Rc;

use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::prelude::Distribution;

use crate::component::Id;
use crate::event::{EventData, EventId};
use crate::state::SimulationState;

/// A facade for accessing the simulation state and producing events from simulation components.
///
/// Each component owns its context. Emitting methods take `&self`, so a component can emit events
/// while its own state is mutably borrowed inside [`EventHandler::on`](crate::EventHandler::on).
pub struct SimulationContext {
    id: Id,
    name: String,
    sim_state: Rc<RefCell<SimulationState>>,
    names: Rc<RefCell<Vec<String>>>,
}

impl SimulationContext {
    pub(crate) fn new(
        id: Id,
        name: &str,
        sim_state: Rc<RefCell<SimulationState>>,
        names: Rc<RefCell<Vec<String>>>,
    ) -> Self {
        Self {
            id,
            name: name.to_owned(),
            sim_state,
            names,
        }
    }

    /// Returns the identifier of component associated with this context.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Returns the name of component associated with this context.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current simulation time.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use wnsim_core::Simulation;
    ///
    /// let mut sim = Simulation::new(123);
    /// let ctx = sim.create_context("sta0");
    /// assert_eq!(ctx.time(), 0.0);
    /// ```
    pub fn time(&self) -> f64 {
        self.sim_state.borrow().time()
    }

    /// Returns a random float in the range _[0, 1)_ using the simulation-wide random number generator.
    pub fn rand(&self) -> f64 {
        self.sim_state.borrow_mut().rand()
    }

    /// Returns a random number in the specified range using the simulation-wide random number generator.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use wnsim_core::Simulation;
    ///
    /// let mut sim = Simulation::new(123);
    /// let ctx = sim.create_context("sta0");
    /// let slots: u32 = ctx.gen_range(0..=15);
    /// assert!(slots <= 15);
    /// ```
    pub fn gen_range<T, R>(&self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.sim_state.borrow_mut().gen_range(range)
    }

    /// Returns a random value from the specified distribution using the simulation-wide random number generator.
    pub fn sample_from_distribution<T, Dist: Distribution<T>>(&self, dist: &Dist) -> T {
        self.sim_state.borrow_mut().sample_from_distribution(dist)
    }

    /// Returns a seed for an independent random number generator owned by the component.
    pub fn gen_seed(&self) -> u64 {
        self.sim_state.borrow_mut().gen_seed()
    }

    /// Creates new event with specified payload, destination and delay, returns event id.
    ///
    /// The event time is the current simulation time plus the delay. Panics if the delay is negative.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use serde::Serialize;
    /// use wnsim_core::Simulation;
    ///
    /// #[derive(Clone, Serialize)]
    /// pub struct Probe {}
    ///
    /// let mut sim = Simulation::new(123);
    /// let sta = sim.create_context("sta");
    /// let ap = sim.create_context("ap");
    /// let first = sta.emit(Probe {}, ap.id(), 1.0);
    /// let second = sta.emit(Probe {}, ap.id(), 0.5);
    /// assert_eq!(second, first + 1);
    /// sim.step();
    /// assert_eq!(sim.time(), 0.5);
    /// ```
    ///
    /// ```should_panic
    /// use serde::Serialize;
    /// use wnsim_core::Simulation;
    ///
    /// #[derive(Clone, Serialize)]
    /// pub struct Probe {}
    ///
    /// let mut sim = Simulation::new(123);
    /// let sta = sim.create_context("sta");
    /// sta.emit(Probe {}, 0, -1.0);
    /// ```
    pub fn emit<T>(&self, data: T, dst: Id, delay: f64) -> EventId
    where
        T: EventData,
    {
        self.sim_state.borrow_mut().add_event(data, self.id, dst, delay)
    }

    /// Creates new immediate (zero-delay) event with specified payload and destination, returns event id.
    ///
    /// The event is delivered after all events already scheduled for the current time.
    pub fn emit_now<T>(&self, data: T, dst: Id) -> EventId
    where
        T: EventData,
    {
        self.sim_state.borrow_mut().add_event(data, self.id, dst, 0.)
    }

    /// Creates new event for itself with specified payload and delay, returns event id.
    pub fn emit_self<T>(&self, data: T, delay: f64) -> EventId
    where
        T: EventData,
    {
        self.sim_state.borrow_mut().add_event(data, self.id, self.id, delay)
    }

    /// Creates new immediate event for itself with specified payload, returns event id.
    pub fn emit_self_now<T>(&self, data: T) -> EventId
    where
        T: EventData,
    {
        self.sim_state.borrow_mut().add_event(data, self.id, self.id, 0.)
    }

    /// Creates new event on behalf of another component, returns event id.
    ///
    /// Used by relaying components such as the wireless channel, which deliver events whose
    /// logical source is the transmitting device.
    pub fn emit_as<T>(&self, data: T, src: Id, dst: Id, delay: f64) -> EventId
    where
        T: EventData,
    {
        self.sim_state.borrow_mut().add_event(data, src, dst, delay)
    }

    /// Cancels the pending event with specified id.
    ///
    /// Returns `false` if the event was already delivered, cancelled or never existed,
    /// in which case the call has no effect.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use serde::Serialize;
    /// use wnsim_core::Simulation;
    ///
    /// #[derive(Clone, Serialize)]
    /// pub struct AckTimeout {}
    ///
    /// let mut sim = Simulation::new(123);
    /// let sta = sim.create_context("sta");
    /// let timeout = sta.emit_self(AckTimeout {}, 1e-4);
    /// assert!(sta.cancel_event(timeout));
    /// assert!(!sta.cancel_event(timeout));
    /// assert!(!sim.step());
    /// ```
    pub fn cancel_event(&self, id: EventId) -> bool {
        self.sim_state.borrow_mut().cancel_event(id)
    }

    /// Returns the name of component by its identifier.
    pub fn lookup_name(&self, id: Id) -> String {
        self.names.borrow()[id as usize].clone()
    }
}
