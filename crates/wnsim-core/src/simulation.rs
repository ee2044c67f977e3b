//! Simulation configuration and execution.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::Level::Trace;
use log::{debug, log_enabled, trace};
use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::prelude::Distribution;
use serde_json::json;
use serde_type_name::type_name;

use crate::component::Id;
use crate::context::SimulationContext;
use crate::event::Event;
use crate::handler::{EventCancellationPolicy, EventHandler};
use crate::log::{get_colored, log_undelivered_event};
use crate::state::SimulationState;

/// Represents a simulation, provides methods for its configuration and execution.
pub struct Simulation {
    sim_state: Rc<RefCell<SimulationState>>,
    name_to_id: HashMap<String, Id>,
    names: Rc<RefCell<Vec<String>>>,
    handlers: Vec<Option<Rc<RefCell<dyn EventHandler>>>>,
}

impl Simulation {
    /// Creates a new simulation with specified random seed.
    pub fn new(seed: u64) -> Self {
        Self {
            sim_state: Rc::new(RefCell::new(SimulationState::new(seed))),
            name_to_id: HashMap::new(),
            names: Rc::new(RefCell::new(Vec::new())),
            handlers: Vec::new(),
        }
    }

    fn register(&mut self, name: &str) -> Id {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = self.name_to_id.len() as Id;
        self.name_to_id.insert(name.to_owned(), id);
        self.names.borrow_mut().push(name.to_owned());
        self.handlers.push(None);
        id
    }

    fn log_debug(&self, message: &str, details: serde_json::Value) {
        debug!(
            target: "simulation",
            "[{:.6} {} simulation] {}: {}",
            self.time(),
            get_colored("DEBUG", colored::Color::Blue),
            message,
            details
        );
    }

    /// Returns the identifier of component by its name.
    ///
    /// Panics if component with such name does not exist.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use wnsim_core::Simulation;
    ///
    /// let mut sim = Simulation::new(123);
    /// let ctx = sim.create_context("channel");
    /// assert_eq!(sim.lookup_id(ctx.name()), 0);
    /// ```
    ///
    /// ```should_panic
    /// use wnsim_core::Simulation;
    ///
    /// let mut sim = Simulation::new(123);
    /// sim.create_context("channel");
    /// sim.lookup_id("monitor");
    /// ```
    pub fn lookup_id(&self, name: &str) -> Id {
        match self.name_to_id.get(name) {
            Some(id) => *id,
            None => panic!("Unknown component: {}", name),
        }
    }

    /// Returns the name of component by its identifier.
    ///
    /// Panics if component with such id does not exist.
    pub fn lookup_name(&self, id: Id) -> String {
        self.names.borrow()[id as usize].clone()
    }

    /// Creates a new simulation context with specified name.
    ///
    /// Component ids are assigned sequentially starting from 0. Creating a context with an existing
    /// name reuses the id of that component.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use wnsim_core::Simulation;
    ///
    /// let mut sim = Simulation::new(123);
    /// let ap = sim.create_context("ap0");
    /// let sta = sim.create_context("sta0");
    /// assert_eq!(ap.id(), 0);
    /// assert_eq!(sta.id(), 1);
    /// assert_eq!(sta.name(), "sta0");
    /// ```
    pub fn create_context<S>(&mut self, name: S) -> SimulationContext
    where
        S: AsRef<str>,
    {
        let ctx = SimulationContext::new(
            self.register(name.as_ref()),
            name.as_ref(),
            self.sim_state.clone(),
            self.names.clone(),
        );
        self.log_debug("Created context", json!({"name": ctx.name(), "id": ctx.id()}));
        ctx
    }

    /// Registers the event handler for component with specified name, returns the component id.
    ///
    /// If a context with this name was created before, its id is reused.
    pub fn add_handler<S>(&mut self, name: S, handler: Rc<RefCell<dyn EventHandler>>) -> Id
    where
        S: AsRef<str>,
    {
        let id = self.register(name.as_ref());
        self.handlers[id as usize] = Some(handler);
        self.log_debug("Added handler", json!({"name": name.as_ref(), "id": id}));
        id
    }

    /// Removes the event handler for component with specified name.
    ///
    /// Pending events related to the component are cancelled according to the policy.
    /// Remaining events destined to the component are logged as undelivered.
    pub fn remove_handler<S>(&mut self, name: S, cancel_policy: EventCancellationPolicy)
    where
        S: AsRef<str>,
    {
        let id = self.lookup_id(name.as_ref());
        self.handlers[id as usize] = None;
        match cancel_policy {
            EventCancellationPolicy::Incoming => self.cancel_events(|e| e.dst == id),
            EventCancellationPolicy::Outgoing => self.cancel_events(|e| e.src == id),
            EventCancellationPolicy::All => self.cancel_events(|e| e.dst == id || e.src == id),
            EventCancellationPolicy::None => 0,
        };
        self.log_debug("Removed handler", json!({"name": name.as_ref(), "id": id}));
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.sim_state.borrow().time()
    }

    /// Performs a single step through the simulation.
    ///
    /// Takes the next pending event, advances the clock to its time and delivers it to the
    /// destination handler. Returns `false` if there were no pending events.
    pub fn step(&mut self) -> bool {
        let next = self.sim_state.borrow_mut().next_event();
        if let Some(event) = next {
            let handler = self.handlers.get(event.dst as usize).and_then(|h| h.clone());
            if let Some(handler) = handler {
                if log_enabled!(Trace) {
                    let src_name = self.lookup_name(event.src);
                    let dst_name = self.lookup_name(event.dst);
                    trace!(
                        target: &dst_name,
                        "[{:.6} {} {}] {}",
                        event.time,
                        get_colored("EVENT", colored::Color::BrightBlack),
                        dst_name,
                        json!({"type": type_name(&event.data).unwrap_or("?"), "data": event.data, "src": src_name})
                    );
                }
                handler.borrow_mut().on(event);
            } else {
                log_undelivered_event(event);
            }
            true
        } else {
            false
        }
    }

    /// Performs the specified number of steps, returns `false` if the events ran out earlier.
    pub fn steps(&mut self, step_count: u64) -> bool {
        for _ in 0..step_count {
            if !self.step() {
                return false;
            }
        }
        true
    }

    /// Steps through the simulation until there are no pending events left.
    pub fn step_until_no_events(&mut self) {
        while self.step() {}
    }

    /// Steps through the simulation for the specified duration from the current time.
    ///
    /// Returns `true` if there are pending events left.
    pub fn step_for_duration(&mut self, duration: f64) -> bool {
        let end_time = self.time() + duration;
        self.step_until_time(end_time)
    }

    /// Steps through the simulation until the specified time.
    ///
    /// Delivers every pending event with time less than or equal to `time`, including events created
    /// by handlers during this call. If there are events left, the clock is moved to `time`.
    /// Returns `true` if there are pending events left.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use serde::Serialize;
    /// use wnsim_core::Simulation;
    ///
    /// #[derive(Clone, Serialize)]
    /// pub struct Tick {}
    ///
    /// let mut sim = Simulation::new(123);
    /// let ctx = sim.create_context("clock");
    /// ctx.emit_self(Tick {}, 1.0);
    /// ctx.emit_self(Tick {}, 2.0);
    /// ctx.emit_self(Tick {}, 3.0);
    /// assert!(sim.step_until_time(2.0));
    /// assert_eq!(sim.time(), 2.0);
    /// assert_eq!(sim.pending_event_count(), 1);
    /// assert!(!sim.step_until_time(10.0));
    /// assert_eq!(sim.time(), 3.0);
    /// ```
    pub fn step_until_time(&mut self, time: f64) -> bool {
        loop {
            let next_time = self.sim_state.borrow_mut().peek_event().map(|e| e.time);
            match next_time {
                Some(t) if t <= time => {
                    self.step();
                }
                Some(_) => {
                    self.sim_state.borrow_mut().advance_clock(time);
                    return true;
                }
                None => return false,
            }
        }
    }

    /// Returns a random float in the range _[0, 1)_ using the simulation-wide random number generator.
    pub fn rand(&mut self) -> f64 {
        self.sim_state.borrow_mut().rand()
    }

    /// Returns a random number in the specified range using the simulation-wide random number generator.
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.sim_state.borrow_mut().gen_range(range)
    }

    /// Returns a random value from the specified distribution using the simulation-wide random number generator.
    pub fn sample_from_distribution<T, Dist: Distribution<T>>(&mut self, dist: &Dist) -> T {
        self.sim_state.borrow_mut().sample_from_distribution(dist)
    }

    /// Returns the total number of created events.
    pub fn event_count(&self) -> u64 {
        self.sim_state.borrow().event_count()
    }

    /// Returns the number of delivered events.
    pub fn processed_event_count(&self) -> u64 {
        self.sim_state.borrow().processed_count()
    }

    /// Returns the number of pending (scheduled and not cancelled) events.
    pub fn pending_event_count(&self) -> usize {
        self.sim_state.borrow().pending_count()
    }

    /// Cancels pending events that satisfy the predicate, returns the number of cancelled events.
    pub fn cancel_events<F>(&mut self, pred: F) -> usize
    where
        F: Fn(&Event) -> bool,
    {
        self.sim_state.borrow_mut().cancel_events(pred)
    }
}
