use std::collections::{BinaryHeap, HashSet};

use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::prelude::*;
use rand_pcg::Pcg64;

use crate::component::Id;
use crate::event::{Event, EventData, EventId};
use crate::log::log_incorrect_event;

/// Epsilon to compare floating point values for equality.
pub const EPSILON: f64 = 1e-12;

pub struct SimulationState {
    clock: f64,
    rand: Pcg64,
    events: BinaryHeap<Event>,
    // Ids of events which are scheduled and not cancelled.
    // Events popped from the heap whose id is not here were cancelled.
    pending_events: HashSet<EventId>,
    event_count: u64,
    processed_count: u64,
}

impl SimulationState {
    pub fn new(seed: u64) -> Self {
        Self {
            clock: 0.0,
            rand: Pcg64::seed_from_u64(seed),
            events: BinaryHeap::new(),
            pending_events: HashSet::new(),
            event_count: 0,
            processed_count: 0,
        }
    }

    pub fn time(&self) -> f64 {
        self.clock
    }

    pub fn advance_clock(&mut self, time: f64) {
        if time > self.clock {
            self.clock = time;
        }
    }

    pub fn rand(&mut self) -> f64 {
        self.rand.gen_range(0.0..1.0)
    }

    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.rand.gen_range(range)
    }

    pub fn sample_from_distribution<T, Dist: Distribution<T>>(&mut self, dist: &Dist) -> T {
        dist.sample(&mut self.rand)
    }

    pub fn gen_seed(&mut self) -> u64 {
        self.rand.next_u64()
    }

    pub fn add_event<T>(&mut self, data: T, src: Id, dst: Id, delay: f64) -> EventId
    where
        T: EventData,
    {
        let event_id = self.event_count;
        let event = Event {
            id: event_id,
            time: self.clock + delay.max(0.),
            src,
            dst,
            data: Box::new(data),
        };
        if delay < -EPSILON || delay.is_nan() {
            log_incorrect_event(&event, &format!("delay {}", delay));
            panic!("Event delay must be non-negative, it is not allowed to add events from the past");
        }
        self.events.push(event);
        self.pending_events.insert(event_id);
        self.event_count += 1;
        event_id
    }

    pub fn next_event(&mut self) -> Option<Event> {
        while let Some(event) = self.events.pop() {
            if self.pending_events.remove(&event.id) {
                self.clock = event.time;
                self.processed_count += 1;
                return Some(event);
            }
        }
        None
    }

    pub fn peek_event(&mut self) -> Option<&Event> {
        while let Some(event) = self.events.peek() {
            if self.pending_events.contains(&event.id) {
                break;
            }
            self.events.pop();
        }
        self.events.peek()
    }

    pub fn cancel_event(&mut self, id: EventId) -> bool {
        self.pending_events.remove(&id)
    }

    pub fn cancel_events<F>(&mut self, pred: F) -> usize
    where
        F: Fn(&Event) -> bool,
    {
        let mut cancelled = 0;
        for event in self.events.iter() {
            if pred(event) && self.pending_events.remove(&event.id) {
                cancelled += 1;
            }
        }
        cancelled
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    pub fn processed_count(&self) -> u64 {
        self.processed_count
    }

    pub fn pending_count(&self) -> usize {
        self.pending_events.len()
    }
}
