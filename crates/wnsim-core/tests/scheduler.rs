//! Tests of event ordering and time-bounded execution.

use std::cell::RefCell;
use std::rc::Rc;

use rstest::rstest;
use serde::Serialize;
use sugars::{rc, refcell};

use wnsim_core::{cast, Event, EventHandler, Simulation, SimulationContext};

#[derive(Clone, Serialize)]
struct Tagged {
    tag: u32,
}

#[derive(Clone, Serialize)]
struct Chain {
    remaining: u32,
    delay: f64,
}

struct Recorder {
    ctx: SimulationContext,
    delivered: Vec<(f64, u32)>,
}

impl Recorder {
    fn new(ctx: SimulationContext) -> Self {
        Self {
            ctx,
            delivered: Vec::new(),
        }
    }
}

impl EventHandler for Recorder {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            Tagged { tag } => {
                self.delivered.push((self.ctx.time(), tag));
            }
            Chain { remaining, delay } => {
                self.delivered.push((self.ctx.time(), remaining));
                if remaining > 0 {
                    self.ctx.emit_self(
                        Chain {
                            remaining: remaining - 1,
                            delay,
                        },
                        delay,
                    );
                }
            }
        })
    }
}

fn setup(seed: u64) -> (Simulation, Rc<RefCell<Recorder>>) {
    let mut sim = Simulation::new(seed);
    let recorder = rc!(refcell!(Recorder::new(sim.create_context("recorder"))));
    sim.add_handler("recorder", recorder.clone());
    (sim, recorder)
}

#[test]
fn test_events_delivered_in_time_order() {
    let (mut sim, recorder) = setup(1);
    let src = sim.create_context("src");
    let dst = sim.lookup_id("recorder");
    for (tag, delay) in [(0, 3.0), (1, 1.0), (2, 2.5), (3, 0.5), (4, 2.0)] {
        src.emit(Tagged { tag }, dst, delay);
    }
    sim.step_until_no_events();

    let delivered = &recorder.borrow().delivered;
    let tags: Vec<u32> = delivered.iter().map(|(_, tag)| *tag).collect();
    assert_eq!(tags, vec![3, 1, 4, 2, 0]);
    assert!(delivered.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(sim.time(), 3.0);
}

#[test]
fn test_equal_times_are_fifo() {
    let (mut sim, recorder) = setup(1);
    let src = sim.create_context("src");
    let dst = sim.lookup_id("recorder");
    for tag in 0..10 {
        src.emit(Tagged { tag }, dst, 1.0);
    }
    src.emit(Tagged { tag: 100 }, dst, 0.5);
    sim.step_until_no_events();

    let tags: Vec<u32> = recorder.borrow().delivered.iter().map(|(_, tag)| *tag).collect();
    assert_eq!(tags, vec![100, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
}

#[rstest]
#[case(0.0, 1)]
#[case(0.99, 1)]
#[case(1.0, 2)]
#[case(2.5, 3)]
#[case(4.0, 5)]
#[case(100.0, 6)]
fn test_step_until_time_includes_boundary(#[case] stop: f64, #[case] expected: usize) {
    let (mut sim, recorder) = setup(1);
    let ctx = sim.create_context("src");
    let dst = sim.lookup_id("recorder");
    for (tag, delay) in [0.0, 1.0, 2.0, 3.0, 4.0, 5.0].into_iter().enumerate() {
        ctx.emit(Tagged { tag: tag as u32 }, dst, delay);
    }
    let remaining = sim.step_until_time(stop);

    assert_eq!(recorder.borrow().delivered.len(), expected);
    assert_eq!(remaining, expected < 6);
    if remaining {
        assert_eq!(sim.time(), stop);
    } else {
        assert_eq!(sim.time(), 5.0);
    }
}

#[test]
fn test_events_created_during_run_are_eligible() {
    let (mut sim, recorder) = setup(1);
    recorder.borrow().ctx.emit_self_now(Chain { remaining: 4, delay: 0.25 });

    assert!(!sim.step_until_time(1.0));
    let delivered = &recorder.borrow().delivered;
    assert_eq!(delivered.len(), 5);
    assert_eq!(delivered.last(), Some(&(1.0, 0)));
}

#[test]
fn test_zero_delay_event_runs_after_already_scheduled() {
    let (mut sim, recorder) = setup(1);
    let ctx = sim.create_context("src");
    let dst = sim.lookup_id("recorder");
    ctx.emit(Tagged { tag: 1 }, dst, 1.0);
    ctx.emit(Tagged { tag: 2 }, dst, 1.0);
    sim.step();
    ctx.emit_now(Tagged { tag: 3 }, dst);
    sim.step_until_no_events();

    let tags: Vec<u32> = recorder.borrow().delivered.iter().map(|(_, tag)| *tag).collect();
    assert_eq!(tags, vec![1, 2, 3]);
}

#[test]
fn test_step_for_duration() {
    let (mut sim, recorder) = setup(1);
    recorder.borrow().ctx.emit_self_now(Chain { remaining: 10, delay: 1.0 });

    assert!(sim.step_for_duration(3.5));
    assert_eq!(recorder.borrow().delivered.len(), 4);
    assert_eq!(sim.time(), 3.5);
    assert!(sim.step_for_duration(3.5));
    assert_eq!(recorder.borrow().delivered.len(), 8);
    assert_eq!(sim.time(), 7.0);
}

#[test]
fn test_same_seed_same_random_sequence() {
    let mut sim1 = Simulation::new(42);
    let mut sim2 = Simulation::new(42);
    let ctx1 = sim1.create_context("a");
    let ctx2 = sim2.create_context("a");
    for _ in 0..100 {
        let v1: u32 = ctx1.gen_range(0..=1023);
        let v2: u32 = ctx2.gen_range(0..=1023);
        assert_eq!(v1, v2);
    }
    assert_eq!(sim1.rand(), sim2.rand());
    assert_eq!(ctx1.gen_seed(), ctx2.gen_seed());
}

#[test]
fn test_undelivered_event_is_consumed() {
    let mut sim = Simulation::new(1);
    let ctx = sim.create_context("orphan");
    ctx.emit_self(Tagged { tag: 0 }, 1.0);

    assert!(sim.step());
    assert_eq!(sim.pending_event_count(), 0);
    assert_eq!(sim.processed_event_count(), 1);
    assert!(!sim.step());
}
