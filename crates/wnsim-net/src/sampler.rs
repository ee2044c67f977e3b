//! Periodic throughput sampling.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Serialize;

use wnsim_core::{cast, log_info, Event, EventHandler, EventId, SimulationContext, EPSILON};

use crate::monitor::FlowMonitor;

/// Returns the throughput in Mbit/s between two readings of a received bytes counter taken
/// `interval` seconds apart. Returns 0 for a non-positive interval or a decreasing counter.
///
/// # Examples
///
/// ```rust
/// use wnsim_net::sampler::incremental_throughput_mbps;
///
/// let mbps = incremental_throughput_mbps(75_000, 125_000, 0.1);
/// assert!((mbps - 4.).abs() < 1e-9);
/// ```
pub fn incremental_throughput_mbps(prev_bytes: u64, curr_bytes: u64, interval: f64) -> f64 {
    if interval <= 0. {
        return 0.;
    }
    curr_bytes.saturating_sub(prev_bytes) as f64 * 8. / interval / 1e6
}

#[derive(Clone, Serialize)]
struct SampleTick {}

/// Aggregate throughput over one sampling interval.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ThroughputSample {
    /// Time at the end of the interval.
    pub time: f64,
    /// Throughput in Mbit/s.
    pub mbps: f64,
}

/// Received bytes of a flow at a sampling time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlowSample {
    /// Sampling time.
    pub time: f64,
    /// Flow id.
    pub flow_id: u32,
    /// Bytes received by the flow so far.
    pub rx_bytes: u64,
    /// Throughput of the flow over the last interval in Mbit/s.
    pub mbps: f64,
}

/// Reads the flow monitor every `interval` seconds and records the throughput series.
pub struct ThroughputSampler {
    monitor: Rc<RefCell<FlowMonitor>>,
    interval: f64,
    stop_time: f64,
    prev_total: u64,
    prev_flows: BTreeMap<u32, u64>,
    samples: Vec<ThroughputSample>,
    flow_samples: Vec<FlowSample>,
    tick_event: Option<EventId>,
    ctx: SimulationContext,
}

impl ThroughputSampler {
    /// Creates a sampler. Sampling is started with [`start`](Self::start).
    pub fn new(monitor: Rc<RefCell<FlowMonitor>>, interval: f64, ctx: SimulationContext) -> Self {
        assert!(interval > 0., "Sampling interval must be > 0");
        Self {
            monitor,
            interval,
            stop_time: f64::INFINITY,
            prev_total: 0,
            prev_flows: BTreeMap::new(),
            samples: Vec::new(),
            flow_samples: Vec::new(),
            tick_event: None,
            ctx,
        }
    }

    /// Schedules the first sample at time `start` and sampling every interval until `stop_time`.
    ///
    /// The first sample covers the interval preceding `start`.
    pub fn start(&mut self, start: f64, stop_time: f64) {
        self.stop_time = stop_time;
        let delay = (start - self.ctx.time()).max(0.);
        self.tick_event = Some(self.ctx.emit_self(SampleTick {}, delay));
    }

    /// Cancels further sampling.
    pub fn stop(&mut self) {
        if let Some(id) = self.tick_event.take() {
            self.ctx.cancel_event(id);
        }
    }

    /// Returns the aggregate throughput series.
    pub fn samples(&self) -> &[ThroughputSample] {
        &self.samples
    }

    /// Returns the per-flow series.
    pub fn flow_samples(&self) -> &[FlowSample] {
        &self.flow_samples
    }

    /// Returns the per-flow series of the flow.
    pub fn flow_series(&self, flow_id: u32) -> Vec<&FlowSample> {
        self.flow_samples.iter().filter(|s| s.flow_id == flow_id).collect()
    }

    fn sample(&mut self) {
        let now = self.ctx.time();
        let monitor = self.monitor.borrow();
        let total = monitor.total_rx_bytes();
        let mbps = incremental_throughput_mbps(self.prev_total, total, self.interval);
        log_info!(self.ctx, "{:.1}s: \t{:.3} Mbit/s", now, mbps);
        self.samples.push(ThroughputSample { time: now, mbps });
        self.prev_total = total;

        for record in monitor.flows() {
            let prev = self.prev_flows.insert(record.flow_id, record.rx_bytes).unwrap_or(0);
            self.flow_samples.push(FlowSample {
                time: now,
                flow_id: record.flow_id,
                rx_bytes: record.rx_bytes,
                mbps: incremental_throughput_mbps(prev, record.rx_bytes, self.interval),
            });
        }
    }
}

impl EventHandler for ThroughputSampler {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            SampleTick {} => {
                self.tick_event = None;
                self.sample();
                if self.ctx.time() + self.interval <= self.stop_time + EPSILON {
                    self.tick_event = Some(self.ctx.emit_self(SampleTick {}, self.interval));
                }
            }
        })
    }
}
