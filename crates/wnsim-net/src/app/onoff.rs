//! On/off constant bit rate source.

use rand_distr::Exp;
use serde::{Deserialize, Serialize};

use wnsim_core::{cast, log_debug, Event, EventHandler, EventId, SimulationContext};
use wnsim_wifi::Packet;

use crate::app::{AppStart, AppStop, Endpoints, SourceStats};
use crate::stack::SendPacket;

/// Duration of on and off periods.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Period {
    /// Fixed duration in seconds.
    Constant {
        /// Duration.
        value: f64,
    },
    /// Exponentially distributed duration.
    Exponential {
        /// Mean duration.
        mean: f64,
    },
}

impl Period {
    /// Checks that the period is well defined.
    pub fn is_valid(&self) -> bool {
        match *self {
            Self::Constant { value } => value >= 0. && value.is_finite(),
            Self::Exponential { mean } => mean > 0. && mean.is_finite(),
        }
    }

    fn sample(&self, ctx: &SimulationContext) -> f64 {
        match *self {
            Self::Constant { value } => value,
            Self::Exponential { mean } => match Exp::new(1. / mean) {
                Ok(dist) => ctx.sample_from_distribution(&dist),
                Err(_) => mean,
            },
        }
    }
}

#[derive(Clone, Serialize)]
struct SendTick {}

#[derive(Clone, Serialize)]
struct Toggle {}

/// Alternates between on periods, sending packets at a constant rate, and silent off periods.
///
/// The source does not wait for the outcome of transmissions, so a rate above the capacity of
/// the network fills the device queue.
pub struct OnOffApp {
    endpoints: Endpoints,
    payload_size: u32,
    data_rate: f64,
    on: Period,
    off: Period,
    is_on: bool,
    running: bool,
    tick_event: Option<EventId>,
    toggle_event: Option<EventId>,
    next_seq: u32,
    stats: SourceStats,
    ctx: SimulationContext,
}

impl OnOffApp {
    /// Creates the application sending at `data_rate` bits/s during on periods.
    pub fn new(
        endpoints: Endpoints,
        payload_size: u32,
        data_rate: f64,
        on: Period,
        off: Period,
        ctx: SimulationContext,
    ) -> Self {
        assert!(data_rate > 0., "Data rate must be > 0");
        Self {
            endpoints,
            payload_size,
            data_rate,
            on,
            off,
            is_on: false,
            running: false,
            tick_event: None,
            toggle_event: None,
            next_seq: 0,
            stats: SourceStats::default(),
            ctx,
        }
    }

    /// Returns the send counters.
    pub fn stats(&self) -> &SourceStats {
        &self.stats
    }

    /// Checks whether the source is in an on period.
    pub fn is_on(&self) -> bool {
        self.is_on
    }

    fn packet_interval(&self) -> f64 {
        self.payload_size as f64 * 8. / self.data_rate
    }

    fn start_on_period(&mut self) {
        self.is_on = true;
        let duration = self.on.sample(&self.ctx);
        self.toggle_event = Some(self.ctx.emit_self(Toggle {}, duration));
        if self.tick_event.is_none() {
            self.send_packet();
        }
    }

    fn start_off_period(&mut self) {
        let duration = self.off.sample(&self.ctx);
        if duration <= 0. {
            let duration = self.on.sample(&self.ctx);
            self.toggle_event = Some(self.ctx.emit_self(Toggle {}, duration));
            return;
        }
        self.is_on = false;
        if let Some(id) = self.tick_event.take() {
            self.ctx.cancel_event(id);
        }
        self.toggle_event = Some(self.ctx.emit_self(Toggle {}, duration));
    }

    fn send_packet(&mut self) {
        let packet = Packet::udp(
            self.ctx.id(),
            self.next_seq,
            self.endpoints.src,
            self.endpoints.src_port,
            self.endpoints.dst,
            self.endpoints.dst_port,
            self.payload_size,
            self.ctx.time(),
        );
        self.next_seq += 1;
        self.stats.sent_packets += 1;
        self.stats.sent_bytes += self.payload_size as u64;
        self.ctx.emit_now(SendPacket { packet }, self.endpoints.stack);
        self.tick_event = Some(self.ctx.emit_self(SendTick {}, self.packet_interval()));
    }

    /// Stops sending and cancels pending timers.
    pub fn stop(&mut self) {
        self.running = false;
        self.is_on = false;
        for id in [self.tick_event.take(), self.toggle_event.take()].into_iter().flatten() {
            self.ctx.cancel_event(id);
        }
    }
}

impl EventHandler for OnOffApp {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            AppStart {} => {
                if !self.running {
                    log_debug!(self.ctx, "started sending to {}:{}", self.endpoints.dst, self.endpoints.dst_port);
                    self.running = true;
                    self.start_on_period();
                }
            }
            AppStop {} => {
                log_debug!(self.ctx, "stopped after {} packets", self.stats.sent_packets);
                self.stop();
            }
            SendTick {} => {
                self.tick_event = None;
                if self.running && self.is_on {
                    self.send_packet();
                }
            }
            Toggle {} => {
                self.toggle_event = None;
                if !self.running {
                    return;
                }
                if self.is_on {
                    self.start_off_period();
                } else {
                    self.start_on_period();
                }
            }
        })
    }
}
