//! Wired point-to-point link of the backbone.
//!
//! Each direction of the link transmits packets one after another at the link bandwidth, so
//! packets queue behind the ones being transmitted. A packet arrives at the other end after its
//! transmission plus the link latency.

use serde::Serialize;

use wnsim_core::{cast, log_error, log_trace, Event, EventHandler, Id, SimulationContext};
use wnsim_wifi::{Packet, TxDone};

// EVENTS //////////////////////////////////////////////////////////////////////

/// Request from a stack to send the packet over the link.
#[derive(Clone, Serialize)]
pub struct LinkTransmit {
    /// Packet to send.
    pub packet: Packet,
}

/// Packet arrived at the stack from the link.
#[derive(Clone, Serialize)]
pub struct LinkReceive {
    /// Received packet.
    pub packet: Packet,
    /// Link component.
    pub link: Id,
}

////////////////////////////////////////////////////////////////////////////////

/// Counters of one link direction.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LinkCounters {
    /// Transmitted packets.
    pub packets: u64,
    /// Transmitted bytes.
    pub bytes: u64,
}

/// Full-duplex wired link between two stacks.
pub struct WiredLink {
    endpoints: [Id; 2],
    bandwidth: f64,
    latency: f64,
    busy_until: [f64; 2],
    counters: [LinkCounters; 2],
    ctx: SimulationContext,
}

impl WiredLink {
    /// Creates a link between two stacks with given bandwidth (bits/s) and latency (s).
    pub fn new(endpoint1: Id, endpoint2: Id, bandwidth: f64, latency: f64, ctx: SimulationContext) -> Self {
        assert!(bandwidth > 0.0, "Link bandwidth must be > 0");
        Self {
            endpoints: [endpoint1, endpoint2],
            bandwidth,
            latency,
            busy_until: [0.; 2],
            counters: Default::default(),
            ctx,
        }
    }

    /// Returns the component id of the link.
    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    /// Returns the counters of the direction starting at the endpoint.
    pub fn counters(&self, from: Id) -> Option<&LinkCounters> {
        self.direction(from).map(|dir| &self.counters[dir])
    }

    /// Checks whether some packet is still being transmitted or propagating.
    pub fn is_busy(&self) -> bool {
        let now = self.ctx.time();
        self.busy_until
            .iter()
            .zip(self.counters.iter())
            .any(|(t, counters)| counters.packets > 0 && *t + self.latency > now)
    }

    fn direction(&self, from: Id) -> Option<usize> {
        self.endpoints.iter().position(|endpoint| *endpoint == from)
    }

    fn transmit(&mut self, mut packet: Packet, from: Id) {
        let dir = match self.direction(from) {
            Some(dir) => dir,
            None => {
                log_error!(self.ctx, "packet {} from unknown endpoint {}", packet.uid, from);
                return;
            }
        };
        let now = self.ctx.time();
        let start = self.busy_until[dir].max(now);
        let end = start + packet.size() as f64 * 8. / self.bandwidth;
        self.busy_until[dir] = end;
        self.counters[dir].packets += 1;
        self.counters[dir].bytes += packet.size() as u64;

        if let Some(app) = packet.origin_app.take() {
            self.ctx.emit(
                TxDone {
                    packet_uid: packet.uid,
                    success: true,
                },
                app,
                end - now,
            );
        }
        log_trace!(self.ctx, "packet {} leaves at {:.6}", packet.uid, end);
        let link = self.ctx.id();
        self.ctx
            .emit(LinkReceive { packet, link }, self.endpoints[1 - dir], end + self.latency - now);
    }
}

impl EventHandler for WiredLink {
    fn on(&mut self, event: Event) {
        let src = event.src;
        cast!(match event.data {
            LinkTransmit { packet } => {
                self.transmit(packet, src);
            }
        })
    }
}
