//! Application consuming received packets.

use serde::Serialize;

use wnsim_core::{cast, log_trace, Event, EventHandler, SimulationContext};

use crate::stack::PacketDelivered;

/// Counters of a packet sink.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SinkStats {
    /// Received packets.
    pub rx_packets: u64,
    /// Received payload bytes.
    pub rx_bytes: u64,
    /// Time of the first received packet.
    pub first_rx: Option<f64>,
    /// Time of the last received packet.
    pub last_rx: Option<f64>,
}

/// Counts the packets delivered to its port.
pub struct PacketSink {
    port: u16,
    stats: SinkStats,
    ctx: SimulationContext,
}

impl PacketSink {
    /// Creates a sink listening on the port. The sink must also be bound to the port of the stack.
    pub fn new(port: u16, ctx: SimulationContext) -> Self {
        Self {
            port,
            stats: SinkStats::default(),
            ctx,
        }
    }

    /// Returns the port of the sink.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the total number of received payload bytes.
    pub fn total_rx(&self) -> u64 {
        self.stats.rx_bytes
    }

    /// Returns the sink counters.
    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }
}

impl EventHandler for PacketSink {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            PacketDelivered { packet } => {
                let now = self.ctx.time();
                log_trace!(self.ctx, "received packet {} from {}", packet.uid, packet.src);
                self.stats.rx_packets += 1;
                self.stats.rx_bytes += packet.payload_size as u64;
                self.stats.first_rx.get_or_insert(now);
                self.stats.last_rx = Some(now);
            }
        })
    }
}
