//! Bulk transfer source.

use wnsim_core::{cast, log_debug, Event, EventHandler, SimulationContext};
use wnsim_wifi::{Packet, TxDone};

use crate::app::{AppStart, AppStop, Endpoints, SourceStats};
use crate::stack::SendPacket;

/// Sends packets as fast as the first hop accepts them.
///
/// At most `window` packets are outstanding at the first hop, a new packet is sent whenever the
/// first hop reports the outcome of a previous one via [`TxDone`]. Sending stops after
/// `max_bytes` payload bytes if the limit is set.
pub struct BulkSend {
    endpoints: Endpoints,
    payload_size: u32,
    window: u32,
    max_bytes: Option<u64>,
    outstanding: u32,
    running: bool,
    next_seq: u32,
    stats: SourceStats,
    failed: u64,
    ctx: SimulationContext,
}

impl BulkSend {
    /// Creates the application.
    pub fn new(
        endpoints: Endpoints,
        payload_size: u32,
        window: u32,
        max_bytes: Option<u64>,
        ctx: SimulationContext,
    ) -> Self {
        Self {
            endpoints,
            payload_size,
            window: window.max(1),
            max_bytes,
            outstanding: 0,
            running: false,
            next_seq: 0,
            stats: SourceStats::default(),
            failed: 0,
            ctx,
        }
    }

    /// Returns the send counters.
    pub fn stats(&self) -> &SourceStats {
        &self.stats
    }

    /// Returns the number of packets the first hop failed to transmit.
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Returns the number of packets awaiting the outcome at the first hop.
    pub fn outstanding(&self) -> u32 {
        self.outstanding
    }

    /// Stops sending, outcomes of packets in flight are still accounted.
    pub fn stop(&mut self) {
        self.running = false;
    }

    fn limit_reached(&self) -> bool {
        self.max_bytes
            .map_or(false, |max| self.stats.sent_bytes + self.payload_size as u64 > max)
    }

    fn fill_window(&mut self) {
        while self.running && self.outstanding < self.window && !self.limit_reached() {
            let mut packet = Packet::udp(
                self.ctx.id(),
                self.next_seq,
                self.endpoints.src,
                self.endpoints.src_port,
                self.endpoints.dst,
                self.endpoints.dst_port,
                self.payload_size,
                self.ctx.time(),
            );
            packet.origin_app = Some(self.ctx.id());
            self.next_seq += 1;
            self.outstanding += 1;
            self.stats.sent_packets += 1;
            self.stats.sent_bytes += self.payload_size as u64;
            self.ctx.emit_now(SendPacket { packet }, self.endpoints.stack);
        }
    }
}

impl EventHandler for BulkSend {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            AppStart {} => {
                log_debug!(self.ctx, "started sending to {}:{}", self.endpoints.dst, self.endpoints.dst_port);
                self.running = true;
                self.fill_window();
            }
            AppStop {} => {
                log_debug!(self.ctx, "stopped after {} packets", self.stats.sent_packets);
                self.stop();
            }
            TxDone { success, .. } => {
                self.outstanding = self.outstanding.saturating_sub(1);
                if !success {
                    self.failed += 1;
                }
                self.fill_window();
            }
        })
    }
}
