//! UDP echo client and server.

use std::collections::BTreeMap;

use serde::Serialize;

use wnsim_core::{cast, log_debug, log_trace, log_warn, Event, EventHandler, EventId, Id, SimulationContext};
use wnsim_wifi::Packet;

use crate::app::{AppStart, AppStop, Endpoints, SourceStats};
use crate::stack::{PacketDelivered, SendPacket};

#[derive(Clone, Serialize)]
struct EchoTick {}

/// Round-trip statistics of an echo client.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EchoStats {
    /// Sent requests.
    pub requests: u64,
    /// Received replies.
    pub replies: u64,
    /// Minimum round-trip time.
    pub min_rtt: Option<f64>,
    /// Maximum round-trip time.
    pub max_rtt: Option<f64>,
    /// Sum of round-trip times.
    pub rtt_sum: f64,
}

impl EchoStats {
    /// Returns the mean round-trip time or 0 if no reply was received.
    pub fn mean_rtt(&self) -> f64 {
        if self.replies == 0 {
            0.
        } else {
            self.rtt_sum / self.replies as f64
        }
    }

    fn add_rtt(&mut self, rtt: f64) {
        self.replies += 1;
        self.rtt_sum += rtt;
        self.min_rtt = Some(self.min_rtt.map_or(rtt, |min| min.min(rtt)));
        self.max_rtt = Some(self.max_rtt.map_or(rtt, |max| max.max(rtt)));
    }
}

/// Sends requests to an echo server at fixed intervals and measures round-trip times.
///
/// The client must be bound to its source port to receive the replies.
pub struct EchoClient {
    endpoints: Endpoints,
    payload_size: u32,
    interval: f64,
    max_requests: Option<u64>,
    running: bool,
    tick_event: Option<EventId>,
    next_seq: u32,
    pending: BTreeMap<u64, f64>,
    source: SourceStats,
    stats: EchoStats,
    ctx: SimulationContext,
}

impl EchoClient {
    /// Creates the client sending a request every `interval` seconds, at most `max_requests` in
    /// total if the limit is set.
    pub fn new(
        endpoints: Endpoints,
        payload_size: u32,
        interval: f64,
        max_requests: Option<u64>,
        ctx: SimulationContext,
    ) -> Self {
        assert!(interval > 0., "Echo interval must be > 0");
        Self {
            endpoints,
            payload_size,
            interval,
            max_requests,
            running: false,
            tick_event: None,
            next_seq: 0,
            pending: BTreeMap::new(),
            source: SourceStats::default(),
            stats: EchoStats::default(),
            ctx,
        }
    }

    /// Returns the round-trip statistics.
    pub fn stats(&self) -> &EchoStats {
        &self.stats
    }

    /// Returns the send counters.
    pub fn source_stats(&self) -> &SourceStats {
        &self.source
    }

    /// Returns the number of requests without reply.
    pub fn unanswered(&self) -> usize {
        self.pending.len()
    }

    /// Stops sending requests, replies are still accepted.
    pub fn stop(&mut self) {
        self.running = false;
        if let Some(id) = self.tick_event.take() {
            self.ctx.cancel_event(id);
        }
    }

    fn send_request(&mut self) {
        if self.max_requests.map_or(false, |max| self.stats.requests >= max) {
            return;
        }
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
        self.stats.requests += 1;
        self.source.sent_packets += 1;
        self.source.sent_bytes += self.payload_size as u64;
        self.pending.insert(packet.uid, self.ctx.time());
        self.ctx.emit_now(SendPacket { packet }, self.endpoints.stack);
        self.tick_event = Some(self.ctx.emit_self(EchoTick {}, self.interval));
    }

    fn on_reply(&mut self, packet: Packet) {
        match packet.reply_to.and_then(|uid| self.pending.remove(&uid)) {
            Some(sent_at) => {
                let rtt = self.ctx.time() - sent_at;
                log_trace!(self.ctx, "reply from {} after {:.6} s", packet.src, rtt);
                self.stats.add_rtt(rtt);
            }
            None => {
                log_warn!(self.ctx, "unexpected packet {} from {}", packet.uid, packet.src);
            }
        }
    }
}

impl EventHandler for EchoClient {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            AppStart {} => {
                if !self.running {
                    log_debug!(self.ctx, "started echo to {}:{}", self.endpoints.dst, self.endpoints.dst_port);
                    self.running = true;
                    self.send_request();
                }
            }
            AppStop {} => {
                self.stop();
            }
            EchoTick {} => {
                self.tick_event = None;
                if self.running {
                    self.send_request();
                }
            }
            PacketDelivered { packet } => {
                self.on_reply(packet);
            }
        })
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Answers each received packet with a packet of the same size sent back to its source.
pub struct EchoServer {
    stack: Id,
    next_seq: u32,
    echoed: u64,
    ctx: SimulationContext,
}

impl EchoServer {
    /// Creates the server replying via the stack. The server must be bound to its port.
    pub fn new(stack: Id, ctx: SimulationContext) -> Self {
        Self {
            stack,
            next_seq: 0,
            echoed: 0,
            ctx,
        }
    }

    /// Returns the number of answered requests.
    pub fn echoed(&self) -> u64 {
        self.echoed
    }
}

impl EventHandler for EchoServer {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            PacketDelivered { packet } => {
                let mut reply = Packet::udp(
                    self.ctx.id(),
                    self.next_seq,
                    packet.dst,
                    packet.dst_port,
                    packet.src,
                    packet.src_port,
                    packet.payload_size,
                    self.ctx.time(),
                );
                reply.reply_to = Some(packet.uid);
                self.next_seq += 1;
                self.echoed += 1;
                self.ctx.emit_now(SendPacket { packet: reply }, self.stack);
            }
        })
    }
}
