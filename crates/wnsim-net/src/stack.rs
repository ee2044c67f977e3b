//! IP-like network stack of a node.
//!
//! The stack accepts packets from local applications, forwards transit packets according to its
//! static routing table and delivers packets addressed to the node to the application bound to
//! the destination port. Packet notifications (sent, forwarded, received, dropped) are published
//! to subscribers such as the flow monitor and the packet tracer.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::ops::AddAssign;

use serde::Serialize;
use thiserror::Error;

use wnsim_core::{cast, log_debug, log_trace, Event, EventHandler, Id, Observers, SimulationContext, SubscriptionId};
use wnsim_wifi::{MacAddress, MacReceive, MacSend, Packet, TxDone};

use crate::link::{LinkReceive, LinkTransmit};

// EVENTS //////////////////////////////////////////////////////////////////////

/// Request from a local application to send a packet.
#[derive(Clone, Serialize)]
pub struct SendPacket {
    /// Packet to send.
    pub packet: Packet,
}

/// Packet delivered to the application bound to its destination port.
#[derive(Clone, Serialize)]
pub struct PacketDelivered {
    /// Delivered packet.
    pub packet: Packet,
}

// NOTIFICATIONS ///////////////////////////////////////////////////////////////

/// Reason of a packet drop by the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DropReason {
    /// There is no route to the destination.
    NoRoute,
    /// The hop limit was reached.
    TtlExpired,
    /// No application is bound to the destination port.
    NoSink,
}

/// What happened to a packet in the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PacketEventKind {
    /// Packet sent by a local application.
    Sent,
    /// Transit packet forwarded to the next hop.
    Forwarded,
    /// Packet delivered to a local application.
    Received,
    /// Packet discarded.
    Dropped(DropReason),
}

/// Notification about a packet passing the stack.
#[derive(Clone, Debug)]
pub struct PacketNotification {
    /// Event time.
    pub time: f64,
    /// Node of the stack.
    pub node: usize,
    /// What happened.
    pub kind: PacketEventKind,
    /// The packet.
    pub packet: Packet,
}

/// Error of the stack setup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    /// The port already has a bound application.
    #[error("port {0} is already bound")]
    PortInUse(u16),
}

////////////////////////////////////////////////////////////////////////////////

/// Interface used to reach a neighbour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NextHop {
    /// Neighbour reachable via the wifi device.
    Wifi {
        /// Local wifi device.
        device: Id,
        /// MAC address of the neighbour.
        address: MacAddress,
    },
    /// Neighbour at the other end of the wired link.
    Wired {
        /// Link component.
        link: Id,
    },
}

/// Packet counters of the stack.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StackCounters {
    /// Packets sent by local applications.
    pub sent: u64,
    /// Transit packets forwarded.
    pub forwarded: u64,
    /// Packets delivered to local applications.
    pub delivered: u64,
    /// Packets dropped because of missing route.
    pub no_route: u64,
    /// Packets dropped because the hop limit was reached.
    pub ttl_expired: u64,
    /// Packets addressed to a port without bound application.
    pub no_sink: u64,
}

impl AddAssign<&StackCounters> for StackCounters {
    fn add_assign(&mut self, other: &StackCounters) {
        self.sent += other.sent;
        self.forwarded += other.forwarded;
        self.delivered += other.delivered;
        self.no_route += other.no_route;
        self.ttl_expired += other.ttl_expired;
        self.no_sink += other.no_sink;
    }
}

/// Network stack of a node.
pub struct IpStack {
    node: usize,
    address: Ipv4Addr,
    routes: BTreeMap<Ipv4Addr, NextHop>,
    sinks: BTreeMap<u16, Id>,
    counters: StackCounters,
    observers: Observers<PacketNotification>,
    ctx: SimulationContext,
}

impl IpStack {
    /// Creates a stack of the node with given address.
    pub fn new(node: usize, address: Ipv4Addr, ctx: SimulationContext) -> Self {
        Self {
            node,
            address,
            routes: BTreeMap::new(),
            sinks: BTreeMap::new(),
            counters: StackCounters::default(),
            observers: Observers::new(),
            ctx,
        }
    }

    /// Returns the component id of the stack.
    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    /// Returns the node index.
    pub fn node(&self) -> usize {
        self.node
    }

    /// Returns the node address.
    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    /// Adds a host route. Replaces the existing route to the same destination.
    pub fn add_route(&mut self, dst: Ipv4Addr, next_hop: NextHop) {
        self.routes.insert(dst, next_hop);
    }

    /// Returns the next hop towards the destination.
    pub fn route(&self, dst: Ipv4Addr) -> Option<NextHop> {
        self.routes.get(&dst).copied()
    }

    /// Returns the number of routes.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Binds the application to the port, so it receives [`PacketDelivered`] events.
    pub fn bind(&mut self, port: u16, app: Id) -> Result<(), StackError> {
        if self.sinks.contains_key(&port) {
            return Err(StackError::PortInUse(port));
        }
        self.sinks.insert(port, app);
        Ok(())
    }

    /// Releases the port. Returns the application which was bound to it.
    pub fn unbind(&mut self, port: u16) -> Option<Id> {
        self.sinks.remove(&port)
    }

    /// Subscribes to packet notifications.
    pub fn subscribe<F>(&mut self, f: F) -> SubscriptionId
    where
        F: FnMut(&PacketNotification) + 'static,
    {
        self.observers.subscribe(f)
    }

    /// Cancels a subscription made with [`subscribe`](Self::subscribe).
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Returns the packet counters.
    pub fn counters(&self) -> &StackCounters {
        &self.counters
    }

    /// Sends the packet of a local application.
    pub fn send(&mut self, mut packet: Packet) {
        self.counters.sent += 1;
        self.notify(PacketEventKind::Sent, &packet);
        if packet.dst == self.address {
            if let Some(app) = packet.origin_app.take() {
                self.ctx.emit_now(
                    TxDone {
                        packet_uid: packet.uid,
                        success: true,
                    },
                    app,
                );
            }
            self.deliver(packet);
        } else {
            self.forward(packet);
        }
    }

    /// Delivers the packet addressed to this node to the application bound to its destination
    /// port. Without a bound application the packet is discarded.
    pub fn deliver(&mut self, packet: Packet) {
        match self.sinks.get(&packet.dst_port).copied() {
            Some(app) => {
                self.counters.delivered += 1;
                self.notify(PacketEventKind::Received, &packet);
                self.ctx.emit_now(PacketDelivered { packet }, app);
            }
            None => {
                self.counters.no_sink += 1;
                log_debug!(self.ctx, "no application on port {}, dropping packet {}", packet.dst_port, packet.uid);
                self.drop_packet(packet, DropReason::NoSink);
            }
        }
    }

    fn receive(&mut self, mut packet: Packet) {
        if packet.dst == self.address {
            self.deliver(packet);
            return;
        }
        if packet.ttl <= 1 {
            self.counters.ttl_expired += 1;
            self.drop_packet(packet, DropReason::TtlExpired);
            return;
        }
        packet.ttl -= 1;
        // only the first hop reports transmission results to the application
        packet.origin_app = None;
        self.counters.forwarded += 1;
        self.notify(PacketEventKind::Forwarded, &packet);
        self.forward(packet);
    }

    fn forward(&mut self, packet: Packet) {
        match self.routes.get(&packet.dst).copied() {
            Some(NextHop::Wifi { device, address }) => {
                log_trace!(self.ctx, "packet {} to {} via {}", packet.uid, packet.dst, address);
                self.ctx.emit_now(
                    MacSend {
                        packet,
                        next_hop: address,
                    },
                    device,
                );
            }
            Some(NextHop::Wired { link }) => {
                log_trace!(self.ctx, "packet {} to {} via wire", packet.uid, packet.dst);
                self.ctx.emit_now(LinkTransmit { packet }, link);
            }
            None => {
                self.counters.no_route += 1;
                log_debug!(self.ctx, "no route to {}, dropping packet {}", packet.dst, packet.uid);
                self.drop_packet(packet, DropReason::NoRoute);
            }
        }
    }

    fn drop_packet(&mut self, packet: Packet, reason: DropReason) {
        if let Some(app) = packet.origin_app {
            self.ctx.emit_now(
                TxDone {
                    packet_uid: packet.uid,
                    success: false,
                },
                app,
            );
        }
        self.notify(PacketEventKind::Dropped(reason), &packet);
    }

    fn notify(&mut self, kind: PacketEventKind, packet: &Packet) {
        if self.observers.is_empty() {
            return;
        }
        self.observers.notify(&PacketNotification {
            time: self.ctx.time(),
            node: self.node,
            kind,
            packet: packet.clone(),
        });
    }
}

impl EventHandler for IpStack {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            SendPacket { packet } => {
                self.send(packet);
            }
            MacReceive { packet, .. } => {
                self.receive(packet);
            }
            LinkReceive { packet, .. } => {
                self.receive(packet);
            }
        })
    }
}
