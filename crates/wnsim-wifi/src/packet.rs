//! Network packets carried by devices and links.

use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;

use serde::Serialize;

use wnsim_core::Id;

/// IP protocol number of UDP.
pub const PROTOCOL_UDP: u8 = 17;
/// Size of IPv4 and UDP headers in bytes.
pub const HEADERS_SIZE: u32 = 28;
/// Initial time-to-live of packets.
pub const DEFAULT_TTL: u8 = 64;

/// Five-tuple identifying a flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FlowKey {
    /// Source address.
    pub src: Ipv4Addr,
    /// Destination address.
    pub dst: Ipv4Addr,
    /// Source port.
    pub src_port: u16,
    /// Destination port.
    pub dst_port: u16,
    /// IP protocol number.
    pub protocol: u8,
}

impl Display for FlowKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} ({})",
            self.src, self.src_port, self.dst, self.dst_port, self.protocol
        )
    }
}

/// Network packet.
///
/// Packets are moved between their owners (application, stack, device queue, channel) and are
/// copied only when a transmission is delivered to several receivers.
#[derive(Clone, Debug, Serialize)]
pub struct Packet {
    /// Unique packet identifier.
    pub uid: u64,
    /// Source address.
    pub src: Ipv4Addr,
    /// Destination address.
    pub dst: Ipv4Addr,
    /// Source port.
    pub src_port: u16,
    /// Destination port.
    pub dst_port: u16,
    /// IP protocol number.
    pub protocol: u8,
    /// Remaining hop count.
    pub ttl: u8,
    /// Application payload size in bytes.
    pub payload_size: u32,
    /// Time when the packet was created by application.
    pub created_at: f64,
    /// Application to notify when the packet leaves the first hop, cleared after notification.
    pub origin_app: Option<Id>,
    /// Uid of the request this packet answers (set by echo servers).
    pub reply_to: Option<u64>,
}

impl Packet {
    /// Creates a UDP packet.
    ///
    /// The uid combines the id of the sending component and its packet counter, so it is unique
    /// within a simulation.
    #[allow(clippy::too_many_arguments)]
    pub fn udp(
        sender: Id,
        seq: u32,
        src: Ipv4Addr,
        src_port: u16,
        dst: Ipv4Addr,
        dst_port: u16,
        payload_size: u32,
        created_at: f64,
    ) -> Self {
        Self {
            uid: ((sender as u64) << 32) | seq as u64,
            src,
            dst,
            src_port,
            dst_port,
            protocol: PROTOCOL_UDP,
            ttl: DEFAULT_TTL,
            payload_size,
            created_at,
            origin_app: None,
            reply_to: None,
        }
    }

    /// Returns the size of the packet including IP and UDP headers.
    pub fn size(&self) -> u32 {
        self.payload_size + HEADERS_SIZE
    }

    /// Returns the flow key of the packet.
    pub fn flow_key(&self) -> FlowKey {
        FlowKey {
            src: self.src,
            dst: self.dst,
            src_port: self.src_port,
            dst_port: self.dst_port,
            protocol: self.protocol,
        }
    }
}

/// Notifies the application that its packet left the first hop (or was dropped there).
#[derive(Clone, Serialize)]
pub struct TxDone {
    /// Packet uid.
    pub packet_uid: u64,
    /// Whether the packet was transmitted successfully.
    pub success: bool,
}
