//! Traffic generating and consuming applications.
//!
//! Applications send packets through the [`IpStack`](crate::stack::IpStack) of their node and
//! receive packets delivered to the port they are bound to. Sources are started and stopped by
//! [`AppStart`] and [`AppStop`] events.

pub mod bulk;
pub mod echo;
pub mod onoff;
pub mod sink;

use std::net::Ipv4Addr;

use serde::Serialize;

pub use bulk::BulkSend;
pub use echo::{EchoClient, EchoServer};
pub use onoff::{OnOffApp, Period};
pub use sink::PacketSink;

// EVENTS //////////////////////////////////////////////////////////////////////

/// Starts the application.
#[derive(Clone, Serialize)]
pub struct AppStart {}

/// Stops the application.
#[derive(Clone, Serialize)]
pub struct AppStop {}

////////////////////////////////////////////////////////////////////////////////

/// Endpoints of the traffic generated by a source application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Endpoints {
    /// Component id of the local stack.
    pub stack: wnsim_core::Id,
    /// Local address.
    pub src: Ipv4Addr,
    /// Local port.
    pub src_port: u16,
    /// Remote address.
    pub dst: Ipv4Addr,
    /// Remote port.
    pub dst_port: u16,
}

/// Counters of the packets sent by a source application.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SourceStats {
    /// Packets handed to the stack.
    pub sent_packets: u64,
    /// Payload bytes handed to the stack.
    pub sent_bytes: u64,
}
