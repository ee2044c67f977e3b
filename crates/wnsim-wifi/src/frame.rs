//! MAC frames.

use serde::Serialize;

use crate::address::MacAddress;
use crate::mode::WifiMode;
use crate::packet::Packet;
use crate::timing::{ACK_SIZE, CTS_SIZE, DATA_OVERHEAD, RTS_SIZE};

/// Type of MAC frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FrameType {
    /// Data frame carrying a packet.
    Data,
    /// Acknowledgement.
    Ack,
    /// Request to send.
    Rts,
    /// Clear to send.
    Cts,
}

/// MAC frame transmitted over the channel.
#[derive(Clone, Debug, Serialize)]
pub struct Frame {
    /// Frame type.
    pub frame_type: FrameType,
    /// Transmitter address.
    pub src: MacAddress,
    /// Receiver address.
    pub dst: MacAddress,
    /// Duration field: time the medium stays reserved after the end of this frame.
    pub nav: f64,
    /// Transmission mode.
    pub mode: WifiMode,
    /// Sequence number of a data frame.
    pub seq: u16,
    /// Set on retransmissions of a data frame.
    pub retry: bool,
    /// Packet carried by a data frame.
    pub packet: Option<Packet>,
}

impl Frame {
    /// Creates a data frame.
    pub fn data(src: MacAddress, dst: MacAddress, mode: WifiMode, packet: Packet, seq: u16, retry: bool) -> Self {
        Self {
            frame_type: FrameType::Data,
            src,
            dst,
            nav: 0.,
            mode,
            seq,
            retry,
            packet: Some(packet),
        }
    }

    /// Creates a control frame of given type.
    pub fn control(frame_type: FrameType, src: MacAddress, dst: MacAddress, mode: WifiMode, nav: f64) -> Self {
        Self {
            frame_type,
            src,
            dst,
            nav,
            mode,
            seq: 0,
            retry: false,
            packet: None,
        }
    }

    /// Returns the frame size in bytes.
    pub fn size(&self) -> u32 {
        match self.frame_type {
            FrameType::Data => self.packet.as_ref().map_or(0, |p| p.size()) + DATA_OVERHEAD,
            FrameType::Ack => ACK_SIZE,
            FrameType::Cts => CTS_SIZE,
            FrameType::Rts => RTS_SIZE,
        }
    }

    /// Returns the on-air duration of the frame.
    pub fn duration(&self) -> f64 {
        self.mode.frame_duration(self.size())
    }
}
