//! Device statistics.

use std::ops::AddAssign;

use serde::Serialize;

/// Counters of a wifi device.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeviceCounters {
    /// Data frame transmission attempts, including retransmissions.
    pub tx_attempts: u64,
    /// Data frames acknowledged by the receiver (or broadcast frames sent).
    pub tx_ok: u64,
    /// All frames put on the air.
    pub phy_tx: u64,
    /// Frames received correctly.
    pub rx_ok: u64,
    /// Frames received with errors.
    pub rx_error: u64,
    /// ACK and CTS timeouts.
    pub collisions: u64,
    /// Packets dropped after exceeding the retry limit.
    pub mac_drops: u64,
    /// Packets rejected because the transmit queue was full.
    pub queue_drops: u64,
}

impl AddAssign<&DeviceCounters> for DeviceCounters {
    fn add_assign(&mut self, rhs: &DeviceCounters) {
        self.tx_attempts += rhs.tx_attempts;
        self.tx_ok += rhs.tx_ok;
        self.phy_tx += rhs.phy_tx;
        self.rx_ok += rhs.rx_ok;
        self.rx_error += rhs.rx_error;
        self.collisions += rhs.collisions;
        self.mac_drops += rhs.mac_drops;
        self.queue_drops += rhs.queue_drops;
    }
}
