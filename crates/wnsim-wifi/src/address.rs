//! Link layer addresses.

use std::fmt::{Display, Formatter};

use serde::Serialize;

/// 48-bit MAC address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MacAddress(u64);

impl MacAddress {
    /// Broadcast address.
    pub const BROADCAST: MacAddress = MacAddress(0xffff_ffff_ffff);

    /// Creates the address from its numeric value, only the lower 48 bits are used.
    pub fn new(value: u64) -> Self {
        Self(value & 0xffff_ffff_ffff)
    }

    /// Checks whether this is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl Display for MacAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let b = self.0.to_be_bytes();
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", b[2], b[3], b[4], b[5], b[6], b[7])
    }
}
