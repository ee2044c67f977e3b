//! MAC timing parameters and frame sizes.

use crate::mode::WifiMode;

/// Slot time.
pub const SLOT: f64 = 9e-6;
/// Short interframe space.
pub const SIFS: f64 = 16e-6;
/// DCF interframe space.
pub const DIFS: f64 = SIFS + 2. * SLOT;

/// MAC header, LLC/SNAP header and FCS added to every data frame, in bytes.
pub const DATA_OVERHEAD: u32 = 36;
/// ACK frame size in bytes.
pub const ACK_SIZE: u32 = 14;
/// CTS frame size in bytes.
pub const CTS_SIZE: u32 = 14;
/// RTS frame size in bytes.
pub const RTS_SIZE: u32 = 20;

/// Returns the extended interframe space used after an erroneous reception: the time needed to
/// receive an ACK sent with the lowest rate plus DIFS.
pub fn eifs() -> f64 {
    SIFS + WifiMode::lowest().frame_duration(ACK_SIZE) + DIFS
}

/// Returns the time to wait for a response of given size after the end of own transmission.
pub fn response_timeout(response_mode: WifiMode, response_size: u32, max_propagation_delay: f64) -> f64 {
    SIFS + SLOT + response_mode.frame_duration(response_size) + 2. * max_propagation_delay
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn interframe_spaces() {
        assert_abs_diff_eq!(DIFS, 34e-6, epsilon = 1e-12);
        assert_abs_diff_eq!(eifs(), 94e-6, epsilon = 1e-12);
        assert_abs_diff_eq!(response_timeout(WifiMode::Ofdm24Mbps, ACK_SIZE, 0.), 53e-6, epsilon = 1e-12);
    }
}
