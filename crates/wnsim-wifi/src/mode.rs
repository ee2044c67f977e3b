//! OFDM transmission modes and frame timing.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// PLCP preamble duration.
pub const PREAMBLE_DURATION: f64 = 16e-6;
/// PLCP header (SIGNAL field) duration.
pub const HEADER_DURATION: f64 = 4e-6;
/// OFDM symbol duration.
pub const SYMBOL_DURATION: f64 = 4e-6;
/// Bits of SERVICE field and tail added to every PSDU.
const SERVICE_AND_TAIL_BITS: u32 = 16 + 6;

/// OFDM transmission mode of a 20 MHz channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WifiMode {
    /// BPSK 1/2, 6 Mbit/s.
    Ofdm6Mbps,
    /// BPSK 3/4, 9 Mbit/s.
    Ofdm9Mbps,
    /// QPSK 1/2, 12 Mbit/s.
    Ofdm12Mbps,
    /// QPSK 3/4, 18 Mbit/s.
    Ofdm18Mbps,
    /// 16-QAM 1/2, 24 Mbit/s.
    Ofdm24Mbps,
    /// 16-QAM 3/4, 36 Mbit/s.
    Ofdm36Mbps,
    /// 64-QAM 2/3, 48 Mbit/s.
    Ofdm48Mbps,
    /// 64-QAM 3/4, 54 Mbit/s.
    Ofdm54Mbps,
}

/// All modes ordered by increasing data rate.
pub const ALL_MODES: [WifiMode; 8] = [
    WifiMode::Ofdm6Mbps,
    WifiMode::Ofdm9Mbps,
    WifiMode::Ofdm12Mbps,
    WifiMode::Ofdm18Mbps,
    WifiMode::Ofdm24Mbps,
    WifiMode::Ofdm36Mbps,
    WifiMode::Ofdm48Mbps,
    WifiMode::Ofdm54Mbps,
];

impl WifiMode {
    /// Returns the lowest mode.
    pub fn lowest() -> Self {
        ALL_MODES[0]
    }

    /// Returns the highest mode.
    pub fn highest() -> Self {
        ALL_MODES[ALL_MODES.len() - 1]
    }

    /// Returns the data rate in Mbit/s.
    pub fn rate_mbps(&self) -> u32 {
        match self {
            Self::Ofdm6Mbps => 6,
            Self::Ofdm9Mbps => 9,
            Self::Ofdm12Mbps => 12,
            Self::Ofdm18Mbps => 18,
            Self::Ofdm24Mbps => 24,
            Self::Ofdm36Mbps => 36,
            Self::Ofdm48Mbps => 48,
            Self::Ofdm54Mbps => 54,
        }
    }

    /// Returns the data rate in bit/s.
    pub fn rate_bps(&self) -> f64 {
        self.rate_mbps() as f64 * 1e6
    }

    /// Returns the minimal SNR (dB) at which frames sent with this mode are received correctly.
    pub fn min_snr_db(&self) -> f64 {
        match self {
            Self::Ofdm6Mbps => 4.,
            Self::Ofdm9Mbps => 5.,
            Self::Ofdm12Mbps => 7.,
            Self::Ofdm18Mbps => 9.,
            Self::Ofdm24Mbps => 12.,
            Self::Ofdm36Mbps => 16.,
            Self::Ofdm48Mbps => 20.,
            Self::Ofdm54Mbps => 22.,
        }
    }

    /// Returns the position of the mode in [`ALL_MODES`].
    pub fn index(&self) -> usize {
        ALL_MODES.iter().position(|m| m == self).unwrap_or(0)
    }

    /// Returns the next faster mode, if any.
    pub fn faster(&self) -> Option<Self> {
        ALL_MODES.get(self.index() + 1).copied()
    }

    /// Returns the next slower mode, if any.
    pub fn slower(&self) -> Option<Self> {
        self.index().checked_sub(1).map(|i| ALL_MODES[i])
    }

    /// Returns the mode used for control responses (ACK, CTS) to frames sent with this mode:
    /// the fastest basic rate (6, 12 or 24 Mbit/s) not exceeding its rate.
    pub fn control_mode(&self) -> Self {
        if *self >= Self::Ofdm24Mbps {
            Self::Ofdm24Mbps
        } else if *self >= Self::Ofdm12Mbps {
            Self::Ofdm12Mbps
        } else {
            Self::Ofdm6Mbps
        }
    }

    /// Returns the number of data bits carried by one OFDM symbol.
    pub fn bits_per_symbol(&self) -> u32 {
        self.rate_mbps() * 4
    }

    /// Returns the on-air duration of a frame of `size` bytes, including preamble and header.
    pub fn frame_duration(&self, size: u32) -> f64 {
        let bits = SERVICE_AND_TAIL_BITS + 8 * size;
        let symbols = (bits + self.bits_per_symbol() - 1) / self.bits_per_symbol();
        PREAMBLE_DURATION + HEADER_DURATION + symbols as f64 * SYMBOL_DURATION
    }
}

impl Display for WifiMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "OfdmRate{}Mbps", self.rate_mbps())
    }
}

/// Error returned for unknown mode names.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown wifi mode: {0}")]
pub struct ParseModeError(String);

impl FromStr for WifiMode {
    type Err = ParseModeError;

    /// Parses names like `OfdmRate54Mbps`, `Ofdm54Mbps` or `54Mbps`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rate = s
            .trim()
            .trim_start_matches("OfdmRate")
            .trim_start_matches("Ofdm")
            .trim_end_matches("Mbps");
        rate.parse::<u32>()
            .ok()
            .and_then(|rate| ALL_MODES.into_iter().find(|m| m.rate_mbps() == rate))
            .ok_or_else(|| ParseModeError(s.to_owned()))
    }
}

/// Converts power from dBm to mW.
pub fn dbm_to_mw(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.)
}

/// Converts power from mW to dBm.
pub fn mw_to_dbm(mw: f64) -> f64 {
    10. * mw.log10()
}

/// Returns the thermal noise power in dBm over the given bandwidth for the receiver noise figure.
pub fn thermal_noise_dbm(bandwidth_hz: f64, noise_figure_db: f64) -> f64 {
    -174. + 10. * bandwidth_hz.log10() + noise_figure_db
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    // 14 bytes: 134 bits -> 6 symbols at 24 bits/symbol
    #[case(WifiMode::Ofdm6Mbps, 14, 44e-6)]
    // 14 bytes: 134 bits -> 2 symbols at 96 bits/symbol
    #[case(WifiMode::Ofdm24Mbps, 14, 28e-6)]
    // 1536 bytes: 12310 bits -> 57 symbols at 216 bits/symbol
    #[case(WifiMode::Ofdm54Mbps, 1536, 248e-6)]
    // 1536 bytes: 12310 bits -> 513 symbols at 24 bits/symbol
    #[case(WifiMode::Ofdm6Mbps, 1536, 2072e-6)]
    fn frame_duration(#[case] mode: WifiMode, #[case] size: u32, #[case] expected: f64) {
        assert_abs_diff_eq!(mode.frame_duration(size), expected, epsilon = 1e-12);
    }

    #[test]
    fn control_modes() {
        assert_eq!(WifiMode::Ofdm54Mbps.control_mode(), WifiMode::Ofdm24Mbps);
        assert_eq!(WifiMode::Ofdm24Mbps.control_mode(), WifiMode::Ofdm24Mbps);
        assert_eq!(WifiMode::Ofdm18Mbps.control_mode(), WifiMode::Ofdm12Mbps);
        assert_eq!(WifiMode::Ofdm9Mbps.control_mode(), WifiMode::Ofdm6Mbps);
    }

    #[test]
    fn neighbours() {
        assert_eq!(WifiMode::Ofdm6Mbps.slower(), None);
        assert_eq!(WifiMode::Ofdm6Mbps.faster(), Some(WifiMode::Ofdm9Mbps));
        assert_eq!(WifiMode::Ofdm54Mbps.faster(), None);
        assert_eq!(WifiMode::Ofdm54Mbps.slower(), Some(WifiMode::Ofdm48Mbps));
    }

    #[test]
    fn parse() {
        assert_eq!("OfdmRate54Mbps".parse(), Ok(WifiMode::Ofdm54Mbps));
        assert_eq!("Ofdm6Mbps".parse(), Ok(WifiMode::Ofdm6Mbps));
        assert_eq!("12Mbps".parse(), Ok(WifiMode::Ofdm12Mbps));
        assert!("DsssRate11Mbps".parse::<WifiMode>().is_err());
        assert_eq!(WifiMode::Ofdm36Mbps.to_string(), "OfdmRate36Mbps");
    }

    #[test]
    fn noise() {
        assert_abs_diff_eq!(thermal_noise_dbm(20e6, 10.), -90.99, epsilon = 0.01);
        assert_abs_diff_eq!(mw_to_dbm(dbm_to_mw(-76.)), -76., epsilon = 1e-9);
    }
}
