//! Rate adaptation policies.
//!
//! A rate manager chooses the transmission mode of data frames for each peer based on the outcomes
//! of previous transmissions or on the observed signal quality.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::MacAddress;
use crate::mode::{WifiMode, ALL_MODES};

/// Trait for rate adaptation policies.
pub trait RateManager {
    /// Returns the mode for the next data frame to the peer at time `now`.
    fn data_mode(&mut self, peer: MacAddress, now: f64) -> WifiMode;
    /// Reports that a data frame to the peer was acknowledged.
    fn report_success(&mut self, peer: MacAddress);
    /// Reports that a data frame (or RTS) to the peer was not acknowledged.
    fn report_failure(&mut self, peer: MacAddress);
    /// Reports that a data frame to the peer was dropped after the last retry.
    fn report_final_failure(&mut self, _peer: MacAddress) {}
    /// Reports the SNR of a frame received from the peer.
    fn report_rx_snr(&mut self, _peer: MacAddress, _snr_db: f64) {}
}

///////////////////////////////////////////////////////////////////////////////

/// Always uses the same mode.
pub struct ConstantRate {
    mode: WifiMode,
}

impl ConstantRate {
    /// Creates the manager with given mode.
    pub fn new(mode: WifiMode) -> Self {
        Self { mode }
    }
}

impl RateManager for ConstantRate {
    fn data_mode(&mut self, _peer: MacAddress, _now: f64) -> WifiMode {
        self.mode
    }

    fn report_success(&mut self, _peer: MacAddress) {}

    fn report_failure(&mut self, _peer: MacAddress) {}
}

///////////////////////////////////////////////////////////////////////////////

const ARF_SUCCESS_THRESHOLD: u32 = 10;
const ARF_TIMER_THRESHOLD: u32 = 15;
const ARF_FAILURE_THRESHOLD: u32 = 2;
const AARF_MAX_SUCCESS_THRESHOLD: u32 = 60;

struct ArfState {
    mode: WifiMode,
    successes: u32,
    failures: u32,
    timer: u32,
    success_threshold: u32,
    timer_threshold: u32,
    // the first frame after a rate increase is a probe
    probing: bool,
}

impl ArfState {
    fn new() -> Self {
        Self {
            mode: WifiMode::lowest(),
            successes: 0,
            failures: 0,
            timer: 0,
            success_threshold: ARF_SUCCESS_THRESHOLD,
            timer_threshold: ARF_TIMER_THRESHOLD,
            probing: false,
        }
    }
}

/// Auto Rate Fallback.
///
/// Steps up to the next mode after a number of consecutive successes (or transmissions),
/// steps down after consecutive failures or when the probe frame sent right after a step up fails.
/// In the adaptive variant (AARF) a failed probe doubles the success threshold.
pub struct ArfRate {
    adaptive: bool,
    peers: BTreeMap<MacAddress, ArfState>,
}

impl ArfRate {
    /// Creates the original ARF manager.
    pub fn arf() -> Self {
        Self {
            adaptive: false,
            peers: BTreeMap::new(),
        }
    }

    /// Creates the adaptive ARF manager.
    pub fn aarf() -> Self {
        Self {
            adaptive: true,
            peers: BTreeMap::new(),
        }
    }

    fn state(&mut self, peer: MacAddress) -> &mut ArfState {
        self.peers.entry(peer).or_insert_with(ArfState::new)
    }

    /// Returns the current success threshold for the peer.
    pub fn success_threshold(&self, peer: MacAddress) -> u32 {
        self.peers.get(&peer).map_or(ARF_SUCCESS_THRESHOLD, |s| s.success_threshold)
    }
}

impl RateManager for ArfRate {
    fn data_mode(&mut self, peer: MacAddress, _now: f64) -> WifiMode {
        self.state(peer).mode
    }

    fn report_success(&mut self, peer: MacAddress) {
        let st = self.state(peer);
        st.successes += 1;
        st.timer += 1;
        st.failures = 0;
        st.probing = false;
        if st.successes >= st.success_threshold || st.timer >= st.timer_threshold {
            if let Some(faster) = st.mode.faster() {
                st.mode = faster;
                st.probing = true;
            }
            st.successes = 0;
            st.timer = 0;
        }
    }

    fn report_failure(&mut self, peer: MacAddress) {
        let adaptive = self.adaptive;
        let st = self.state(peer);
        st.failures += 1;
        st.timer += 1;
        st.successes = 0;
        if st.probing {
            if let Some(slower) = st.mode.slower() {
                st.mode = slower;
            }
            if adaptive {
                st.success_threshold = (st.success_threshold * 2).min(AARF_MAX_SUCCESS_THRESHOLD);
                st.timer_threshold = st.success_threshold.max(ARF_TIMER_THRESHOLD);
            }
            st.probing = false;
            st.failures = 0;
            st.timer = 0;
        } else if st.failures >= ARF_FAILURE_THRESHOLD {
            if let Some(slower) = st.mode.slower() {
                st.mode = slower;
            }
            if adaptive {
                st.success_threshold = ARF_SUCCESS_THRESHOLD;
                st.timer_threshold = ARF_TIMER_THRESHOLD;
            }
            st.failures = 0;
            st.timer = 0;
        }
    }
}

///////////////////////////////////////////////////////////////////////////////

/// Picks the fastest mode whose SNR threshold (plus margin) is satisfied by the last SNR
/// observed for frames from the peer. Uses the lowest mode until the peer was heard.
pub struct IdealRate {
    margin_db: f64,
    snr: BTreeMap<MacAddress, f64>,
}

impl IdealRate {
    /// Creates the manager with given SNR margin.
    pub fn new(margin_db: f64) -> Self {
        Self {
            margin_db,
            snr: BTreeMap::new(),
        }
    }
}

impl RateManager for IdealRate {
    fn data_mode(&mut self, peer: MacAddress, _now: f64) -> WifiMode {
        match self.snr.get(&peer) {
            Some(&snr) => ALL_MODES
                .iter()
                .rev()
                .find(|m| m.min_snr_db() + self.margin_db <= snr)
                .copied()
                .unwrap_or_else(WifiMode::lowest),
            None => WifiMode::lowest(),
        }
    }

    fn report_success(&mut self, _peer: MacAddress) {}

    fn report_failure(&mut self, _peer: MacAddress) {}

    fn report_rx_snr(&mut self, peer: MacAddress, snr_db: f64) {
        self.snr.insert(peer, snr_db);
    }
}

///////////////////////////////////////////////////////////////////////////////

const ONOE_UPDATE_PERIOD: f64 = 1.;
const ONOE_MIN_FRAMES: u32 = 10;
const ONOE_RAISE_THRESHOLD: u32 = 10;
const ONOE_ADD_CREDIT_THRESHOLD: u32 = 10;

#[derive(Default)]
struct OnoeState {
    rate: usize,
    tx_ok: u32,
    tx_err: u32,
    tx_retries: u32,
    credits: u32,
    retries: u32,
    next_update: f64,
}

impl OnoeState {
    fn end_frame(&mut self) {
        self.tx_retries += self.retries;
        self.retries = 0;
    }

    fn update(&mut self, now: f64) {
        if now < self.next_update {
            return;
        }
        self.next_update = now + ONOE_UPDATE_PERIOD;
        let enough = self.tx_ok + self.tx_err >= ONOE_MIN_FRAMES;
        let mut rate = self.rate;
        if (self.tx_err > 0 && self.tx_ok == 0) || (enough && self.tx_ok < self.tx_retries) {
            rate = rate.saturating_sub(1);
            self.credits = 0;
        } else if enough && self.tx_err == 0 && self.tx_retries < self.tx_ok * ONOE_ADD_CREDIT_THRESHOLD / 100 {
            self.credits += 1;
            if self.credits >= ONOE_RAISE_THRESHOLD {
                self.credits = 0;
                rate = (rate + 1).min(ALL_MODES.len() - 1);
            }
        } else if enough {
            self.credits = self.credits.saturating_sub(1);
        }
        let changed = rate != self.rate;
        if changed {
            self.rate = rate;
            self.credits = 0;
        }
        if changed || enough {
            self.tx_ok = 0;
            self.tx_err = 0;
            self.tx_retries = 0;
        }
    }

    fn mode(&self) -> WifiMode {
        // retransmissions of the same frame fall back to slower modes
        let fallback = match self.retries {
            0..=3 => 0,
            4..=5 => 1,
            6..=7 => 2,
            _ => 3,
        };
        ALL_MODES[self.rate.saturating_sub(fallback)]
    }
}

/// Onoe rate control.
///
/// Once per update period the mode of a peer is lowered when no frame got through or frames need
/// more than one retry on average. Credits are collected in periods without losses where less than
/// 10% of frames need a retry, and the mode is raised after 10 credits. Retransmissions of a frame
/// use progressively slower modes.
pub struct OnoeRate {
    peers: BTreeMap<MacAddress, OnoeState>,
}

impl OnoeRate {
    /// Creates the manager.
    pub fn new() -> Self {
        Self { peers: BTreeMap::new() }
    }

    fn state(&mut self, peer: MacAddress) -> &mut OnoeState {
        self.peers.entry(peer).or_default()
    }
}

impl Default for OnoeRate {
    fn default() -> Self {
        Self::new()
    }
}

impl RateManager for OnoeRate {
    fn data_mode(&mut self, peer: MacAddress, now: f64) -> WifiMode {
        let st = self.state(peer);
        st.update(now);
        st.mode()
    }

    fn report_success(&mut self, peer: MacAddress) {
        let st = self.state(peer);
        st.end_frame();
        st.tx_ok += 1;
    }

    fn report_failure(&mut self, peer: MacAddress) {
        self.state(peer).retries += 1;
    }

    fn report_final_failure(&mut self, peer: MacAddress) {
        let st = self.state(peer);
        st.end_frame();
        st.tx_err += 1;
    }
}

///////////////////////////////////////////////////////////////////////////////

/// Rate adaptation policy selected in configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum RateManagerConfig {
    /// [`ConstantRate`] with given mode.
    Constant(WifiMode),
    /// [`ArfRate::arf`].
    Arf,
    /// [`ArfRate::aarf`].
    #[default]
    Aarf,
    /// [`IdealRate`] with 1 dB margin.
    Ideal,
    /// [`OnoeRate`].
    Onoe,
}

impl RateManagerConfig {
    /// Creates the configured manager.
    pub fn build(&self) -> Box<dyn RateManager> {
        match self {
            Self::Constant(mode) => Box::new(ConstantRate::new(*mode)),
            Self::Arf => Box::new(ArfRate::arf()),
            Self::Aarf => Box::new(ArfRate::aarf()),
            Self::Ideal => Box::new(IdealRate::new(1.)),
            Self::Onoe => Box::new(OnoeRate::new()),
        }
    }
}

/// Error returned for unknown rate manager names.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown rate manager: {0}")]
pub struct ParseRateManagerError(String);

impl FromStr for RateManagerConfig {
    type Err = ParseRateManagerError;

    /// Parses `constant:<mode>`, `arf`, `aarf`, `ideal` or `onoe`, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || ParseRateManagerError(s.to_owned());
        let lower = s.trim().to_ascii_lowercase();
        if let Some(mode) = lower.strip_prefix("constant:") {
            return mode.parse().map(Self::Constant).map_err(|_| error());
        }
        match lower.as_str() {
            "arf" => Ok(Self::Arf),
            "aarf" => Ok(Self::Aarf),
            "ideal" => Ok(Self::Ideal),
            "onoe" => Ok(Self::Onoe),
            _ => Err(error()),
        }
    }
}
