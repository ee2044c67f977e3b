//! Wifi device combining a simplified PHY with the DCF MAC.
//!
//! The PHY detects signals above the energy-detection threshold, locks onto the first detectable
//! signal and decides at its end whether the frame was received correctly based on SINR and
//! collisions. The device cannot receive while transmitting.
//!
//! The MAC implements CSMA/CA: a packet taken from the queue is sent after a random backoff which
//! runs down only while the medium has been idle for DIFS (EIFS after an erroneous reception).
//! Unicast data frames are acknowledged, missing acknowledgements double the contention window
//! and cause retransmission until the retry limit is exceeded. Large frames may be preceded by an
//! RTS/CTS exchange which reserves the medium via the NAV of overhearing devices.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use serde::Serialize;

use wnsim_core::{
    cast, log_debug, log_trace, Event, EventHandler, EventId, Id, Observers, SimulationContext, SubscriptionId,
    EPSILON,
};

use crate::address::MacAddress;
use crate::channel::{SignalArrival, WirelessChannel};
use crate::config::{MacConfig, PhyConfig};
use crate::counters::DeviceCounters;
use crate::dcf::{Backoff, ContentionWindow};
use crate::frame::{Frame, FrameType};
use crate::mode::{dbm_to_mw, mw_to_dbm, thermal_noise_dbm, WifiMode};
use crate::packet::{Packet, TxDone};
use crate::rate::RateManager;
use crate::timing::{eifs, response_timeout, ACK_SIZE, CTS_SIZE, DIFS, SIFS, SLOT};

// EVENTS //////////////////////////////////////////////////////////////////////

/// Request from the upper layer to send a packet to the neighbour with given address.
#[derive(Clone, Serialize)]
pub struct MacSend {
    /// Packet to send.
    pub packet: Packet,
    /// Address of the next hop.
    pub next_hop: MacAddress,
}

/// Packet received by the device, delivered to the upper layer.
#[derive(Clone, Serialize)]
pub struct MacReceive {
    /// Received packet.
    pub packet: Packet,
    /// Address of the transmitting neighbour.
    pub from: MacAddress,
    /// Receiving device.
    pub device: Id,
}

#[derive(Clone, Serialize)]
struct SignalEnd {
    signal_id: u64,
}

#[derive(Clone, Serialize)]
struct TxEnd {
    frame_type: FrameType,
    dst: MacAddress,
}

#[derive(Clone, Serialize)]
struct BackoffExpired {}

#[derive(Clone, Serialize)]
struct ResponseTimeout {}

#[derive(Clone, Serialize)]
struct DelayedTx {
    frame: Frame,
}

#[derive(Clone, Serialize)]
struct NavEnd {}

// NOTIFICATIONS ///////////////////////////////////////////////////////////////

/// Reason of a packet drop by the MAC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MacDropReason {
    /// The retry limit was exceeded.
    RetryLimit,
    /// The transmit queue was full.
    QueueFull,
}

/// Notification about a packet dropped by the MAC.
#[derive(Clone, Debug)]
pub struct MacDrop {
    /// Drop time.
    pub time: f64,
    /// Device which dropped the packet.
    pub device: Id,
    /// Dropped packet.
    pub packet: Packet,
    /// Drop reason.
    pub reason: MacDropReason,
}

////////////////////////////////////////////////////////////////////////////////

/// State of the MAC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MacState {
    /// No packet to send.
    Idle,
    /// Waiting for the backoff to expire.
    Backoff,
    /// Transmitting own RTS or data frame (or waiting SIFS to send data after CTS).
    Transmitting,
    /// Waiting for CTS in response to RTS.
    WaitingCts,
    /// Waiting for ACK in response to data frame.
    WaitingAck,
    /// The current packet has just been dropped.
    Dropped,
}

struct Outgoing {
    packet: Packet,
    next_hop: MacAddress,
    seq: u16,
    retry: bool,
    mode: WifiMode,
}

struct Reception {
    signal_id: u64,
    frame: Frame,
    power_mw: f64,
    interference_peak_mw: f64,
    collided: bool,
}

struct ActiveSignal {
    power_mw: f64,
    detectable: bool,
}

/// Wifi network interface of a node.
pub struct WifiDevice {
    address: MacAddress,
    node: usize,
    phy: PhyConfig,
    mac: MacConfig,
    noise_mw: f64,
    channel: Rc<RefCell<WirelessChannel>>,
    upper: Option<Id>,
    rate: Box<dyn RateManager>,
    // MAC
    state: MacState,
    queue: VecDeque<(Packet, MacAddress)>,
    current: Option<Outgoing>,
    pending_data: Option<Frame>,
    cw: ContentionWindow,
    retries: u32,
    backoff: Backoff,
    backoff_event: Option<EventId>,
    timeout_event: Option<EventId>,
    next_seq: u16,
    last_rx_seq: BTreeMap<MacAddress, u16>,
    // PHY and carrier sense
    tx_end: Option<f64>,
    reception: Option<Reception>,
    signals: BTreeMap<u64, ActiveSignal>,
    nav_until: f64,
    medium_busy: bool,
    idle_since: f64,
    use_eifs: bool,
    counters: DeviceCounters,
    drop_observers: Observers<MacDrop>,
    ctx: SimulationContext,
}

impl WifiDevice {
    /// Creates a device of the node attached to the channel.
    ///
    /// The device still has to be attached to the channel with [`WirelessChannel::attach`].
    pub fn new(
        address: MacAddress,
        node: usize,
        phy: PhyConfig,
        mac: MacConfig,
        channel: Rc<RefCell<WirelessChannel>>,
        ctx: SimulationContext,
    ) -> Self {
        let noise_mw = dbm_to_mw(thermal_noise_dbm(phy.channel_width, phy.noise_figure_db));
        let rate = mac.rate_manager.build();
        let cw = ContentionWindow::new(mac.cw_min, mac.cw_max);
        Self {
            address,
            node,
            phy,
            mac,
            noise_mw,
            channel,
            upper: None,
            rate,
            state: MacState::Idle,
            queue: VecDeque::new(),
            current: None,
            pending_data: None,
            cw,
            retries: 0,
            backoff: Backoff::default(),
            backoff_event: None,
            timeout_event: None,
            next_seq: 0,
            last_rx_seq: BTreeMap::new(),
            tx_end: None,
            reception: None,
            signals: BTreeMap::new(),
            nav_until: 0.,
            medium_busy: false,
            idle_since: 0.,
            use_eifs: false,
            counters: DeviceCounters::default(),
            drop_observers: Observers::new(),
            ctx,
        }
    }

    /// Sets the component which receives [`MacReceive`] events.
    pub fn set_upper_layer(&mut self, id: Id) {
        self.upper = Some(id);
    }

    /// Subscribes to packet drops.
    pub fn subscribe_drops<F>(&mut self, f: F) -> SubscriptionId
    where
        F: FnMut(&MacDrop) + 'static,
    {
        self.drop_observers.subscribe(f)
    }

    /// Cancels a subscription made with [`subscribe_drops`](Self::subscribe_drops).
    pub fn unsubscribe_drops(&mut self, id: SubscriptionId) -> bool {
        self.drop_observers.unsubscribe(id)
    }

    /// Returns the component id of the device.
    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    /// Returns the MAC address.
    pub fn address(&self) -> MacAddress {
        self.address
    }

    /// Returns the index of the owning node.
    pub fn node(&self) -> usize {
        self.node
    }

    /// Returns the MAC state.
    pub fn state(&self) -> MacState {
        self.state
    }

    /// Returns the device counters.
    pub fn counters(&self) -> &DeviceCounters {
        &self.counters
    }

    /// Returns the current contention window.
    pub fn contention_window(&self) -> u32 {
        self.cw.value()
    }

    /// Returns the number of retransmissions of the current packet.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Returns the number of packets held by the MAC: queued plus the one being sent.
    pub fn in_flight(&self) -> usize {
        self.queue.len() + self.current.is_some() as usize
    }

    /// Checks whether the device senses the medium busy (physically or via NAV).
    pub fn is_medium_busy(&self) -> bool {
        self.medium_busy
    }

    /// Discards all queued packets and the current one, cancels MAC timers and returns the number
    /// of discarded packets.
    pub fn flush(&mut self) -> usize {
        let mut count = self.queue.len();
        self.queue.clear();
        if self.current.take().is_some() {
            count += 1;
        }
        if let Some(id) = self.backoff_event.take() {
            self.ctx.cancel_event(id);
        }
        if let Some(id) = self.timeout_event.take() {
            self.ctx.cancel_event(id);
        }
        self.pending_data = None;
        self.backoff = Backoff::default();
        self.cw.reset();
        self.retries = 0;
        self.state = MacState::Idle;
        if count > 0 {
            log_debug!(self.ctx, "flushed {} packets", count);
        }
        count
    }

    // MAC /////////////////////////////////////////////////////////////////////

    fn enqueue(&mut self, packet: Packet, next_hop: MacAddress) {
        if self.queue.len() >= self.mac.queue_capacity {
            self.counters.queue_drops += 1;
            log_debug!(self.ctx, "queue is full, dropping packet {}", packet.uid);
            self.drop_packet(packet, MacDropReason::QueueFull);
            return;
        }
        self.queue.push_back((packet, next_hop));
        if self.state == MacState::Idle {
            self.start_next();
        }
    }

    fn start_next(&mut self) {
        if self.current.is_none() {
            if let Some((packet, next_hop)) = self.queue.pop_front() {
                let seq = self.next_seq;
                self.next_seq = (self.next_seq + 1) % 4096;
                self.current = Some(Outgoing {
                    packet,
                    next_hop,
                    seq,
                    retry: false,
                    mode: WifiMode::lowest(),
                });
            }
        }
        if self.current.is_some() {
            self.start_backoff();
        } else {
            self.state = MacState::Idle;
        }
    }

    fn start_backoff(&mut self) {
        self.state = MacState::Backoff;
        let slots = self.ctx.gen_range(0..=self.cw.value());
        self.backoff.set(slots);
        log_trace!(self.ctx, "backoff {} slots (cw {})", slots, self.cw.value());
        self.resume_backoff();
    }

    fn resume_backoff(&mut self) {
        if self.state != MacState::Backoff || self.backoff.is_running() || self.medium_busy {
            return;
        }
        let now = self.ctx.time();
        let ifs = if self.use_eifs { eifs() } else { DIFS };
        let start = (self.idle_since + ifs).max(now);
        let end = self.backoff.resume(start, SLOT);
        self.backoff_event = Some(self.ctx.emit_self(BackoffExpired {}, end - now));
    }

    fn pause_backoff(&mut self) {
        if let Some(id) = self.backoff_event.take() {
            self.ctx.cancel_event(id);
            self.backoff.pause(self.ctx.time(), SLOT);
        }
    }

    fn on_backoff_expired(&mut self) {
        self.backoff_event = None;
        self.backoff.finish();
        if self.state == MacState::Backoff && !self.medium_busy {
            self.start_transmission();
        }
    }

    fn start_transmission(&mut self) {
        let (next_hop, packet, seq, retry) = match self.current.as_ref() {
            Some(out) => (out.next_hop, out.packet.clone(), out.seq, out.retry),
            None => {
                self.state = MacState::Idle;
                return;
            }
        };
        let unicast = !next_hop.is_broadcast();
        let mode = if unicast {
            self.rate.data_mode(next_hop, self.ctx.time())
        } else {
            WifiMode::lowest()
        };
        if let Some(out) = self.current.as_mut() {
            out.mode = mode;
        }

        let mut packet = packet;
        packet.origin_app = None;
        let mut data = Frame::data(self.address, next_hop, mode, packet, seq, retry);
        let control_mode = mode.control_mode();
        if unicast {
            data.nav = SIFS + control_mode.frame_duration(ACK_SIZE);
        }
        self.state = MacState::Transmitting;

        let use_rts = unicast && self.mac.rts_threshold.map_or(false, |threshold| data.size() >= threshold);
        if use_rts {
            let nav = 3. * SIFS
                + control_mode.frame_duration(CTS_SIZE)
                + data.duration()
                + control_mode.frame_duration(ACK_SIZE);
            let rts = Frame::control(FrameType::Rts, self.address, next_hop, control_mode, nav);
            self.pending_data = Some(data);
            self.send_frame(rts);
        } else {
            self.send_frame(data);
        }
    }

    fn on_tx_end(&mut self, frame_type: FrameType, dst: MacAddress) {
        self.tx_end = None;
        match frame_type {
            FrameType::Data if self.state == MacState::Transmitting => {
                if dst.is_broadcast() {
                    self.on_tx_success();
                } else {
                    self.state = MacState::WaitingAck;
                    let mode = self.current.as_ref().map_or(WifiMode::lowest(), |out| out.mode);
                    let timeout = response_timeout(mode.control_mode(), ACK_SIZE, self.mac.max_propagation_delay);
                    self.timeout_event = Some(self.ctx.emit_self(ResponseTimeout {}, timeout));
                }
            }
            FrameType::Rts if self.state == MacState::Transmitting => {
                self.state = MacState::WaitingCts;
                let mode = self.current.as_ref().map_or(WifiMode::lowest(), |out| out.mode);
                let timeout = response_timeout(mode.control_mode(), CTS_SIZE, self.mac.max_propagation_delay);
                self.timeout_event = Some(self.ctx.emit_self(ResponseTimeout {}, timeout));
            }
            _ => {}
        }
        self.update_medium();
    }

    fn on_tx_success(&mut self) {
        self.counters.tx_ok += 1;
        self.cw.reset();
        self.retries = 0;
        if let Some(out) = self.current.take() {
            if !out.next_hop.is_broadcast() {
                self.rate.report_success(out.next_hop);
            }
            log_trace!(self.ctx, "packet {} delivered to {}", out.packet.uid, out.next_hop);
            self.notify_origin(&out.packet, true);
        }
        self.start_next();
    }

    fn on_response_timeout(&mut self) {
        self.timeout_event = None;
        if !matches!(
            self.state,
            MacState::WaitingAck | MacState::WaitingCts | MacState::Transmitting
        ) {
            return;
        }
        self.pending_data = None;
        self.counters.collisions += 1;
        if let Some(out) = self.current.as_ref() {
            self.rate.report_failure(out.next_hop);
        }
        self.retries += 1;
        if self.retries > self.mac.retry_limit {
            self.counters.mac_drops += 1;
            self.state = MacState::Dropped;
            self.cw.reset();
            self.retries = 0;
            if let Some(out) = self.current.take() {
                self.rate.report_final_failure(out.next_hop);
                log_debug!(self.ctx, "retry limit exceeded, dropping packet {}", out.packet.uid);
                self.drop_packet(out.packet, MacDropReason::RetryLimit);
            }
            self.start_next();
        } else {
            self.cw.on_failure();
            if let Some(out) = self.current.as_mut() {
                out.retry = true;
            }
            self.start_backoff();
        }
    }

    fn drop_packet(&mut self, packet: Packet, reason: MacDropReason) {
        self.notify_origin(&packet, false);
        self.drop_observers.notify(&MacDrop {
            time: self.ctx.time(),
            device: self.ctx.id(),
            packet,
            reason,
        });
    }

    fn notify_origin(&self, packet: &Packet, success: bool) {
        if let Some(app) = packet.origin_app {
            self.ctx.emit_now(
                TxDone {
                    packet_uid: packet.uid,
                    success,
                },
                app,
            );
        }
    }

    fn mac_rx(&mut self, frame: Frame, snr_db: f64) {
        self.rate.report_rx_snr(frame.src, snr_db);
        if frame.dst != self.address && !frame.dst.is_broadcast() {
            if frame.nav > 0. {
                self.set_nav(frame.nav);
            }
            return;
        }
        match frame.frame_type {
            FrameType::Data => self.on_data_rx(frame),
            FrameType::Ack => {
                let expected = self.current.as_ref().map_or(false, |out| out.next_hop == frame.src);
                if self.state == MacState::WaitingAck && expected {
                    if let Some(id) = self.timeout_event.take() {
                        self.ctx.cancel_event(id);
                    }
                    self.on_tx_success();
                }
            }
            FrameType::Rts => {
                if self.nav_until <= self.ctx.time() + EPSILON {
                    let nav = (frame.nav - SIFS - frame.mode.frame_duration(CTS_SIZE)).max(0.);
                    let cts = Frame::control(FrameType::Cts, self.address, frame.src, frame.mode, nav);
                    self.ctx.emit_self(DelayedTx { frame: cts }, SIFS);
                }
            }
            FrameType::Cts => {
                if self.state == MacState::WaitingCts {
                    if let Some(id) = self.timeout_event.take() {
                        self.ctx.cancel_event(id);
                    }
                    if let Some(data) = self.pending_data.take() {
                        self.state = MacState::Transmitting;
                        self.ctx.emit_self(DelayedTx { frame: data }, SIFS);
                    }
                }
            }
        }
    }

    fn on_data_rx(&mut self, frame: Frame) {
        let src = frame.src;
        if !frame.dst.is_broadcast() {
            let ack = Frame::control(FrameType::Ack, self.address, src, frame.mode.control_mode(), 0.);
            self.ctx.emit_self(DelayedTx { frame: ack }, SIFS);
        }
        if frame.retry && self.last_rx_seq.get(&src) == Some(&frame.seq) {
            log_trace!(self.ctx, "duplicate frame {} from {}", frame.seq, src);
            return;
        }
        self.last_rx_seq.insert(src, frame.seq);
        if let (Some(upper), Some(packet)) = (self.upper, frame.packet) {
            self.ctx.emit_now(
                MacReceive {
                    packet,
                    from: src,
                    device: self.ctx.id(),
                },
                upper,
            );
        }
    }

    fn on_delayed_tx(&mut self, frame: Frame) {
        if self.tx_end.is_some() {
            log_debug!(self.ctx, "device is busy, cannot send {:?} to {}", frame.frame_type, frame.dst);
            if frame.frame_type == FrameType::Data {
                self.on_response_timeout();
            }
            return;
        }
        self.send_frame(frame);
    }

    fn set_nav(&mut self, nav: f64) {
        let until = self.ctx.time() + nav;
        if until > self.nav_until {
            self.nav_until = until;
            self.ctx.emit_self(NavEnd {}, nav);
        }
        self.update_medium();
    }

    // PHY /////////////////////////////////////////////////////////////////////

    fn send_frame(&mut self, frame: Frame) {
        let duration = frame.duration();
        if let Some(rx) = self.reception.take() {
            log_trace!(self.ctx, "reception of signal {} aborted by transmission", rx.signal_id);
        }
        self.tx_end = Some(self.ctx.time() + duration);
        self.counters.phy_tx += 1;
        if frame.frame_type == FrameType::Data {
            self.counters.tx_attempts += 1;
        }
        log_trace!(
            self.ctx,
            "tx {:?} to {} at {} ({} bytes, {:.1} us)",
            frame.frame_type,
            frame.dst,
            frame.mode,
            frame.size(),
            duration * 1e6
        );
        let tx_power = self.phy.tx_power_dbm + self.phy.tx_gain_db;
        self.channel
            .borrow_mut()
            .transmit(self.ctx.id(), &frame, tx_power, duration);
        self.ctx.emit_self(
            TxEnd {
                frame_type: frame.frame_type,
                dst: frame.dst,
            },
            duration,
        );
        self.update_medium();
    }

    fn interference_except(&self, signal_id: u64) -> f64 {
        self.signals
            .iter()
            .filter(|(id, _)| **id != signal_id)
            .map(|(_, s)| s.power_mw)
            .sum()
    }

    fn phy_rx_start(&mut self, signal_id: u64, frame: Frame, rx_power_dbm: f64, duration: f64) {
        let power_dbm = rx_power_dbm + self.phy.rx_gain_db;
        let detectable = power_dbm > self.phy.energy_detection_dbm;
        let power_mw = dbm_to_mw(power_dbm);
        self.signals.insert(signal_id, ActiveSignal { power_mw, detectable });
        self.ctx.emit_self(SignalEnd { signal_id }, duration);

        if let Some(rx_id) = self.reception.as_ref().map(|rx| rx.signal_id) {
            let interference = self.interference_except(rx_id);
            if let Some(rx) = self.reception.as_mut() {
                rx.interference_peak_mw = rx.interference_peak_mw.max(interference);
                if detectable {
                    rx.collided = true;
                }
            }
            if detectable {
                log_trace!(self.ctx, "signal {} collides with signal {}", signal_id, rx_id);
            }
        } else if detectable && self.tx_end.is_none() {
            let collided = self.signals.iter().any(|(id, s)| *id != signal_id && s.detectable);
            self.reception = Some(Reception {
                signal_id,
                frame,
                power_mw,
                interference_peak_mw: self.interference_except(signal_id),
                collided,
            });
        }
        self.update_medium();
    }

    fn phy_rx_end(&mut self, signal_id: u64) {
        self.signals.remove(&signal_id);
        if self.reception.as_ref().map_or(false, |rx| rx.signal_id == signal_id) {
            if let Some(rx) = self.reception.take() {
                let snr_db = mw_to_dbm(rx.power_mw) - mw_to_dbm(self.noise_mw + rx.interference_peak_mw);
                if !rx.collided && snr_db >= rx.frame.mode.min_snr_db() {
                    self.counters.rx_ok += 1;
                    self.use_eifs = false;
                    log_trace!(
                        self.ctx,
                        "rx {:?} from {} (snr {:.1} dB)",
                        rx.frame.frame_type,
                        rx.frame.src,
                        snr_db
                    );
                    self.mac_rx(rx.frame, snr_db);
                } else {
                    self.counters.rx_error += 1;
                    self.use_eifs = true;
                    log_trace!(
                        self.ctx,
                        "rx error from {} (snr {:.1} dB, collided: {})",
                        rx.frame.src,
                        snr_db,
                        rx.collided
                    );
                }
            }
        }
        self.update_medium();
    }

    fn update_medium(&mut self) {
        let now = self.ctx.time();
        let busy = self.tx_end.is_some()
            || self.reception.is_some()
            || self.signals.values().any(|s| s.detectable)
            || self.nav_until > now + EPSILON;
        if busy && !self.medium_busy {
            self.medium_busy = true;
            self.pause_backoff();
        } else if !busy && self.medium_busy {
            self.medium_busy = false;
            self.idle_since = now;
            self.resume_backoff();
        }
    }
}

impl EventHandler for WifiDevice {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            MacSend { packet, next_hop } => {
                self.enqueue(packet, next_hop);
            }
            SignalArrival {
                signal_id,
                frame,
                rx_power_dbm,
                duration,
            } => {
                self.phy_rx_start(signal_id, frame, rx_power_dbm, duration);
            }
            SignalEnd { signal_id } => {
                self.phy_rx_end(signal_id);
            }
            TxEnd { frame_type, dst } => {
                self.on_tx_end(frame_type, dst);
            }
            BackoffExpired {} => {
                self.on_backoff_expired();
            }
            ResponseTimeout {} => {
                self.on_response_timeout();
            }
            DelayedTx { frame } => {
                self.on_delayed_tx(frame);
            }
            NavEnd {} => {
                self.update_medium();
            }
        })
    }
}
