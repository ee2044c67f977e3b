//! Shared wireless medium.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use wnsim_core::{log_error, log_trace, Id, SimulationContext};
use wnsim_models::geometry::Vector;
use wnsim_models::mobility::Mobility;
use wnsim_models::propagation::{PropagationDelayModel, PropagationLossModel};

use crate::frame::Frame;

// EVENTS //////////////////////////////////////////////////////////////////////

/// Start of a signal at a receiving device.
#[derive(Clone, Serialize)]
pub struct SignalArrival {
    /// Identifier of the transmission, shared by all receivers.
    pub signal_id: u64,
    /// Transmitted frame.
    pub frame: Frame,
    /// Received power in dBm (before receiver antenna gain).
    pub rx_power_dbm: f64,
    /// Signal duration.
    pub duration: f64,
}

////////////////////////////////////////////////////////////////////////////////

struct Port {
    device: Id,
    mobility: Rc<RefCell<Mobility>>,
}

/// Wireless channel connecting devices which share the same frequency.
///
/// Every transmission is delivered as a [`SignalArrival`] event to each other attached device after
/// the propagation delay, carrying the received power computed with the propagation loss model.
pub struct WirelessChannel {
    frequency: f64,
    loss: Box<dyn PropagationLossModel>,
    delay: Box<dyn PropagationDelayModel>,
    ports: Vec<Port>,
    next_signal_id: u64,
    ctx: SimulationContext,
}

impl WirelessChannel {
    /// Creates a channel with given carrier frequency (Hz) and propagation models.
    pub fn new(
        frequency: f64,
        loss: Box<dyn PropagationLossModel>,
        delay: Box<dyn PropagationDelayModel>,
        ctx: SimulationContext,
    ) -> Self {
        Self {
            frequency,
            loss,
            delay,
            ports: Vec::new(),
            next_signal_id: 0,
            ctx,
        }
    }

    /// Attaches the device whose antenna moves according to the mobility model.
    pub fn attach(&mut self, device: Id, mobility: Rc<RefCell<Mobility>>) {
        self.ports.push(Port { device, mobility });
    }

    /// Returns the number of attached devices.
    pub fn device_count(&self) -> usize {
        self.ports.len()
    }

    /// Returns the carrier frequency.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Returns the received power (dBm) of a signal transmitted with `tx_power` dBm.
    pub fn compute_reception(&self, tx_position: &Vector, rx_position: &Vector, tx_power: f64) -> f64 {
        self.loss
            .compute_reception(tx_position, rx_position, tx_power, self.frequency)
    }

    /// Starts the transmission of a frame by the device `src` and returns the signal id.
    pub fn transmit(&mut self, src: Id, frame: &Frame, tx_power_dbm: f64, duration: f64) -> u64 {
        let signal_id = self.next_signal_id;
        self.next_signal_id += 1;

        let now = self.ctx.time();
        let tx_position = match self.ports.iter().find(|p| p.device == src) {
            Some(port) => port.mobility.borrow_mut().position_at(now),
            None => {
                log_error!(self.ctx, "transmission from detached device {}", src);
                return signal_id;
            }
        };
        for port in self.ports.iter().filter(|p| p.device != src) {
            let rx_position = port.mobility.borrow_mut().position_at(now);
            let distance = tx_position.distance(&rx_position);
            let rx_power_dbm = self.compute_reception(&tx_position, &rx_position, tx_power_dbm);
            let delay = self.delay.delay(distance);
            log_trace!(
                self.ctx,
                "signal {} from {} to {}: {:.2} dBm over {:.1} m",
                signal_id,
                src,
                port.device,
                rx_power_dbm,
                distance
            );
            self.ctx.emit_as(
                SignalArrival {
                    signal_id,
                    frame: frame.clone(),
                    rx_power_dbm,
                    duration,
                },
                src,
                port.device,
                delay,
            );
        }
        signal_id
    }
}
