use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

use rstest::rstest;
use sugars::{boxed, rc, refcell};

use wnsim_core::{cast, Event, EventHandler, Id, Simulation, SimulationContext};
use wnsim_models::geometry::Vector;
use wnsim_models::mobility::{ConstantPosition, Mobility};
use wnsim_models::propagation::{ConstantSpeedDelay, FriisLoss};
use wnsim_wifi::device::{MacDropReason, MacReceive, MacSend, MacState};
use wnsim_wifi::{MacAddress, MacConfig, Packet, PhyConfig, RateManagerConfig, TxDone, WifiDevice, WifiMode, WirelessChannel};

#[derive(Default)]
struct Upper {
    received: Vec<(u64, MacAddress)>,
}

impl EventHandler for Upper {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            MacReceive { packet, from, .. } => {
                self.received.push((packet.uid, from));
            }
        })
    }
}

#[derive(Default)]
struct App {
    done: Vec<(u64, bool)>,
}

impl EventHandler for App {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            TxDone { packet_uid, success } => {
                self.done.push((packet_uid, success));
            }
        })
    }
}

struct Station {
    device: Rc<RefCell<WifiDevice>>,
    upper: Rc<RefCell<Upper>>,
}

struct TestBed {
    sim: Simulation,
    channel: Rc<RefCell<WirelessChannel>>,
    app: Rc<RefCell<App>>,
    app_id: Id,
    driver: SimulationContext,
    next_uid: u32,
}

impl TestBed {
    fn new(seed: u64) -> Self {
        let mut sim = Simulation::new(seed);
        let channel = rc!(refcell!(WirelessChannel::new(
            5e9,
            boxed!(FriisLoss::default()),
            boxed!(ConstantSpeedDelay::default()),
            sim.create_context("channel"),
        )));
        let app = rc!(refcell!(App::default()));
        let app_id = sim.add_handler("app", app.clone());
        let driver = sim.create_context("driver");
        Self {
            sim,
            channel,
            app,
            app_id,
            driver,
            next_uid: 0,
        }
    }

    fn add_station(&mut self, index: usize, position: Vector, phy: PhyConfig, mac: MacConfig) -> Station {
        let name = format!("sta{}", index);
        let device = rc!(refcell!(WifiDevice::new(
            MacAddress::new(index as u64 + 1),
            index,
            phy,
            mac,
            self.channel.clone(),
            self.sim.create_context(&name),
        )));
        let device_id = self.sim.add_handler(&name, device.clone());
        let mobility = rc!(refcell!(Mobility::new(boxed!(ConstantPosition::new(position)))));
        self.channel.borrow_mut().attach(device_id, mobility);

        let upper = rc!(refcell!(Upper::default()));
        let upper_id = self.sim.add_handler(format!("{}-upper", name), upper.clone());
        device.borrow_mut().set_upper_layer(upper_id);
        Station { device, upper }
    }

    fn send(&mut self, from: &Station, to: &Station, payload: u32) -> u64 {
        let mut packet = Packet::udp(
            self.app_id,
            self.next_uid,
            Ipv4Addr::new(10, 0, 0, 1),
            9,
            Ipv4Addr::new(10, 0, 0, 2),
            9,
            payload,
            self.sim.time(),
        );
        packet.origin_app = Some(self.app_id);
        self.next_uid += 1;
        let uid = packet.uid;
        let next_hop = to.device.borrow().address();
        self.driver.emit_now(MacSend { packet, next_hop }, from.device.borrow().id());
        uid
    }
}

fn constant_rate(mode: WifiMode) -> MacConfig {
    MacConfig {
        rate_manager: RateManagerConfig::Constant(mode),
        ..MacConfig::default()
    }
}

#[test]
fn test_unicast_delivery() {
    let mut bed = TestBed::new(1);
    let a = bed.add_station(0, Vector::new(0., 0., 0.), PhyConfig::default(), MacConfig::default());
    let b = bed.add_station(1, Vector::new(10., 0., 0.), PhyConfig::default(), MacConfig::default());
    let uids: Vec<u64> = (0..10).map(|_| bed.send(&a, &b, 1000)).collect();
    bed.sim.step_until_no_events();

    let received: Vec<u64> = b.upper.borrow().received.iter().map(|(uid, _)| *uid).collect();
    assert_eq!(received, uids);
    assert!(b.upper.borrow().received.iter().all(|(_, from)| *from == MacAddress::new(1)));

    let counters = a.device.borrow().counters().clone();
    assert_eq!(counters.tx_ok, 10);
    assert_eq!(counters.tx_attempts, 10);
    assert_eq!(counters.collisions, 0);
    assert_eq!(counters.mac_drops, 0);
    assert_eq!(b.device.borrow().counters().rx_ok, 10);
    // ACKs
    assert_eq!(b.device.borrow().counters().phy_tx, 10);
    assert_eq!(a.device.borrow().counters().rx_ok, 10);

    assert_eq!(a.device.borrow().in_flight(), 0);
    assert_eq!(a.device.borrow().state(), MacState::Idle);
    assert!(!a.device.borrow().is_medium_busy());
    let done = &bed.app.borrow().done;
    assert_eq!(done.len(), 10);
    assert!(done.iter().all(|(_, success)| *success));
}

#[test]
fn test_transmission_time() {
    let mut bed = TestBed::new(1);
    let mac = MacConfig {
        cw_min: 0,
        ..constant_rate(WifiMode::Ofdm54Mbps)
    };
    let a = bed.add_station(0, Vector::new(0., 0., 0.), PhyConfig::default(), mac.clone());
    let b = bed.add_station(1, Vector::new(0., 0., 0.), PhyConfig::default(), mac);
    bed.send(&a, &b, 1472);
    bed.sim.step_until_no_events();

    // zero backoff: DIFS + DATA(1536 bytes) + SIFS + ACK(24 Mbit/s), zero distance
    let expected = 34e-6 + 248e-6 + 16e-6 + 28e-6;
    assert!((bed.sim.time() - expected).abs() < 1e-9, "{}", bed.sim.time());
    assert_eq!(b.upper.borrow().received.len(), 1);
}

#[test]
fn test_retry_limit_drop() {
    let mut bed = TestBed::new(2);
    let a = bed.add_station(0, Vector::new(0., 0., 0.), PhyConfig::default(), MacConfig::default());
    // far beyond the detection range
    let b = bed.add_station(1, Vector::new(5000., 0., 0.), PhyConfig::default(), MacConfig::default());
    let drops = rc!(refcell!(Vec::new()));
    let drops_clone = drops.clone();
    a.device
        .borrow_mut()
        .subscribe_drops(move |drop| drops_clone.borrow_mut().push((drop.packet.uid, drop.reason)));
    let uid = bed.send(&a, &b, 500);
    bed.sim.step_until_no_events();

    let counters = a.device.borrow().counters().clone();
    assert_eq!(counters.tx_attempts, 8);
    assert_eq!(counters.collisions, 8);
    assert_eq!(counters.mac_drops, 1);
    assert_eq!(counters.tx_ok, 0);
    assert_eq!(b.device.borrow().counters().rx_ok + b.device.borrow().counters().rx_error, 0);
    assert_eq!(*drops.borrow(), vec![(uid, MacDropReason::RetryLimit)]);
    assert_eq!(bed.app.borrow().done, vec![(uid, false)]);
    assert_eq!(a.device.borrow().contention_window(), 15);
    assert_eq!(a.device.borrow().retries(), 0);
    assert_eq!(a.device.borrow().state(), MacState::Idle);
}

#[test]
fn test_queue_overflow() {
    let mut bed = TestBed::new(3);
    let mac = MacConfig {
        queue_capacity: 2,
        ..MacConfig::default()
    };
    let a = bed.add_station(0, Vector::new(0., 0., 0.), PhyConfig::default(), mac);
    let b = bed.add_station(1, Vector::new(5., 0., 0.), PhyConfig::default(), MacConfig::default());
    let drops = rc!(refcell!(0));
    let drops_clone = drops.clone();
    a.device.borrow_mut().subscribe_drops(move |drop| {
        assert_eq!(drop.reason, MacDropReason::QueueFull);
        *drops_clone.borrow_mut() += 1;
    });
    for _ in 0..5 {
        bed.send(&a, &b, 1000);
    }
    bed.sim.step_until_no_events();

    assert_eq!(a.device.borrow().counters().queue_drops, 2);
    assert_eq!(*drops.borrow(), 2);
    assert_eq!(b.upper.borrow().received.len(), 3);
    let failed = bed.app.borrow().done.iter().filter(|(_, success)| !success).count();
    assert_eq!(failed, 2);
}

#[test]
fn test_rts_cts_exchange() {
    let mut bed = TestBed::new(4);
    let mac = MacConfig {
        rts_threshold: Some(100),
        ..constant_rate(WifiMode::Ofdm36Mbps)
    };
    let a = bed.add_station(0, Vector::new(0., 0., 0.), PhyConfig::default(), mac.clone());
    let b = bed.add_station(1, Vector::new(8., 0., 0.), PhyConfig::default(), mac.clone());
    let c = bed.add_station(2, Vector::new(4., 3., 0.), PhyConfig::default(), mac);
    for _ in 0..3 {
        bed.send(&a, &b, 1000);
    }
    // small frames are sent without protection
    bed.send(&c, &b, 20);
    bed.sim.step_until_no_events();

    assert_eq!(b.upper.borrow().received.len(), 4);
    let a_counters = a.device.borrow().counters().clone();
    assert_eq!(a_counters.tx_ok, 3);
    // every data frame is preceded by RTS
    assert!(a_counters.phy_tx >= 2 * a_counters.tx_attempts);
    assert_eq!(c.device.borrow().counters().tx_ok, 1);
    assert_eq!(c.device.borrow().counters().phy_tx, c.device.borrow().counters().tx_attempts);
}

#[test]
fn test_contending_stations() {
    let mut bed = TestBed::new(5);
    let ap = bed.add_station(0, Vector::new(0., 0., 0.), PhyConfig::default(), MacConfig::default());
    let stations: Vec<Station> = (1..=3)
        .map(|i| bed.add_station(i, Vector::new(i as f64 * 3., 2., 0.), PhyConfig::default(), MacConfig::default()))
        .collect();
    for _ in 0..20 {
        for sta in stations.iter() {
            bed.send(sta, &ap, 1200);
        }
    }
    bed.sim.step_until_no_events();

    let mut delivered = 0;
    for sta in stations.iter() {
        let counters = sta.device.borrow().counters().clone();
        assert_eq!(counters.tx_ok + counters.mac_drops, 20);
        assert_eq!(counters.tx_attempts, counters.tx_ok + counters.collisions);
        delivered += counters.tx_ok;
        assert_eq!(sta.device.borrow().in_flight(), 0);
    }
    let received = &ap.upper.borrow().received;
    assert!(received.len() as u64 >= delivered);
    assert!(received.len() <= 60);
    let mut uids: Vec<u64> = received.iter().map(|(uid, _)| *uid).collect();
    uids.sort();
    uids.dedup();
    assert_eq!(uids.len(), received.len());
}

#[test]
fn test_duplicate_detection() {
    let mut bed = TestBed::new(6);
    // the sender cannot hear acknowledgements
    let deaf = PhyConfig {
        rx_gain_db: -60.,
        ..PhyConfig::default()
    };
    let a = bed.add_station(0, Vector::new(0., 0., 0.), deaf, constant_rate(WifiMode::Ofdm24Mbps));
    let b = bed.add_station(1, Vector::new(10., 0., 0.), PhyConfig::default(), MacConfig::default());
    bed.send(&a, &b, 1000);
    bed.sim.step_until_no_events();

    assert_eq!(a.device.borrow().counters().tx_attempts, 8);
    assert_eq!(a.device.borrow().counters().mac_drops, 1);
    assert_eq!(b.device.borrow().counters().rx_ok, 8);
    assert_eq!(b.device.borrow().counters().phy_tx, 8);
    assert_eq!(b.upper.borrow().received.len(), 1);
}

#[test]
fn test_flush() {
    let mut bed = TestBed::new(7);
    let a = bed.add_station(0, Vector::new(0., 0., 0.), PhyConfig::default(), MacConfig::default());
    let b = bed.add_station(1, Vector::new(10., 0., 0.), PhyConfig::default(), MacConfig::default());
    for _ in 0..5 {
        bed.send(&a, &b, 1000);
    }
    bed.sim.steps(5);
    assert_eq!(a.device.borrow().in_flight(), 5);

    assert_eq!(a.device.borrow_mut().flush(), 5);
    assert_eq!(a.device.borrow().in_flight(), 0);
    assert_eq!(a.device.borrow().state(), MacState::Idle);
}

#[test]
fn test_same_seed_same_outcome() {
    let run = |seed: u64| {
        let mut bed = TestBed::new(seed);
        let ap = bed.add_station(0, Vector::new(0., 0., 0.), PhyConfig::default(), MacConfig::default());
        let stations: Vec<Station> = (1..=4)
            .map(|i| bed.add_station(i, Vector::new(2., i as f64, 0.), PhyConfig::default(), MacConfig::default()))
            .collect();
        for _ in 0..10 {
            for sta in stations.iter() {
                bed.send(sta, &ap, 1472);
            }
        }
        bed.sim.step_until_no_events();
        let collisions: Vec<u64> = stations
            .iter()
            .map(|s| s.device.borrow().counters().collisions)
            .collect();
        (bed.sim.time(), collisions)
    };
    assert_eq!(run(11), run(11));
}

/// Station a at the origin transmits a long frame to a far station. Station b at 30 m gets its
/// own packet shortly after the transmission starts. Returns whether b sensed the medium busy
/// during the transmission and the number of frames b has sent by then.
fn sense_neighbour(threshold_offset_db: f64) -> (bool, u64) {
    let mut bed = TestBed::new(8);
    let power_at_b = bed
        .channel
        .borrow()
        .compute_reception(&Vector::new(0., 0., 0.), &Vector::new(30., 0., 0.), 10.);
    let phy = PhyConfig {
        energy_detection_dbm: power_at_b + threshold_offset_db,
        ..PhyConfig::default()
    };
    let mac = MacConfig {
        cw_min: 0,
        ..constant_rate(WifiMode::Ofdm6Mbps)
    };
    let a = bed.add_station(0, Vector::new(0., 0., 0.), PhyConfig::default(), mac.clone());
    let b = bed.add_station(1, Vector::new(30., 0., 0.), phy, constant_rate(WifiMode::Ofdm6Mbps));
    let far = bed.add_station(2, Vector::new(5000., 0., 0.), PhyConfig::default(), mac);

    // a starts after DIFS and stays on air for more than a millisecond
    bed.send(&a, &far, 1000);
    bed.sim.step_until_time(2e-4);
    assert_eq!(a.device.borrow().state(), MacState::Transmitting);
    let busy = b.device.borrow().is_medium_busy();

    // the backoff of b takes at most 15 slots after DIFS
    bed.send(&b, &far, 100);
    bed.sim.step_until_time(6e-4);
    assert_eq!(a.device.borrow().state(), MacState::Transmitting);
    let result = (busy, b.device.borrow().counters().phy_tx);
    result
}

#[rstest]
#[case(-1., true, 0)]
#[case(0., false, 1)]
#[case(1., false, 1)]
fn test_energy_detection_threshold(
    #[case] threshold_offset_db: f64,
    #[case] expected_busy: bool,
    #[case] expected_phy_tx: u64,
) {
    let (busy, phy_tx) = sense_neighbour(threshold_offset_db);
    assert_eq!(busy, expected_busy);
    assert_eq!(phy_tx, expected_phy_tx);
}
