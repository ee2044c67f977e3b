#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod address;
pub mod channel;
pub mod config;
pub mod counters;
pub mod dcf;
pub mod device;
pub mod frame;
pub mod mode;
pub mod packet;
pub mod rate;
pub mod timing;

pub use address::MacAddress;
pub use channel::WirelessChannel;
pub use config::{MacConfig, PhyConfig};
pub use counters::DeviceCounters;
pub use device::{MacDrop, MacDropReason, MacReceive, MacSend, MacState, WifiDevice};
pub use mode::WifiMode;
pub use packet::{FlowKey, Packet, TxDone};
pub use rate::RateManagerConfig;
