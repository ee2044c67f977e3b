#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod address;
pub mod app;
pub mod link;
pub mod monitor;
pub mod routing;
pub mod sampler;
pub mod scenario;
pub mod stack;
pub mod topology;
pub mod trace;

pub use scenario::{execute, RunReport, Scenario, ScenarioConfig};
