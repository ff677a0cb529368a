//! Drive the smsroute dispatch core against simulated IMS and modem links.
//!
//! A [`SimulatorConfig`] describes how each link and the domain selection
//! resolver answer, along with the messages to submit. [`Simulator::run`]
//! pushes every message through a [`smsroute_dispatch::DispatchService`] and
//! reports how each one ended.

pub mod config;
pub mod link;
pub mod resolver;
mod simulator;

pub use config::{ConfigError, SimulatorConfig};
pub use simulator::{MessageOutcome, Resolution, Simulator};
