//! Vocabulary shared by every smsroute crate: transport domains, message
//! formats, caller-visible result codes, and the logging layer.

pub mod domain;
pub mod logging;
pub mod status;

pub use domain::{Domain, SmsFormat, TrafficClass};
pub use status::{ResultCode, SendResult};
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
