//! Outbound SMS routing across the packet-switched (IMS) and circuit-switched
//! (modem) transports.
//!
//! This crate provides:
//! - A per-message [`MessageTracker`] with a stable wire message reference
//! - Per traffic class domain selection, with requests queued behind a single
//!   outstanding decision
//! - PS to CS fallback and bounded retries without reallocating the reference
//! - A serialized [`DispatchService`] that owns all routing state

mod command;
mod config;
mod controller;
pub mod emergency;
mod error;
mod phone;
mod registrants;
pub mod selection;
mod sequence;
mod service;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
mod tracker;
pub mod transport;
mod types;

pub use command::{Command, ControllerSnapshot};
pub use config::DispatchConfig;
pub use controller::{Collaborators, DispatchController, DispatchEvent};
pub use error::{DispatchError, EmergencyError, RejectReason, SelectionError, SystemError};
pub use phone::{PhoneState, StaticPhoneState, StorageMonitor, UnlimitedStorage};
pub use registrants::{Registrants, Subscription, SubscriptionId};
pub use sequence::SequenceCounter;
pub use service::{DispatchHandle, DispatchService};
pub use tracker::{DeliveryCallback, DeliveryReport, MessageTracker, SentCallback};
pub use types::{Payload, RequestKind, SendOptions, SendRequest};
