//! Everything that may mutate controller state arrives as a [`Command`] on
//! one queue, so all mutation happens in a single serialized context.

use std::sync::Arc;

use serde::Serialize;
use smsroute_common::{Domain, TrafficClass};
use tokio::sync::oneshot;

use crate::{
    controller::DispatchEvent,
    error::SelectionError,
    registrants::{Subscription, SubscriptionId},
    selection::{ConnectionId, DomainSelectionResolver},
    tracker::MessageTracker,
    transport::TransportOutcome,
    types::{RequestKind, SendRequest},
};

#[derive(Debug)]
pub enum Command {
    /// An already admitted request from a caller.
    Submit { kind: RequestKind, request: SendRequest },
    Retry(MessageTracker),
    SelectionCompleted {
        class: TrafficClass,
        connection: ConnectionId,
        result: Result<Domain, SelectionError>,
    },
    SelectionTerminated {
        class: TrafficClass,
        connection: ConnectionId,
        cause: u32,
    },
    Outcome {
        tracker: MessageTracker,
        domain: Domain,
        outcome: TransportOutcome,
    },
    InboundSms { originating_address: String },
    InstallResolver(Option<Arc<dyn DomainSelectionResolver>>),
    Subscribe(oneshot::Sender<Subscription<DispatchEvent>>),
    Unsubscribe(SubscriptionId),
    Snapshot(oneshot::Sender<ControllerSnapshot>),
}

/// Point in time view of the controller, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerSnapshot {
    pub domain_selection_supported: bool,
    pub normal_pending: usize,
    pub emergency_pending: usize,
    pub normal_selecting: bool,
    pub emergency_selecting: bool,
    pub next_message_ref: u8,
}
