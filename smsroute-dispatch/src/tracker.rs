//! The in-memory record of one logical outbound message

use serde::{Deserialize, Serialize};
use smsroute_common::{Domain, SendResult, TrafficClass};
use tokio::sync::oneshot;
use tracing::debug;

use crate::types::{Payload, SendOptions, SendRequest};

/// Receives the terminal result of a message.
pub type SentCallback = oneshot::Sender<SendResult>;

/// Receives the network status report for a message, if the transport
/// supports them.
pub type DeliveryCallback = oneshot::Sender<DeliveryReport>;

/// Status report correlated to a message by its wire reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub message_ref: u8,
    pub delivered: bool,
    /// Raw TP-Status (3GPP) or cause code (3GPP2).
    pub status: u32,
}

/// One logical outbound message and its delivery history.
///
/// A tracker is moved, never cloned, between the controller and whichever
/// transport dispatcher currently holds it.
#[derive(Debug)]
pub struct MessageTracker {
    destination: String,
    service_center: Option<String>,
    payload: Payload,
    options: SendOptions,
    emergency: bool,
    message_ref: Option<u8>,
    retry_count: u32,
    uses_ims_service_for_ims: bool,
    last_domain: Option<Domain>,
    sent: Option<SentCallback>,
    delivered: Option<DeliveryCallback>,
}

impl MessageTracker {
    #[must_use]
    pub fn new(request: SendRequest, emergency: bool) -> Self {
        Self {
            destination: request.destination,
            service_center: request.service_center,
            payload: request.payload,
            options: request.options.normalised(),
            emergency,
            message_ref: None,
            retry_count: 0,
            uses_ims_service_for_ims: false,
            last_domain: None,
            sent: request.sent,
            delivered: request.delivered,
        }
    }

    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    #[must_use]
    pub fn service_center(&self) -> Option<&str> {
        self.service_center.as_deref()
    }

    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    #[must_use]
    pub const fn options(&self) -> &SendOptions {
        &self.options
    }

    #[must_use]
    pub const fn message_id(&self) -> u64 {
        self.options.message_id
    }

    #[must_use]
    pub const fn is_emergency(&self) -> bool {
        self.emergency
    }

    #[must_use]
    pub const fn traffic_class(&self) -> TrafficClass {
        TrafficClass::from_emergency(self.emergency)
    }

    #[must_use]
    pub const fn message_ref(&self) -> Option<u8> {
        self.message_ref
    }

    /// Assign the wire message reference.
    ///
    /// Returns `false` and leaves the tracker untouched if a reference was
    /// already assigned.
    pub fn assign_message_ref(&mut self, message_ref: u8) -> bool {
        if self.message_ref.is_some() {
            return false;
        }

        self.message_ref = Some(message_ref);
        true
    }

    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn increment_retry(&mut self) {
        self.retry_count = self.retry_count.saturating_add(1);
    }

    /// Set once the message has been handed to the IMS transport.
    #[must_use]
    pub const fn uses_ims_service_for_ims(&self) -> bool {
        self.uses_ims_service_for_ims
    }

    #[must_use]
    pub const fn last_domain(&self) -> Option<Domain> {
        self.last_domain
    }

    /// Whether this tracker has never been handed to a transport.
    #[must_use]
    pub const fn is_first_dispatch(&self) -> bool {
        self.last_domain.is_none()
    }

    pub(crate) fn record_dispatch(&mut self, domain: Domain) {
        self.last_domain = Some(domain);
        if domain.is_ps() {
            self.uses_ims_service_for_ims = true;
        }
    }

    pub fn take_delivery_callback(&mut self) -> Option<DeliveryCallback> {
        self.delivered.take()
    }

    /// Deliver the terminal result to the sender, consuming the tracker.
    pub fn complete(mut self, result: SendResult) {
        if let Some(sent) = self.sent.take()
            && sent.send(result).is_err()
        {
            debug!(
                message_id = self.message_id(),
                "Sender dropped its callback before the result arrived"
            );
        }
    }
}
