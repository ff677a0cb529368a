//! Request types accepted by the dispatch entry points

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::debug;

use crate::{
    error::RejectReason,
    tracker::{DeliveryCallback, DeliveryReport, SentCallback},
};

const MIN_VALIDITY_PERIOD_MINS: u32 = 5;
const MAX_VALIDITY_PERIOD_MINS: u32 = 635_040;
const MAX_PRIORITY: u8 = 3;

/// The body of a message, in one of the shapes a sender may submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Text(String),
    Data { port: u16, data: Vec<u8> },
    MultipartText(Vec<String>),
}

impl Payload {
    /// A payload a transport can encode: non-empty, and for multipart, no
    /// empty parts.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        match self {
            Self::Text(text) => !text.is_empty(),
            Self::Data { data, .. } => !data.is_empty(),
            Self::MultipartText(parts) => {
                !parts.is_empty() && parts.iter().all(|part| !part.is_empty())
            }
        }
    }

    #[must_use]
    pub const fn kind(&self) -> RequestKind {
        match self {
            Self::Text(_) => RequestKind::Text,
            Self::Data { .. } => RequestKind::Data,
            Self::MultipartText(_) => RequestKind::MultipartText,
        }
    }

    /// Number of transport segments this payload occupies.
    #[must_use]
    pub fn part_count(&self) -> usize {
        match self {
            Self::Text(_) | Self::Data { .. } => 1,
            Self::MultipartText(parts) => parts.len(),
        }
    }
}

/// What produced a queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    Text,
    Data,
    MultipartText,
    /// Re-dispatch of an existing tracker.
    Retry,
}

/// Caller supplied options. Opaque to routing apart from normalisation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    #[serde(default)]
    pub calling_package: String,
    /// Keep a copy of the message in the sender's outbox.
    #[serde(default)]
    pub persist: bool,
    /// 0 (normal) to 3 (emergency); anything else is treated as unset.
    #[serde(default)]
    pub priority: Option<u8>,
    /// More messages to the same destination will follow shortly.
    #[serde(default)]
    pub expect_more: bool,
    /// Validity period in minutes; outside 5..=635040 it is treated as unset.
    #[serde(default)]
    pub validity_period_mins: Option<u32>,
    /// Caller chosen identifier, echoed in logs and emergency bookkeeping.
    #[serde(default)]
    pub message_id: u64,
    #[serde(default)]
    pub uid: u32,
}

impl SendOptions {
    /// Drop out of range priority and validity values instead of rejecting.
    #[must_use]
    pub fn normalised(mut self) -> Self {
        if let Some(priority) = self.priority
            && priority > MAX_PRIORITY
        {
            debug!(message_id = self.message_id, priority, "Ignoring invalid priority");
            self.priority = None;
        }

        if let Some(validity) = self.validity_period_mins
            && !(MIN_VALIDITY_PERIOD_MINS..=MAX_VALIDITY_PERIOD_MINS).contains(&validity)
        {
            debug!(
                message_id = self.message_id,
                validity, "Ignoring invalid validity period"
            );
            self.validity_period_mins = None;
        }

        self
    }
}

/// A send as issued by a caller.
#[derive(Debug)]
pub struct SendRequest {
    pub destination: String,
    pub service_center: Option<String>,
    pub payload: Payload,
    pub options: SendOptions,
    pub sent: Option<SentCallback>,
    pub delivered: Option<DeliveryCallback>,
}

impl SendRequest {
    #[must_use]
    pub fn new(destination: impl Into<String>, payload: Payload) -> Self {
        Self {
            destination: destination.into(),
            service_center: None,
            payload,
            options: SendOptions::default(),
            sent: None,
            delivered: None,
        }
    }

    #[must_use]
    pub fn text(destination: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(destination, Payload::Text(text.into()))
    }

    #[must_use]
    pub fn data(destination: impl Into<String>, port: u16, data: Vec<u8>) -> Self {
        Self::new(destination, Payload::Data { port, data })
    }

    #[must_use]
    pub fn multipart(destination: impl Into<String>, parts: Vec<String>) -> Self {
        Self::new(destination, Payload::MultipartText(parts))
    }

    #[must_use]
    pub fn service_center(mut self, address: impl Into<String>) -> Self {
        self.service_center = Some(address.into());
        self
    }

    #[must_use]
    pub fn options(mut self, options: SendOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach a sent callback and return the receiving half.
    pub fn on_sent(&mut self) -> oneshot::Receiver<smsroute_common::SendResult> {
        let (tx, rx) = oneshot::channel();
        self.sent = Some(tx);
        rx
    }

    /// Attach a delivery report callback and return the receiving half.
    pub fn on_delivered(&mut self) -> oneshot::Receiver<DeliveryReport> {
        let (tx, rx) = oneshot::channel();
        self.delivered = Some(tx);
        rx
    }

    /// Checks that do not need any collaborator.
    ///
    /// # Errors
    ///
    /// Returns the first [`RejectReason`] that applies.
    pub fn validate(&self, expected: RequestKind) -> Result<(), RejectReason> {
        if self.destination.trim().is_empty() {
            return Err(RejectReason::EmptyDestination);
        }

        let actual = self.payload.kind();
        if actual != expected {
            return Err(RejectReason::PayloadMismatch { expected, actual });
        }

        if !self.payload.is_well_formed() {
            return Err(RejectReason::EmptyPayload);
        }

        Ok(())
    }
}
