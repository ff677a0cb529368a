//! Transport dispatchers: one per delivery path (PS, CS 3GPP, CS 3GPP2).

mod link;

use std::{fmt::Debug, sync::Arc};

use smsroute_common::{Domain, ResultCode, SmsFormat, incoming};
use tokio::sync::mpsc;

pub use link::{LinkDispatcher, LinkResponse, LinkRetryPolicy, SmsLink, Submission};

use crate::{command::Command, tracker::MessageTracker};

/// How a transport finished with a tracker it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportOutcome {
    /// Terminal success.
    Sent,
    /// Terminal failure.
    Failed(ResultCode),
    /// Move the tracker to CS. Only the PS dispatcher emits this.
    Fallback,
    /// Re-dispatch the tracker through the controller's retry path.
    RetryRequested,
}

impl TransportOutcome {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed(_))
    }
}

/// Attempts delivery on one transport.
///
/// Implementations must not block: `send` hands the tracker off and returns,
/// and the outcome comes back later through the [`OutcomeReporter`].
pub trait TransportDispatcher: Send + Sync + Debug {
    fn domain(&self) -> Domain;

    fn format(&self) -> SmsFormat;

    fn send(&self, tracker: MessageTracker, reporter: OutcomeReporter);

    /// Cheap capability probe, e.g. IMS registration state.
    fn is_available(&self) -> bool;

    fn is_emergency_sms_support(&self, destination: &str) -> bool;

    /// `true` when the controller assigns message references for this
    /// transport, `false` when the transport assigns its own.
    fn is_message_ref_increment_via_telephony(&self) -> bool;
}

/// Posts a transport's outcome back onto the controller's command queue.
#[derive(Debug, Clone)]
pub struct OutcomeReporter {
    commands: mpsc::UnboundedSender<Command>,
    domain: Domain,
}

impl OutcomeReporter {
    pub(crate) const fn new(commands: mpsc::UnboundedSender<Command>, domain: Domain) -> Self {
        Self { commands, domain }
    }

    /// The domain the tracker was dispatched on.
    #[must_use]
    pub const fn domain(&self) -> Domain {
        self.domain
    }

    pub fn report(&self, tracker: MessageTracker, outcome: TransportOutcome) {
        let message_id = tracker.message_id();
        incoming!(message_id, domain = %self.domain, ?outcome, "Transport outcome");

        let command = Command::Outcome {
            tracker,
            domain: self.domain,
            outcome,
        };
        if self.commands.send(command).is_err() {
            tracing::warn!(message_id, "Dispatch controller is gone, outcome dropped");
        }
    }
}

/// The three dispatchers the controller routes between.
#[derive(Debug, Clone)]
pub struct Transports {
    pub ps: Arc<dyn TransportDispatcher>,
    pub cs_3gpp: Arc<dyn TransportDispatcher>,
    pub cs_3gpp2: Arc<dyn TransportDispatcher>,
}

impl Transports {
    #[must_use]
    pub fn cs_for(&self, format: SmsFormat) -> &Arc<dyn TransportDispatcher> {
        match format {
            SmsFormat::ThreeGpp => &self.cs_3gpp,
            SmsFormat::ThreeGpp2 => &self.cs_3gpp2,
        }
    }
}
