//! Emergency number classification and the emergency state coordinator
//! adapter.

use std::{collections::HashSet, fmt::Debug, sync::Arc};

use futures_util::future::BoxFuture;
use smsroute_common::{Domain, outgoing};
use tracing::{debug, warn};

use crate::{error::EmergencyError, tracker::MessageTracker};

pub trait EmergencyNumberClassifier: Send + Sync + Debug {
    fn is_emergency_number(&self, address: &str) -> bool;
}

/// Classifier over a fixed set of numbers.
#[derive(Debug, Clone, Default)]
pub struct StaticClassifier {
    numbers: HashSet<String>,
}

impl StaticClassifier {
    #[must_use]
    pub fn new<I, S>(numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            numbers: numbers.into_iter().map(Into::into).collect(),
        }
    }
}

impl EmergencyNumberClassifier for StaticClassifier {
    fn is_emergency_number(&self, address: &str) -> bool {
        self.numbers.contains(address.trim())
    }
}

pub type EmergencyStartFuture = BoxFuture<'static, Result<(), EmergencyError>>;

/// External tracker of the emergency call/SMS lifecycle.
pub trait EmergencyStateTracker: Send + Sync + Debug {
    fn start_emergency_sms(&self, destination: &str, is_over_ims: bool) -> EmergencyStartFuture;

    fn end_sms(&self, message_id: u64, success: bool, domain: Domain, is_last_part: bool);

    fn on_emergency_sms_received(&self);
}

/// Calls into the [`EmergencyStateTracker`] at the points the controller
/// defines. Does nothing for normal traffic or when no tracker is installed.
#[derive(Debug, Clone, Default)]
pub struct EmergencyCoordinator {
    tracker: Option<Arc<dyn EmergencyStateTracker>>,
}

impl EmergencyCoordinator {
    #[must_use]
    pub const fn new(tracker: Option<Arc<dyn EmergencyStateTracker>>) -> Self {
        Self { tracker }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.tracker.is_some()
    }

    /// Open the emergency session for a message about to be dispatched for
    /// the first time. The outcome is only logged.
    pub fn start(&self, message: &MessageTracker, domain: Domain) {
        let Some(tracker) = &self.tracker else {
            return;
        };
        if !message.is_emergency() {
            return;
        }

        let message_id = message.message_id();
        outgoing!(message_id, %domain, "Starting emergency SMS");
        let start = tracker.start_emergency_sms(message.destination(), domain.is_ps());
        tokio::spawn(async move {
            match start.await {
                Ok(()) => debug!(message_id, "Emergency SMS session started"),
                Err(err) => warn!(message_id, "Emergency SMS session failed to start: {err}"),
            }
        });
    }

    /// Close out the emergency session of a message that reached a terminal
    /// outcome.
    pub fn end(&self, message: &MessageTracker, success: bool, domain: Domain) {
        if let Some(tracker) = &self.tracker
            && message.is_emergency()
        {
            outgoing!(message_id = message.message_id(), success, %domain, "Ending emergency SMS");
            tracker.end_sms(message.message_id(), success, domain, true);
        }
    }

    pub fn on_received(&self) {
        if let Some(tracker) = &self.tracker {
            outgoing!("Emergency SMS received");
            tracker.on_emergency_sms_received();
        }
    }
}
