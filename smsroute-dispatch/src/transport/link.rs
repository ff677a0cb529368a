//! Dispatcher backed by an asynchronous link: the IMS stack for PS, the
//! modem HAL for CS.
//!
//! PS links may ask for a retry or a fallback. A retry is honoured over PS
//! until the tracker has used up `max_retries`, after which it is surfaced
//! as a fallback so the controller moves the tracker to CS. CS retries are
//! handed back to the controller's retry path after the configured delay.

use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smsroute_common::{Domain, ResultCode, SmsFormat, outgoing};

use super::{OutcomeReporter, TransportDispatcher, TransportOutcome};
use crate::{
    config::DispatchConfig,
    sequence::SequenceCounter,
    tracker::{DeliveryCallback, MessageTracker},
    types::Payload,
};

/// What a link reports back for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkResponse {
    Accepted,
    /// Permanent failure.
    Rejected(ResultCode),
    /// Transient failure; the same message may be submitted again.
    Retry(ResultCode),
    /// PS only: the network wants this message over CS.
    Fallback,
}

/// Everything the link needs to encode and submit one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub destination: String,
    pub service_center: Option<String>,
    pub payload: Payload,
    pub message_ref: Option<u8>,
    /// Sets the TP-RD (reject duplicates) flag on the wire.
    pub is_retry: bool,
    pub is_emergency: bool,
    pub format: SmsFormat,
    pub priority: Option<u8>,
    pub validity_period_mins: Option<u32>,
    pub expect_more: bool,
}

impl Submission {
    fn from_tracker(tracker: &MessageTracker, format: SmsFormat) -> Self {
        let options = tracker.options();
        Self {
            destination: tracker.destination().to_string(),
            service_center: tracker.service_center().map(str::to_string),
            payload: tracker.payload().clone(),
            message_ref: tracker.message_ref(),
            is_retry: tracker.retry_count() > 0,
            is_emergency: tracker.is_emergency(),
            format,
            priority: options.priority,
            validity_period_mins: options.validity_period_mins,
            expect_more: options.expect_more,
        }
    }
}

/// The transport-specific layer below a dispatcher.
#[async_trait]
pub trait SmsLink: Send + Sync + Debug + 'static {
    async fn submit(&self, submission: Submission) -> LinkResponse;

    fn is_available(&self) -> bool {
        true
    }

    fn is_emergency_sms_support(&self, _destination: &str) -> bool {
        false
    }

    /// Hand over the sender's status report callback for an accepted message.
    fn register_status_report(&self, _message_ref: u8, _callback: DeliveryCallback) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkRetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl LinkRetryPolicy {
    #[must_use]
    pub const fn ims(config: &DispatchConfig) -> Self {
        Self {
            max_retries: config.max_ims_retries,
            retry_delay: config.ims_retry_delay(),
        }
    }

    #[must_use]
    pub const fn cs(config: &DispatchConfig) -> Self {
        Self {
            max_retries: config.max_cs_retries,
            retry_delay: config.cs_retry_delay(),
        }
    }

    /// Whether a tracker with `retry_count` prior retries may be retried again.
    #[must_use]
    pub const fn allows(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }
}

#[derive(Debug)]
pub struct LinkDispatcher<L> {
    link: Arc<L>,
    domain: Domain,
    format: SmsFormat,
    policy: LinkRetryPolicy,
    own_refs: Option<Mutex<SequenceCounter>>,
}

impl<L: SmsLink> LinkDispatcher<L> {
    #[must_use]
    pub fn ims(link: Arc<L>, format: SmsFormat, config: &DispatchConfig) -> Self {
        Self::new(link, Domain::Ps, format, LinkRetryPolicy::ims(config))
    }

    #[must_use]
    pub fn cs(link: Arc<L>, format: SmsFormat, config: &DispatchConfig) -> Self {
        Self::new(link, Domain::Cs, format, LinkRetryPolicy::cs(config))
    }

    #[must_use]
    pub const fn new(link: Arc<L>, domain: Domain, format: SmsFormat, policy: LinkRetryPolicy) -> Self {
        Self {
            link,
            domain,
            format,
            policy,
            own_refs: None,
        }
    }

    /// Assign message references from this transport's own counter rather
    /// than the controller's.
    #[must_use]
    pub fn with_own_message_refs(mut self, counter: SequenceCounter) -> Self {
        self.own_refs = Some(Mutex::new(counter));
        self
    }

    #[must_use]
    pub const fn link(&self) -> &Arc<L> {
        &self.link
    }
}

impl<L: SmsLink> TransportDispatcher for LinkDispatcher<L> {
    fn domain(&self) -> Domain {
        self.domain
    }

    fn format(&self) -> SmsFormat {
        self.format
    }

    fn send(&self, mut tracker: MessageTracker, reporter: OutcomeReporter) {
        if let Some(refs) = &self.own_refs
            && tracker.message_ref().is_none()
        {
            let message_ref = refs.lock().next();
            tracker.assign_message_ref(message_ref);
        }

        let link = Arc::clone(&self.link);
        let (domain, format, policy) = (self.domain, self.format, self.policy);
        tokio::spawn(async move {
            let (tracker, outcome) = drive(&*link, domain, format, policy, tracker).await;
            reporter.report(tracker, outcome);
        });
    }

    fn is_available(&self) -> bool {
        self.link.is_available()
    }

    fn is_emergency_sms_support(&self, destination: &str) -> bool {
        self.link.is_emergency_sms_support(destination)
    }

    fn is_message_ref_increment_via_telephony(&self) -> bool {
        self.own_refs.is_none()
    }
}

async fn drive<L: SmsLink>(
    link: &L,
    domain: Domain,
    format: SmsFormat,
    policy: LinkRetryPolicy,
    mut tracker: MessageTracker,
) -> (MessageTracker, TransportOutcome) {
    loop {
        let submission = Submission::from_tracker(&tracker, format);
        outgoing!(
            message_id = tracker.message_id(),
            message_ref = ?submission.message_ref,
            %domain,
            retry = tracker.retry_count(),
            "Submitting to link"
        );

        let outcome = match link.submit(submission).await {
            LinkResponse::Accepted => {
                if let Some(message_ref) = tracker.message_ref()
                    && let Some(callback) = tracker.take_delivery_callback()
                {
                    link.register_status_report(message_ref, callback);
                }
                TransportOutcome::Sent
            }
            LinkResponse::Rejected(code) => TransportOutcome::Failed(code),
            LinkResponse::Fallback if domain.is_ps() => {
                if policy.allows(tracker.retry_count()) {
                    tracker.increment_retry();
                }
                TransportOutcome::Fallback
            }
            LinkResponse::Fallback => TransportOutcome::Failed(ResultCode::GenericFailure),
            LinkResponse::Retry(code) => {
                if !policy.allows(tracker.retry_count()) {
                    if domain.is_ps() {
                        TransportOutcome::Fallback
                    } else {
                        TransportOutcome::Failed(code)
                    }
                } else {
                    tracker.increment_retry();
                    tokio::time::sleep(policy.retry_delay).await;
                    if domain.is_ps() {
                        continue;
                    }
                    TransportOutcome::RetryRequested
                }
            }
        };

        return (tracker, outcome);
    }
}
