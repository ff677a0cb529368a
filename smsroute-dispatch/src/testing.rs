//! Recording collaborators for exercising the controller without a modem,
//! an IMS stack, or a real resolver.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use futures_util::FutureExt;
use parking_lot::Mutex;
use smsroute_common::{Domain, SmsFormat};
use tokio::sync::{Notify, oneshot};

use crate::{
    emergency::{EmergencyStartFuture, EmergencyStateTracker},
    error::{EmergencyError, SelectionError},
    phone::StorageMonitor,
    selection::{
        DomainSelectionConnection, DomainSelectionResolver, SelectionAttributes, SelectionCallback,
        SelectionFuture, SelectorType,
    },
    tracker::MessageTracker,
    transport::{OutcomeReporter, TransportDispatcher, TransportOutcome},
};

/// What a [`RecordingDispatcher`] saw for one `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRecord {
    pub message_id: u64,
    pub destination: String,
    pub message_ref: Option<u8>,
    pub retry_count: u32,
    pub emergency: bool,
}

/// A tracker handed to a [`RecordingDispatcher`] that is waiting for the
/// test to decide its outcome.
#[derive(Debug)]
pub struct HeldSend {
    pub tracker: MessageTracker,
    reporter: OutcomeReporter,
}

impl HeldSend {
    pub fn report(self, outcome: TransportOutcome) {
        self.reporter.report(self.tracker, outcome);
    }
}

/// Dispatcher that records every send. Outcomes are either scripted up
/// front with [`Self::respond_with`] or reported later through
/// [`Self::take_held`].
#[derive(Debug)]
pub struct RecordingDispatcher {
    domain: Domain,
    format: SmsFormat,
    available: AtomicBool,
    emergency_support: AtomicBool,
    ref_via_telephony: bool,
    script: Mutex<VecDeque<TransportOutcome>>,
    log: Mutex<Vec<SentRecord>>,
    held: Mutex<Vec<HeldSend>>,
    sent: Notify,
}

impl RecordingDispatcher {
    #[must_use]
    pub fn new(domain: Domain, format: SmsFormat) -> Self {
        Self {
            domain,
            format,
            available: AtomicBool::new(true),
            emergency_support: AtomicBool::new(false),
            ref_via_telephony: true,
            script: Mutex::default(),
            log: Mutex::default(),
            held: Mutex::default(),
            sent: Notify::new(),
        }
    }

    #[must_use]
    pub fn ps() -> Self {
        Self::new(Domain::Ps, SmsFormat::ThreeGpp)
    }

    #[must_use]
    pub fn cs(format: SmsFormat) -> Self {
        Self::new(Domain::Cs, format)
    }

    /// The transport assigns message references itself.
    #[must_use]
    pub fn with_own_message_refs(mut self) -> Self {
        self.ref_via_telephony = false;
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_emergency_support(&self, supported: bool) {
        self.emergency_support.store(supported, Ordering::SeqCst);
    }

    /// Answer the next sends with `outcomes`, in order.
    pub fn respond_with(&self, outcomes: impl IntoIterator<Item = TransportOutcome>) {
        self.script.lock().extend(outcomes);
    }

    #[must_use]
    pub fn records(&self) -> Vec<SentRecord> {
        self.log.lock().clone()
    }

    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.log.lock().len()
    }

    /// Sends that have not been answered yet, oldest first.
    pub fn take_held(&self) -> Vec<HeldSend> {
        std::mem::take(&mut *self.held.lock())
    }

    /// Resolves once at least `count` sends have been recorded.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.sent.notified();
            if self.sent_count() >= count {
                return;
            }
            notified.await;
        }
    }
}

impl TransportDispatcher for RecordingDispatcher {
    fn domain(&self) -> Domain {
        self.domain
    }

    fn format(&self) -> SmsFormat {
        self.format
    }

    fn send(&self, mut tracker: MessageTracker, reporter: OutcomeReporter) {
        if !self.ref_via_telephony && tracker.message_ref().is_none() {
            let next = u8::try_from(self.sent_count() % 256).unwrap_or_default();
            tracker.assign_message_ref(next.wrapping_add(100));
        }

        self.log.lock().push(SentRecord {
            message_id: tracker.message_id(),
            destination: tracker.destination().to_string(),
            message_ref: tracker.message_ref(),
            retry_count: tracker.retry_count(),
            emergency: tracker.is_emergency(),
        });

        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(outcome) => reporter.report(tracker, outcome),
            None => self.held.lock().push(HeldSend { tracker, reporter }),
        }

        self.sent.notify_waiters();
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn is_emergency_sms_support(&self, _destination: &str) -> bool {
        self.emergency_support.load(Ordering::SeqCst)
    }

    fn is_message_ref_increment_via_telephony(&self) -> bool {
        self.ref_via_telephony
    }
}

/// How a [`MockResolver`] answers `get_connection`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Hand out connections whose futures the test completes.
    #[default]
    Pending,
    /// Refuse to construct a connection.
    NoConnection,
    /// Hand out connections that refuse to issue a request.
    NoFuture,
}

/// The test's side of one [`MockResolver`] connection.
#[derive(Debug, Default)]
pub struct ConnectionProbe {
    requests: Mutex<Vec<SelectionAttributes>>,
    finished: AtomicUsize,
    answer: Mutex<Option<oneshot::Sender<Result<Domain, SelectionError>>>>,
    callback: Mutex<Option<SelectionCallback>>,
}

impl ConnectionProbe {
    /// Resolve the outstanding request. Returns `false` if there is none.
    pub fn complete(&self, domain: Domain) -> bool {
        self.answer(Ok(domain))
    }

    pub fn fail(&self, error: SelectionError) -> bool {
        self.answer(Err(error))
    }

    fn answer(&self, result: Result<Domain, SelectionError>) -> bool {
        self.answer
            .lock()
            .take()
            .is_some_and(|answer| answer.send(result).is_ok())
    }

    /// Abort through the termination callback. The request's future is
    /// left unresolved.
    pub fn terminate(&self, cause: u32) -> bool {
        let Some(callback) = self.callback.lock().clone() else {
            return false;
        };
        callback.on_selection_terminated(cause);
        true
    }

    /// Whether something is still waiting on the outstanding request.
    #[must_use]
    pub fn is_awaited(&self) -> bool {
        self.answer
            .lock()
            .as_ref()
            .is_some_and(|answer| !answer.is_closed())
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    #[must_use]
    pub fn requests(&self) -> Vec<SelectionAttributes> {
        self.requests.lock().clone()
    }

    #[must_use]
    pub fn finish_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct MockConnection {
    probe: Arc<ConnectionProbe>,
    issue_future: bool,
}

impl DomainSelectionConnection for MockConnection {
    fn request_domain_selection(
        &mut self,
        attributes: SelectionAttributes,
        callback: SelectionCallback,
    ) -> Option<SelectionFuture> {
        self.probe.requests.lock().push(attributes);
        *self.probe.callback.lock() = Some(callback);
        if !self.issue_future {
            return None;
        }

        let (answer, result) = oneshot::channel();
        *self.probe.answer.lock() = Some(answer);
        Some(
            result
                .map(|result| result.unwrap_or(Err(SelectionError::Abandoned)))
                .boxed(),
        )
    }

    fn finish_selection(&mut self) {
        self.probe.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// Resolver that hands out [`ConnectionProbe`]-backed connections.
#[derive(Debug, Default)]
pub struct MockResolver {
    mode: Mutex<ConnectionMode>,
    get_connection_calls: Mutex<Vec<(SelectorType, bool)>>,
    connections: Mutex<Vec<Arc<ConnectionProbe>>>,
}

impl MockResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&self, mode: ConnectionMode) {
        *self.mode.lock() = mode;
    }

    #[must_use]
    pub fn get_connection_calls(&self) -> usize {
        self.get_connection_calls.lock().len()
    }

    /// Every connection handed out so far, oldest first.
    #[must_use]
    pub fn connections(&self) -> Vec<Arc<ConnectionProbe>> {
        self.connections.lock().clone()
    }

    #[must_use]
    pub fn connection(&self, index: usize) -> Option<Arc<ConnectionProbe>> {
        self.connections.lock().get(index).cloned()
    }

    #[must_use]
    pub fn latest(&self) -> Option<Arc<ConnectionProbe>> {
        self.connections.lock().last().cloned()
    }

    /// `request_domain_selection` calls across all connections.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.connections
            .lock()
            .iter()
            .map(|probe| probe.request_count())
            .sum()
    }
}

impl DomainSelectionResolver for MockResolver {
    fn get_connection(
        &self,
        selector_type: SelectorType,
        is_emergency: bool,
    ) -> Option<Box<dyn DomainSelectionConnection>> {
        self.get_connection_calls
            .lock()
            .push((selector_type, is_emergency));

        let mode = *self.mode.lock();
        if mode == ConnectionMode::NoConnection {
            return None;
        }

        let probe = Arc::new(ConnectionProbe::default());
        self.connections.lock().push(Arc::clone(&probe));
        Some(Box::new(MockConnection {
            probe,
            issue_future: mode == ConnectionMode::Pending,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndedSms {
    pub message_id: u64,
    pub success: bool,
    pub domain: Domain,
    pub is_last_part: bool,
}

#[derive(Debug, Default)]
pub struct MockEmergencyTracker {
    started: Mutex<Vec<(String, bool)>>,
    ended: Mutex<Vec<EndedSms>>,
    received: AtomicUsize,
    reject_start: Mutex<Option<u32>>,
}

impl MockEmergencyTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_start_with(&self, cause: u32) {
        *self.reject_start.lock() = Some(cause);
    }

    /// `(destination, is_over_ims)` per start.
    #[must_use]
    pub fn started(&self) -> Vec<(String, bool)> {
        self.started.lock().clone()
    }

    #[must_use]
    pub fn ended(&self) -> Vec<EndedSms> {
        self.ended.lock().clone()
    }

    #[must_use]
    pub fn received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }
}

impl EmergencyStateTracker for MockEmergencyTracker {
    fn start_emergency_sms(&self, destination: &str, is_over_ims: bool) -> EmergencyStartFuture {
        self.started
            .lock()
            .push((destination.to_string(), is_over_ims));

        let result = match *self.reject_start.lock() {
            Some(cause) => Err(EmergencyError::Rejected(cause)),
            None => Ok(()),
        };
        futures_util::future::ready(result).boxed()
    }

    fn end_sms(&self, message_id: u64, success: bool, domain: Domain, is_last_part: bool) {
        self.ended.lock().push(EndedSms {
            message_id,
            success,
            domain,
            is_last_part,
        });
    }

    fn on_emergency_sms_received(&self) {
        self.received.fetch_add(1, Ordering::SeqCst);
    }
}

/// Storage monitor the test can flip.
#[derive(Debug)]
pub struct SwitchableStorage(AtomicBool);

impl Default for SwitchableStorage {
    fn default() -> Self {
        Self(AtomicBool::new(true))
    }
}

impl SwitchableStorage {
    pub fn set_available(&self, available: bool) {
        self.0.store(available, Ordering::SeqCst);
    }
}

impl StorageMonitor for SwitchableStorage {
    fn is_storage_available(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
