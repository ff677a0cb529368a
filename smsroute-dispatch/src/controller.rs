//! The dispatch controller: routes each message to a transport, asking the
//! domain selection resolver when one is installed.
//!
//! All state lives here and is only touched through `&mut self`. The
//! [`DispatchService`](crate::DispatchService) owns the controller and feeds
//! it [`Command`]s one at a time, which makes the whole state machine single
//! writer. Nothing in this module blocks: resolver futures run on their own
//! task and post their result back as a command.

use std::sync::Arc;

use serde::Serialize;
use smsroute_common::{Domain, ResultCode, SendResult, TrafficClass, incoming, internal, outgoing};
use smsroute_tracing::traced;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    command::{Command, ControllerSnapshot},
    config::DispatchConfig,
    emergency::{EmergencyCoordinator, EmergencyNumberClassifier, EmergencyStateTracker},
    error::{DispatchError, RejectReason, SelectionError},
    phone::{PhoneState, StorageMonitor},
    registrants::{Registrants, Subscription, SubscriptionId},
    selection::{
        ConnectionHolder, ConnectionId, DomainSelectionConnection, DomainSelectionResolver,
        PendingRequest, SelectionAttributes, SelectionCallback, SelectorType,
    },
    sequence::SequenceCounter,
    tracker::MessageTracker,
    transport::{OutcomeReporter, TransportDispatcher, TransportOutcome, Transports},
    types::{RequestKind, SendRequest},
};

/// Everything the controller talks to, injected at construction.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub transports: Transports,
    /// `None` when domain selection is not available on this device.
    pub resolver: Option<Arc<dyn DomainSelectionResolver>>,
    pub classifier: Arc<dyn EmergencyNumberClassifier>,
    pub emergency: Option<Arc<dyn EmergencyStateTracker>>,
    pub phone: Arc<dyn PhoneState>,
    pub storage: Arc<dyn StorageMonitor>,
}

/// Published to subscribers as the controller makes progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DispatchEvent {
    SelectionRequested {
        class: TrafficClass,
        connection: ConnectionId,
    },
    /// `domain` is `None` when the resolver answered with an error.
    SelectionCompleted {
        class: TrafficClass,
        connection: ConnectionId,
        domain: Option<Domain>,
    },
    SelectionTerminated {
        class: TrafficClass,
        connection: ConnectionId,
        cause: u32,
    },
    Dispatched {
        message_id: u64,
        message_ref: Option<u8>,
        domain: Domain,
    },
    FellBack {
        message_id: u64,
        message_ref: Option<u8>,
    },
    Completed {
        message_id: u64,
        result: SendResult,
    },
}

/// Checks made before a request is allowed into the state machine.
pub(crate) fn admit(
    request: &SendRequest,
    kind: RequestKind,
    storage: &dyn StorageMonitor,
) -> Result<(), DispatchError> {
    request.validate(kind)?;

    if !storage.is_storage_available() {
        return Err(RejectReason::StorageUnavailable.into());
    }

    Ok(())
}

#[derive(Debug)]
pub struct DispatchController {
    config: DispatchConfig,
    transports: Transports,
    resolver: Option<Arc<dyn DomainSelectionResolver>>,
    classifier: Arc<dyn EmergencyNumberClassifier>,
    phone: Arc<dyn PhoneState>,
    storage: Arc<dyn StorageMonitor>,
    emergency: EmergencyCoordinator,
    normal: ConnectionHolder,
    emergency_holder: ConnectionHolder,
    sequence: SequenceCounter,
    next_connection: u64,
    events: Registrants<DispatchEvent>,
    commands: mpsc::UnboundedSender<Command>,
}

impl DispatchController {
    /// `commands` is the queue this controller is fed from; completions of
    /// asynchronous work are posted back onto it.
    #[must_use]
    pub fn new(
        config: DispatchConfig,
        collaborators: Collaborators,
        commands: mpsc::UnboundedSender<Command>,
    ) -> Self {
        let sequence = SequenceCounter::new(config.message_ref_modulus);
        Self {
            config,
            transports: collaborators.transports,
            resolver: collaborators.resolver,
            classifier: collaborators.classifier,
            phone: collaborators.phone,
            storage: collaborators.storage,
            emergency: EmergencyCoordinator::new(collaborators.emergency),
            normal: ConnectionHolder::new(TrafficClass::Normal),
            emergency_holder: ConnectionHolder::new(TrafficClass::Emergency),
            sequence,
            next_connection: 0,
            events: Registrants::new(),
            commands,
        }
    }

    /// Replace the message reference counter, e.g. to resume from a
    /// persisted value.
    #[must_use]
    pub fn with_sequence(mut self, sequence: SequenceCounter) -> Self {
        self.sequence = sequence;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    #[must_use]
    pub const fn holder(&self, class: TrafficClass) -> &ConnectionHolder {
        match class {
            TrafficClass::Normal => &self.normal,
            TrafficClass::Emergency => &self.emergency_holder,
        }
    }

    const fn holder_mut(&mut self, class: TrafficClass) -> &mut ConnectionHolder {
        match class {
            TrafficClass::Normal => &mut self.normal,
            TrafficClass::Emergency => &mut self.emergency_holder,
        }
    }

    #[must_use]
    pub const fn sequence(&self) -> &SequenceCounter {
        &self.sequence
    }

    #[must_use]
    pub const fn is_domain_selection_supported(&self) -> bool {
        self.config.domain_selection_enabled && self.resolver.is_some()
    }

    /// Send a single text message.
    ///
    /// # Errors
    ///
    /// Only for requests rejected before dispatch. Transport failures are
    /// delivered to the request's sent callback.
    #[traced(level = DEBUG)]
    pub fn send_text(&mut self, request: SendRequest) -> Result<(), DispatchError> {
        self.submit(RequestKind::Text, request)
    }

    /// Send a binary message to an application port.
    ///
    /// # Errors
    ///
    /// See [`Self::send_text`].
    #[traced(level = DEBUG)]
    pub fn send_data(&mut self, request: SendRequest) -> Result<(), DispatchError> {
        self.submit(RequestKind::Data, request)
    }

    /// Send an ordered list of text parts as one logical message.
    ///
    /// # Errors
    ///
    /// See [`Self::send_text`].
    #[traced(level = DEBUG)]
    pub fn send_multipart_text(&mut self, request: SendRequest) -> Result<(), DispatchError> {
        self.submit(RequestKind::MultipartText, request)
    }

    fn submit(&mut self, kind: RequestKind, request: SendRequest) -> Result<(), DispatchError> {
        admit(&request, kind, &*self.storage)?;
        self.accept(kind, request);
        Ok(())
    }

    /// Build the tracker for an admitted request and route it.
    fn accept(&mut self, kind: RequestKind, request: SendRequest) {
        let emergency = self.classifier.is_emergency_number(&request.destination);
        let tracker = MessageTracker::new(request, emergency);
        internal!(
            message_id = tracker.message_id(),
            class = %tracker.traffic_class(),
            ?kind,
            "Accepted request"
        );

        self.route(kind, tracker);
    }

    /// Re-dispatch an existing tracker, keeping its message reference.
    ///
    /// A tracker that has already been handed to IMS goes straight to CS
    /// without consulting the resolver.
    #[traced(level = DEBUG)]
    pub fn send_retry(&mut self, tracker: MessageTracker) {
        if !tracker.payload().is_well_formed() {
            warn!(
                message_id = tracker.message_id(),
                "Retry with malformed payload, failing without dispatch"
            );
            let domain = tracker.last_domain();
            self.complete(tracker, SendResult::Failed(ResultCode::SendRetryFailed), domain);
            return;
        }

        if tracker.uses_ims_service_for_ims() {
            debug!(
                message_id = tracker.message_id(),
                "Message already used IMS, retrying over CS"
            );
            let cs = Arc::clone(self.cs_dispatcher());
            self.dispatch(&cs, tracker);
            return;
        }

        self.route(RequestKind::Retry, tracker);
    }

    fn route(&mut self, kind: RequestKind, tracker: MessageTracker) {
        if !self.is_domain_selection_supported() {
            self.dispatch_direct(tracker);
            return;
        }

        let class = tracker.traffic_class();
        if self.holder(class).is_domain_selection_requested() {
            internal!(
                message_id = tracker.message_id(),
                %class,
                queued = self.holder(class).pending_requests().len() + 1,
                "Queued behind outstanding domain selection"
            );
            self.holder_mut(class)
                .enqueue(PendingRequest::new(kind, tracker));
            return;
        }

        let connection = self
            .resolver
            .as_ref()
            .and_then(|resolver| resolver.get_connection(SelectorType::Sms, class.is_emergency()));
        let Some(connection) = connection else {
            debug!(
                message_id = tracker.message_id(),
                %class,
                "Resolver has no connection, dispatching directly"
            );
            self.dispatch_direct(tracker);
            return;
        };

        self.request_selection(class, connection, PendingRequest::new(kind, tracker));
    }

    fn request_selection(
        &mut self,
        class: TrafficClass,
        connection: Box<dyn DomainSelectionConnection>,
        first: PendingRequest,
    ) {
        self.next_connection += 1;
        let id = ConnectionId::new(self.next_connection);
        let attributes = SelectionAttributes {
            selector_type: SelectorType::Sms,
            is_emergency: class.is_emergency(),
            destination: first.tracker.destination().to_string(),
            message_id: first.tracker.message_id(),
        };
        let callback = SelectionCallback::new(self.commands.clone(), class, id);

        outgoing!(%class, connection = %id, message_id = attributes.message_id, "Requesting domain selection");
        let holder = self.holder_mut(class);
        holder.set_connection(id, connection);
        holder.enqueue(first);
        let future = holder
            .connection_mut()
            .and_then(|connection| connection.request_domain_selection(attributes, callback));

        let Some(future) = future else {
            warn!(%class, connection = %id, "Domain selection request was not issued, dispatching directly");
            let holder = self.holder_mut(class);
            holder.finish();
            let pending = holder.take_pending();
            holder.clear();
            for request in pending {
                self.dispatch_direct(request.tracker);
            }
            return;
        };

        self.events.notify(DispatchEvent::SelectionRequested {
            class,
            connection: id,
        });

        let commands = self.commands.clone();
        let waiter = tokio::spawn(async move {
            let result = future.await;
            let command = Command::SelectionCompleted {
                class,
                connection: id,
                result,
            };
            if commands.send(command).is_err() {
                warn!(connection = %id, "Dispatch controller is gone, selection result dropped");
            }
        });
        self.holder_mut(class).set_waiter(waiter.abort_handle());
    }

    /// The resolver's decision for `connection` arrived. The whole queue for
    /// the class is dispatched in enqueue order before anything else runs.
    #[traced(level = DEBUG)]
    pub fn on_domain_selected(
        &mut self,
        class: TrafficClass,
        connection: ConnectionId,
        result: Result<Domain, SelectionError>,
    ) {
        if !self.holder(class).is_current(connection) {
            debug!(%class, %connection, "Ignoring completion for a stale connection");
            return;
        }

        let domain = match result {
            Ok(domain) => {
                incoming!(%class, %connection, %domain, "Domain selected");
                Some(domain)
            }
            Err(err) => {
                warn!(%class, %connection, "Domain selection failed, using default transport: {err}");
                None
            }
        };

        self.events.notify(DispatchEvent::SelectionCompleted {
            class,
            connection,
            domain,
        });

        let pending = self.holder_mut(class).take_pending();
        for request in pending {
            match domain {
                Some(domain) => {
                    let dispatcher = Arc::clone(self.dispatcher_for(domain));
                    self.dispatch(&dispatcher, request.tracker);
                }
                None => self.dispatch_default(request.tracker),
            }
        }

        let holder = self.holder_mut(class);
        holder.finish();
        holder.clear();
    }

    /// The resolver aborted `connection`. Queued requests go to the default
    /// transport and the connection is dropped without being finished.
    #[traced(level = DEBUG)]
    pub fn on_selection_terminated(&mut self, class: TrafficClass, connection: ConnectionId, cause: u32) {
        if !self.holder(class).is_current(connection) {
            debug!(%class, %connection, "Ignoring termination for a stale connection");
            return;
        }

        self.events.notify(DispatchEvent::SelectionTerminated {
            class,
            connection,
            cause,
        });

        let pending = self.holder_mut(class).take_pending();
        for request in pending {
            self.dispatch_default(request.tracker);
        }

        self.holder_mut(class).clear();
    }

    /// A transport finished with a tracker.
    #[traced(level = DEBUG)]
    pub fn on_send_outcome(&mut self, tracker: MessageTracker, domain: Domain, outcome: TransportOutcome) {
        match outcome {
            TransportOutcome::Sent => {
                let message_ref = tracker.message_ref();
                self.complete(tracker, SendResult::Sent { message_ref }, Some(domain));
            }
            TransportOutcome::Failed(code) => {
                self.complete(tracker, SendResult::Failed(code), Some(domain));
            }
            TransportOutcome::Fallback if domain.is_ps() => {
                internal!(
                    message_id = tracker.message_id(),
                    message_ref = ?tracker.message_ref(),
                    retry = tracker.retry_count(),
                    "Falling back to CS"
                );
                self.events.notify(DispatchEvent::FellBack {
                    message_id: tracker.message_id(),
                    message_ref: tracker.message_ref(),
                });
                let cs = Arc::clone(self.cs_dispatcher());
                self.dispatch(&cs, tracker);
            }
            TransportOutcome::Fallback => {
                warn!(
                    message_id = tracker.message_id(),
                    %domain,
                    "Fallback requested by a non-PS transport"
                );
                self.complete(tracker, SendResult::Failed(ResultCode::GenericFailure), Some(domain));
            }
            TransportOutcome::RetryRequested => self.send_retry(tracker),
        }
    }

    /// An SMS was received from `originating_address`.
    pub fn on_inbound_sms(&mut self, originating_address: &str) {
        if self.classifier.is_emergency_number(originating_address) {
            self.emergency.on_received();
        }
    }

    /// Use `resolver` for connections opened from now on. A connection that
    /// is already selecting keeps running against the resolver it came from.
    pub fn install_resolver(&mut self, resolver: Option<Arc<dyn DomainSelectionResolver>>) {
        internal!(
            level = DEBUG,
            installed = resolver.is_some(),
            "Installing domain selection resolver"
        );
        self.resolver = resolver;
    }

    pub fn subscribe(&mut self) -> Subscription<DispatchEvent> {
        self.events.subscribe()
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    #[must_use]
    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            domain_selection_supported: self.is_domain_selection_supported(),
            normal_pending: self.normal.pending_requests().len(),
            emergency_pending: self.emergency_holder.pending_requests().len(),
            normal_selecting: self.normal.is_domain_selection_requested(),
            emergency_selecting: self.emergency_holder.is_domain_selection_requested(),
            next_message_ref: self.sequence.peek(),
        }
    }

    /// Apply one command. This is the only entry point the service uses.
    pub fn handle(&mut self, command: Command) {
        match command {
            Command::Submit { kind, request } => self.accept(kind, request),
            Command::Retry(tracker) => self.send_retry(tracker),
            Command::SelectionCompleted {
                class,
                connection,
                result,
            } => self.on_domain_selected(class, connection, result),
            Command::SelectionTerminated {
                class,
                connection,
                cause,
            } => self.on_selection_terminated(class, connection, cause),
            Command::Outcome {
                tracker,
                domain,
                outcome,
            } => self.on_send_outcome(tracker, domain, outcome),
            Command::InboundSms {
                originating_address,
            } => self.on_inbound_sms(&originating_address),
            Command::InstallResolver(resolver) => self.install_resolver(resolver),
            Command::Subscribe(reply) => {
                if reply.send(self.subscribe()).is_err() {
                    debug!("Subscriber went away before its subscription was ready");
                }
            }
            Command::Unsubscribe(id) => {
                self.unsubscribe(id);
            }
            Command::Snapshot(reply) => {
                if reply.send(self.snapshot()).is_err() {
                    debug!("Snapshot requester went away before the reply");
                }
            }
        }
    }

    fn cs_dispatcher(&self) -> &Arc<dyn TransportDispatcher> {
        self.transports.cs_for(self.phone.voice_format())
    }

    fn dispatcher_for(&self, domain: Domain) -> &Arc<dyn TransportDispatcher> {
        match domain {
            Domain::Ps => &self.transports.ps,
            Domain::Cs => self.cs_dispatcher(),
        }
    }

    /// Used when domain selection is unsupported or no connection could be
    /// made: PS when it is available, CS otherwise.
    fn dispatch_direct(&mut self, tracker: MessageTracker) {
        let dispatcher = if self.transports.ps.is_available() {
            Arc::clone(&self.transports.ps)
        } else {
            Arc::clone(self.cs_dispatcher())
        };
        self.dispatch(&dispatcher, tracker);
    }

    /// Used when a selection ended without a usable domain. Emergency
    /// traffic only goes over PS when PS supports emergency SMS to the
    /// destination.
    fn dispatch_default(&mut self, tracker: MessageTracker) {
        let ps = &self.transports.ps;
        let use_ps = if tracker.is_emergency() {
            ps.is_emergency_sms_support(tracker.destination())
        } else {
            ps.is_available()
        };

        let dispatcher = if use_ps {
            Arc::clone(ps)
        } else {
            Arc::clone(self.cs_dispatcher())
        };
        self.dispatch(&dispatcher, tracker);
    }

    fn dispatch(&mut self, dispatcher: &Arc<dyn TransportDispatcher>, mut tracker: MessageTracker) {
        let domain = dispatcher.domain();

        if dispatcher.is_message_ref_increment_via_telephony() && tracker.message_ref().is_none() {
            tracker.assign_message_ref(self.sequence.next());
        }

        if tracker.is_first_dispatch() {
            self.emergency.start(&tracker, domain);
        }
        tracker.record_dispatch(domain);

        outgoing!(
            message_id = tracker.message_id(),
            message_ref = ?tracker.message_ref(),
            %domain,
            format = %dispatcher.format(),
            retry = tracker.retry_count(),
            "Dispatching"
        );
        self.events.notify(DispatchEvent::Dispatched {
            message_id: tracker.message_id(),
            message_ref: tracker.message_ref(),
            domain,
        });

        dispatcher.send(tracker, OutcomeReporter::new(self.commands.clone(), domain));
    }

    fn complete(&mut self, tracker: MessageTracker, result: SendResult, domain: Option<Domain>) {
        let message_id = tracker.message_id();
        internal!(level = DEBUG, message_id, ?result, "Message complete");

        if let Some(domain) = domain {
            self.emergency.end(&tracker, result.is_success(), domain);
        }
        self.events.notify(DispatchEvent::Completed { message_id, result });
        tracker.complete(result);
    }
}
