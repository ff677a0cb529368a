//! Runs a [`DispatchController`] on its own task and gives callers a
//! cloneable handle to it.

use std::sync::Arc;

use smsroute_common::{Signal, internal};
use smsroute_tracing::traced;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::{
    command::{Command, ControllerSnapshot},
    config::DispatchConfig,
    controller::{Collaborators, DispatchController, DispatchEvent, admit},
    error::{DispatchError, SystemError},
    phone::StorageMonitor,
    registrants::{Subscription, SubscriptionId},
    selection::DomainSelectionResolver,
    tracker::MessageTracker,
    types::{RequestKind, SendRequest},
};

/// Owns the controller and applies commands to it strictly in arrival order.
#[derive(Debug)]
pub struct DispatchService {
    controller: DispatchController,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl DispatchService {
    #[must_use]
    pub fn new(config: DispatchConfig, collaborators: Collaborators) -> (Self, DispatchHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = DispatchHandle {
            commands: sender.clone(),
            storage: Arc::clone(&collaborators.storage),
        };
        let controller = DispatchController::new(config, collaborators, sender);

        (
            Self {
                controller,
                commands: receiver,
            },
            handle,
        )
    }

    #[must_use]
    pub const fn controller(&self) -> &DispatchController {
        &self.controller
    }

    /// Process commands until a shutdown signal arrives.
    ///
    /// Requests still waiting on a domain decision at shutdown are dropped,
    /// their senders observe a closed callback.
    #[traced]
    pub async fn serve(mut self, mut shutdown: broadcast::Receiver<Signal>) {
        internal!("Dispatch service starting");

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    // The controller keeps a sender alive, so this never yields `None`
                    // while the service is running.
                    let Some(command) = command else {
                        break;
                    };
                    self.controller.handle(command);
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!("Dispatch service received shutdown signal");
                            break;
                        }
                        Err(e) => {
                            tracing::error!("Dispatch service shutdown channel error: {e}");
                            break;
                        }
                    }
                }
            }
        }

        let snapshot = self.controller.snapshot();
        if snapshot.normal_pending + snapshot.emergency_pending > 0 {
            tracing::warn!(
                normal = snapshot.normal_pending,
                emergency = snapshot.emergency_pending,
                "Dispatch service stopped with requests awaiting domain selection"
            );
        }

        internal!("Dispatch service shutdown complete");
    }
}

/// Caller facing entry points. Validation and the storage check happen on
/// the caller's side; everything else is posted to the service.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    commands: mpsc::UnboundedSender<Command>,
    storage: Arc<dyn StorageMonitor>,
}

impl DispatchHandle {
    /// # Errors
    ///
    /// Rejected requests, or [`SystemError::ServiceUnavailable`] once the
    /// service has stopped.
    pub fn send_text(&self, request: SendRequest) -> Result<(), DispatchError> {
        self.submit(RequestKind::Text, request)
    }

    /// # Errors
    ///
    /// See [`Self::send_text`].
    pub fn send_data(&self, request: SendRequest) -> Result<(), DispatchError> {
        self.submit(RequestKind::Data, request)
    }

    /// # Errors
    ///
    /// See [`Self::send_text`].
    pub fn send_multipart_text(&self, request: SendRequest) -> Result<(), DispatchError> {
        self.submit(RequestKind::MultipartText, request)
    }

    /// # Errors
    ///
    /// [`SystemError::ServiceUnavailable`] once the service has stopped.
    pub fn send_retry(&self, tracker: MessageTracker) -> Result<(), DispatchError> {
        self.post(Command::Retry(tracker))
    }

    /// # Errors
    ///
    /// [`SystemError::ServiceUnavailable`] once the service has stopped.
    pub fn report_inbound_sms(&self, originating_address: impl Into<String>) -> Result<(), DispatchError> {
        self.post(Command::InboundSms {
            originating_address: originating_address.into(),
        })
    }

    /// # Errors
    ///
    /// [`SystemError::ServiceUnavailable`] once the service has stopped.
    pub fn install_resolver(
        &self,
        resolver: Option<Arc<dyn DomainSelectionResolver>>,
    ) -> Result<(), DispatchError> {
        self.post(Command::InstallResolver(resolver))
    }

    /// # Errors
    ///
    /// [`SystemError::ServiceUnavailable`] once the service has stopped.
    pub async fn subscribe(&self) -> Result<Subscription<DispatchEvent>, DispatchError> {
        let (reply, subscription) = oneshot::channel();
        self.post(Command::Subscribe(reply))?;
        subscription.await.map_err(|_| unavailable())
    }

    /// # Errors
    ///
    /// [`SystemError::ServiceUnavailable`] once the service has stopped.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), DispatchError> {
        self.post(Command::Unsubscribe(id))
    }

    /// # Errors
    ///
    /// [`SystemError::ServiceUnavailable`] once the service has stopped.
    pub async fn snapshot(&self) -> Result<ControllerSnapshot, DispatchError> {
        let (reply, snapshot) = oneshot::channel();
        self.post(Command::Snapshot(reply))?;
        snapshot.await.map_err(|_| unavailable())
    }

    fn submit(&self, kind: RequestKind, request: SendRequest) -> Result<(), DispatchError> {
        admit(&request, kind, &*self.storage)?;
        self.post(Command::Submit { kind, request })
    }

    fn post(&self, command: Command) -> Result<(), DispatchError> {
        self.commands.send(command).map_err(|_| unavailable())
    }
}

fn unavailable() -> DispatchError {
    SystemError::ServiceUnavailable("dispatch service has stopped".to_string()).into()
}
