use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use smsroute_common::{Domain, SendResult, Signal, SmsFormat, internal};
use smsroute_dispatch::{
    Collaborators, DispatchHandle, DispatchService, Payload, SendRequest, SequenceCounter,
    StaticPhoneState, UnlimitedStorage,
    emergency::StaticClassifier,
    selection::DomainSelectionResolver,
    transport::{LinkDispatcher, TransportDispatcher, Transports},
};
use smsroute_tracing::traced;
use tokio::sync::broadcast;

use crate::{
    config::{ConfigError, LinkScript, MessageScript, SimulatorConfig},
    link::SimulatedLink,
    resolver::ScriptedResolver,
};

/// How a configured message ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Resolution {
    /// Refused at the entry point, never queued.
    Rejected(String),
    Completed {
        result: SendResult,
        /// `None` when no status report was registered for the message.
        delivered: Option<bool>,
    },
    /// The service stopped before the message completed.
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageOutcome {
    pub message_id: u64,
    pub destination: String,
    pub resolution: Resolution,
}

/// Runs the configured messages through a dispatch service backed by
/// simulated links and a scripted resolver.
#[derive(Debug)]
pub struct Simulator {
    config: SimulatorConfig,
}

fn link_dispatcher(
    link: &Arc<SimulatedLink>,
    script: &LinkScript,
    domain: Domain,
    format: SmsFormat,
    config: &SimulatorConfig,
) -> Arc<dyn TransportDispatcher> {
    let dispatcher = match domain {
        Domain::Ps => LinkDispatcher::ims(Arc::clone(link), format, &config.dispatch),
        Domain::Cs => LinkDispatcher::cs(Arc::clone(link), format, &config.dispatch),
    };

    if script.own_message_refs {
        Arc::new(dispatcher.with_own_message_refs(SequenceCounter::new(
            config.dispatch.message_ref_modulus,
        )))
    } else {
        Arc::new(dispatcher)
    }
}

impl Simulator {
    /// # Errors
    ///
    /// If the configuration is inconsistent.
    pub fn new(config: SimulatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    fn collaborators(&self) -> Collaborators {
        let config = &self.config;
        let ims = Arc::new(SimulatedLink::new(Domain::Ps, &config.ims));
        let modem = Arc::new(SimulatedLink::new(Domain::Cs, &config.cs));

        Collaborators {
            transports: Transports {
                ps: link_dispatcher(&ims, &config.ims, Domain::Ps, config.voice_format, config),
                cs_3gpp: link_dispatcher(&modem, &config.cs, Domain::Cs, SmsFormat::ThreeGpp, config),
                cs_3gpp2: link_dispatcher(
                    &modem,
                    &config.cs,
                    Domain::Cs,
                    SmsFormat::ThreeGpp2,
                    config,
                ),
            },
            resolver: config.resolver.as_ref().map(|script| {
                Arc::new(ScriptedResolver::new(script)) as Arc<dyn DomainSelectionResolver>
            }),
            classifier: Arc::new(StaticClassifier::new(&config.emergency_numbers)),
            emergency: None,
            phone: Arc::new(StaticPhoneState(config.voice_format)),
            storage: Arc::new(UnlimitedStorage),
        }
    }

    /// Submit every configured message, wait for all of them to complete and
    /// stop the service.
    ///
    /// # Errors
    ///
    /// If the service task panics or cannot be signalled to stop.
    #[traced(timing = "ms")]
    pub async fn run(&self) -> anyhow::Result<Vec<MessageOutcome>> {
        let (service, handle) = DispatchService::new(self.config.dispatch.clone(), self.collaborators());
        let (shutdown, receiver) = broadcast::channel(4);
        let task = tokio::spawn(service.serve(receiver));

        let mut events = handle.subscribe().await?;
        tokio::spawn(async move {
            while let Some(event) = events.receiver.recv().await {
                internal!(level = DEBUG, ?event, "Dispatch event");
            }
        });

        let pending = self
            .config
            .messages
            .iter()
            .map(|message| submit(&handle, message))
            .collect::<Vec<_>>();
        let outcomes = join_all(pending).await;

        shutdown
            .send(Signal::Shutdown)
            .map_err(|e| anyhow::anyhow!("Unable to stop dispatch service: {e}"))?;
        task.await?;

        Ok(outcomes)
    }
}

async fn submit(handle: &DispatchHandle, message: &MessageScript) -> MessageOutcome {
    let message_id = message.options.message_id;
    let destination = message.destination.clone();

    let mut request = SendRequest::new(destination.clone(), message.payload.clone())
        .options(message.options.clone());
    if let Some(address) = &message.service_center {
        request = request.service_center(address.clone());
    }

    let sent = request.on_sent();
    let delivered = request.on_delivered();

    let submitted = match message.payload {
        Payload::Text(_) => handle.send_text(request),
        Payload::Data { .. } => handle.send_data(request),
        Payload::MultipartText(_) => handle.send_multipart_text(request),
    };

    let resolution = match submitted {
        Err(err) => {
            internal!(level = WARN, message_id, error = %err, "Message rejected");
            Resolution::Rejected(err.to_string())
        }
        Ok(()) => match sent.await {
            Ok(result) => {
                let delivered = if result.is_success() {
                    delivered.await.ok().map(|report| report.delivered)
                } else {
                    None
                };
                Resolution::Completed { result, delivered }
            }
            Err(_) => Resolution::Dropped,
        },
    };

    MessageOutcome {
        message_id,
        destination,
        resolution,
    }
}
