#![allow(dead_code)] // Not every test uses every helper

use std::sync::Arc;

use smsroute_common::{SmsFormat, TrafficClass};
use smsroute_dispatch::{
    Collaborators, Command, DispatchConfig, DispatchController, SendOptions, SendRequest,
    StaticPhoneState, StorageMonitor,
    emergency::{EmergencyStateTracker, StaticClassifier},
    selection::{ConnectionHolder, DomainSelectionResolver},
    testing::{MockEmergencyTracker, MockResolver, RecordingDispatcher, SwitchableStorage},
    transport::{TransportDispatcher, Transports},
};
use tokio::sync::mpsc;

/// A text request with a distinguishable message id.
pub fn text(destination: &str, body: &str, message_id: u64) -> SendRequest {
    SendRequest::text(destination, body).options(SendOptions {
        message_id,
        ..SendOptions::default()
    })
}

pub struct Harness {
    pub controller: DispatchController,
    commands: mpsc::UnboundedReceiver<Command>,
    pub ps: Arc<RecordingDispatcher>,
    pub cs_3gpp: Arc<RecordingDispatcher>,
    pub cs_3gpp2: Arc<RecordingDispatcher>,
    pub resolver: Arc<MockResolver>,
    pub emergency: Arc<MockEmergencyTracker>,
    pub storage: Arc<SwitchableStorage>,
}

pub struct HarnessBuilder {
    config: DispatchConfig,
    voice_format: SmsFormat,
    with_resolver: bool,
    ps: RecordingDispatcher,
    emergency_numbers: Vec<&'static str>,
}

impl HarnessBuilder {
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn without_domain_selection(mut self) -> Self {
        self.config.domain_selection_enabled = false;
        self
    }

    pub fn without_resolver(mut self) -> Self {
        self.with_resolver = false;
        self
    }

    pub fn with_voice_format(mut self, format: SmsFormat) -> Self {
        self.voice_format = format;
        self
    }

    pub fn with_ps(mut self, ps: RecordingDispatcher) -> Self {
        self.ps = ps;
        self
    }

    pub fn build(self) -> Harness {
        let ps = Arc::new(self.ps);
        let cs_3gpp = Arc::new(RecordingDispatcher::cs(SmsFormat::ThreeGpp));
        let cs_3gpp2 = Arc::new(RecordingDispatcher::cs(SmsFormat::ThreeGpp2));
        let resolver = Arc::new(MockResolver::new());
        let emergency = Arc::new(MockEmergencyTracker::new());
        let storage = Arc::new(SwitchableStorage::default());

        let collaborators = Collaborators {
            transports: Transports {
                ps: Arc::clone(&ps) as Arc<dyn TransportDispatcher>,
                cs_3gpp: Arc::clone(&cs_3gpp) as Arc<dyn TransportDispatcher>,
                cs_3gpp2: Arc::clone(&cs_3gpp2) as Arc<dyn TransportDispatcher>,
            },
            resolver: self
                .with_resolver
                .then(|| Arc::clone(&resolver) as Arc<dyn DomainSelectionResolver>),
            classifier: Arc::new(StaticClassifier::new(self.emergency_numbers)),
            emergency: Some(Arc::clone(&emergency) as Arc<dyn EmergencyStateTracker>),
            phone: Arc::new(StaticPhoneState(self.voice_format)),
            storage: Arc::clone(&storage) as Arc<dyn StorageMonitor>,
        };

        let (sender, commands) = mpsc::unbounded_channel();
        Harness {
            controller: DispatchController::new(self.config, collaborators, sender),
            commands,
            ps,
            cs_3gpp,
            cs_3gpp2,
            resolver,
            emergency,
            storage,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            config: DispatchConfig {
                ims_retry_delay_ms: 0,
                cs_retry_delay_ms: 0,
                ..DispatchConfig::default()
            },
            voice_format: SmsFormat::ThreeGpp,
            with_resolver: true,
            ps: RecordingDispatcher::ps(),
            emergency_numbers: vec!["911", "112"],
        }
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Let spawned resolver futures run and apply every command they, or the
    /// dispatchers, posted.
    pub async fn settle(&mut self) {
        for _ in 0..32 {
            tokio::task::yield_now().await;
            while let Ok(command) = self.commands.try_recv() {
                self.controller.handle(command);
            }
        }
    }

    pub fn normal(&self) -> &ConnectionHolder {
        self.controller.holder(TrafficClass::Normal)
    }

    pub fn emergency_holder(&self) -> &ConnectionHolder {
        self.controller.holder(TrafficClass::Emergency)
    }
}
