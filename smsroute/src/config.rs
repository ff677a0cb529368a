use serde::Deserialize;
use smsroute_common::{Domain, SmsFormat};
use smsroute_dispatch::{DispatchConfig, Payload, SendOptions, transport::LinkResponse};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("message_ref_modulus must be within 1..=256, got {0}")]
    InvalidModulus(u16),

    #[error("message {index} has an empty destination")]
    EmptyDestination { index: usize },
}

const fn default_true() -> bool {
    true
}

const fn default_format() -> SmsFormat {
    SmsFormat::ThreeGpp
}

/// A simulated transport link.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkScript {
    #[serde(default = "default_true")]
    pub available: bool,

    #[serde(default)]
    pub emergency_support: bool,

    /// Answers for successive submissions. Once exhausted every submission
    /// is accepted.
    #[serde(default)]
    pub responses: Vec<LinkResponse>,

    /// Time taken by each submission (in milliseconds)
    #[serde(default)]
    pub latency_ms: u64,

    /// Assign message references on the link instead of in the controller.
    #[serde(default)]
    pub own_message_refs: bool,
}

impl Default for LinkScript {
    fn default() -> Self {
        Self {
            available: default_true(),
            emergency_support: false,
            responses: Vec::new(),
            latency_ms: 0,
            own_message_refs: false,
        }
    }
}

/// How the simulated resolver answers every selection request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum Decision {
    Select(Domain),
    Fail(String),
    Terminate(u32),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverScript {
    pub decision: Decision,

    /// Time until the decision lands (in milliseconds)
    #[serde(default)]
    pub latency_ms: u64,
}

/// One message to submit.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageScript {
    pub destination: String,

    #[serde(default)]
    pub service_center: Option<String>,

    pub payload: Payload,

    #[serde(default)]
    pub options: SendOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Encoding family of the current voice technology.
    #[serde(default = "default_format")]
    pub voice_format: SmsFormat,

    #[serde(default)]
    pub emergency_numbers: Vec<String>,

    #[serde(default)]
    pub ims: LinkScript,

    #[serde(default)]
    pub cs: LinkScript,

    /// Without a resolver every message takes the direct path.
    #[serde(default)]
    pub resolver: Option<ResolverScript>,

    #[serde(default)]
    pub messages: Vec<MessageScript>,
}

impl SimulatorConfig {
    /// # Errors
    ///
    /// The first inconsistency found in the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let modulus = self.dispatch.message_ref_modulus;
        if !(1..=256).contains(&modulus) {
            return Err(ConfigError::InvalidModulus(modulus));
        }

        if let Some(index) = self
            .messages
            .iter()
            .position(|message| message.destination.trim().is_empty())
        {
            return Err(ConfigError::EmptyDestination { index });
        }

        Ok(())
    }
}
