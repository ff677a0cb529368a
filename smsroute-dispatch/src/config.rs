use std::time::Duration;

use serde::{Deserialize, Serialize};

const fn default_true() -> bool {
    true
}

const fn default_max_ims_retries() -> u32 {
    1
}

const fn default_max_cs_retries() -> u32 {
    3
}

const fn default_retry_delay_ms() -> u64 {
    2000
}

const fn default_message_ref_modulus() -> u16 {
    256
}

/// Routing policy for the dispatch controller and its link dispatchers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Consult the domain selection resolver before dispatching.
    ///
    /// When disabled every request takes the direct path: PS if the PS
    /// dispatcher reports itself available, CS otherwise.
    #[serde(default = "default_true")]
    pub domain_selection_enabled: bool,

    /// How many times a message is retried over PS before it is forced to CS.
    ///
    /// Default: 1
    #[serde(default = "default_max_ims_retries")]
    pub max_ims_retries: u32,

    /// Retry ceiling for CS submissions that fail with a retryable cause.
    ///
    /// Default: 3
    #[serde(default = "default_max_cs_retries")]
    pub max_cs_retries: u32,

    /// Delay before a PS retry (in milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub ims_retry_delay_ms: u64,

    /// Delay before a CS retry is handed back to the controller (in milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub cs_retry_delay_ms: u64,

    /// Wire message references wrap at this value (at most 256).
    #[serde(default = "default_message_ref_modulus")]
    pub message_ref_modulus: u16,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            domain_selection_enabled: default_true(),
            max_ims_retries: default_max_ims_retries(),
            max_cs_retries: default_max_cs_retries(),
            ims_retry_delay_ms: default_retry_delay_ms(),
            cs_retry_delay_ms: default_retry_delay_ms(),
            message_ref_modulus: default_message_ref_modulus(),
        }
    }
}

impl DispatchConfig {
    #[must_use]
    pub const fn ims_retry_delay(&self) -> Duration {
        Duration::from_millis(self.ims_retry_delay_ms)
    }

    #[must_use]
    pub const fn cs_retry_delay(&self) -> Duration {
        Duration::from_millis(self.cs_retry_delay_ms)
    }
}
