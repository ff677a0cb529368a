use std::fmt::Debug;

use smsroute_common::SmsFormat;

/// Radio state the controller consults when it has to pick a CS dispatcher.
pub trait PhoneState: Send + Sync + Debug {
    /// Encoding family of the current voice technology.
    fn voice_format(&self) -> SmsFormat;
}

/// Reports whether received and outgoing messages can still be stored.
pub trait StorageMonitor: Send + Sync + Debug {
    fn is_storage_available(&self) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct StaticPhoneState(pub SmsFormat);

impl PhoneState for StaticPhoneState {
    fn voice_format(&self) -> SmsFormat {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnlimitedStorage;

impl StorageMonitor for UnlimitedStorage {
    fn is_storage_available(&self) -> bool {
        true
    }
}
