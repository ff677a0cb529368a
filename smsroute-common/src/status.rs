use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Caller-visible failure causes for a send.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug, Serialize, Deserialize)]
pub enum ResultCode {
    GenericFailure,
    RadioOff,
    NullPdu,
    NoService,
    LimitExceeded,
    RadioNotAvailable,
    NetworkReject,
    InvalidArguments,
    InvalidState,
    NoMemory,
    InvalidSmsFormat,
    SystemError,
    ModemError,
    NetworkError,
    SendRetryFailed,
    Unknown(u32),
}

impl ResultCode {
    /// Whether the same message may succeed if handed to a transport again.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::GenericFailure | Self::NetworkError | Self::ModemError | Self::NoService
        )
    }
}

impl From<u32> for ResultCode {
    fn from(value: u32) -> Self {
        match value {
            1 => Self::GenericFailure,
            2 => Self::RadioOff,
            3 => Self::NullPdu,
            4 => Self::NoService,
            5 => Self::LimitExceeded,
            9 => Self::RadioNotAvailable,
            10 => Self::NetworkReject,
            11 => Self::InvalidArguments,
            12 => Self::InvalidState,
            13 => Self::NoMemory,
            14 => Self::InvalidSmsFormat,
            15 => Self::SystemError,
            16 => Self::ModemError,
            17 => Self::NetworkError,
            30 => Self::SendRetryFailed,
            _ => Self::Unknown(value),
        }
    }
}

impl From<ResultCode> for u32 {
    fn from(value: ResultCode) -> Self {
        match value {
            ResultCode::GenericFailure => 1,
            ResultCode::RadioOff => 2,
            ResultCode::NullPdu => 3,
            ResultCode::NoService => 4,
            ResultCode::LimitExceeded => 5,
            ResultCode::RadioNotAvailable => 9,
            ResultCode::NetworkReject => 10,
            ResultCode::InvalidArguments => 11,
            ResultCode::InvalidState => 12,
            ResultCode::NoMemory => 13,
            ResultCode::InvalidSmsFormat => 14,
            ResultCode::SystemError => 15,
            ResultCode::ModemError => 16,
            ResultCode::NetworkError => 17,
            ResultCode::SendRetryFailed => 30,
            ResultCode::Unknown(v) => v,
        }
    }
}

impl Display for ResultCode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{self:?} ({})", u32::from(*self))
    }
}

/// Terminal result of one logical message, as delivered to the sender.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum SendResult {
    /// Accepted by the network. Carries the wire message reference used.
    Sent { message_ref: Option<u8> },
    Failed(ResultCode),
}

impl SendResult {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}
