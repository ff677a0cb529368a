//! Transport domain, message format, and traffic class newtypes.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// The transport path a message travels over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Packet-switched, IMS based.
    Ps,
    /// Circuit-switched, legacy modem.
    Cs,
}

impl Domain {
    #[must_use]
    pub const fn is_ps(self) -> bool {
        matches!(self, Self::Ps)
    }

    #[must_use]
    pub const fn is_cs(self) -> bool {
        matches!(self, Self::Cs)
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ps => "PS",
            Self::Cs => "CS",
        })
    }
}

/// Wire encoding family of a transport.
///
/// The CS dispatcher in use is picked by matching this against the phone's
/// current voice technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SmsFormat {
    /// GSM/UMTS/LTE style encoding.
    #[serde(alias = "3gpp")]
    ThreeGpp,
    /// CDMA style encoding.
    #[serde(alias = "3gpp2")]
    ThreeGpp2,
}

impl Display for SmsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ThreeGpp => "3gpp",
            Self::ThreeGpp2 => "3gpp2",
        })
    }
}

/// Traffic classes are selected and queued independently of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficClass {
    Normal,
    Emergency,
}

impl TrafficClass {
    #[must_use]
    pub const fn from_emergency(is_emergency: bool) -> Self {
        if is_emergency {
            Self::Emergency
        } else {
            Self::Normal
        }
    }

    #[must_use]
    pub const fn is_emergency(self) -> bool {
        matches!(self, Self::Emergency)
    }
}

impl Display for TrafficClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::Emergency => "emergency",
        })
    }
}
