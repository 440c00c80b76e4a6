//! Switch-level identifiers: datapaths, ports and queues.

use crate::ParseError;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// OpenFlow datapath identifier.
///
/// Uniquely names one switch. Emulated switches announce it as a 16-digit
/// hex string (`0000000000000001`), operators usually write it in decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dpid(pub u64);

impl Dpid {
    /// Returns the raw 64-bit value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the 16-digit hex form used by Open vSwitch.
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

impl fmt::Display for Dpid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Dpid {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16)
        } else if s.len() == 16 {
            u64::from_str_radix(s, 16)
        } else {
            s.parse::<u64>()
        };
        parsed
            .map(Dpid)
            .map_err(|_| ParseError::InvalidDpid(s.to_string()))
    }
}

impl From<u64> for Dpid {
    fn from(v: u64) -> Self {
        Dpid(v)
    }
}

/// Switch port number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortNo(pub u32);

impl PortNo {
    /// Returns the raw port number.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PortNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PortNo {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(PortNo)
            .map_err(|_| ParseError::InvalidPort(s.to_string()))
    }
}

impl From<u32> for PortNo {
    fn from(v: u32) -> Self {
        PortNo(v)
    }
}

/// QoS queue identifier on a switch port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueId(pub u32);

impl QueueId {
    /// Returns the raw queue id.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(QueueId)
            .map_err(|_| ParseError::InvalidQueue(s.to_string()))
    }
}

impl From<u32> for QueueId {
    fn from(v: u32) -> Self {
        QueueId(v)
    }
}

// Identifiers show up both as values and as map keys in config files. TOML
// keys are always strings, so every identifier accepts integers and strings.
macro_rules! numeric_id_serde {
    ($ty:ident, $raw:ty, $expecting:literal) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_u64(u64::from(self.0))
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct IdVisitor;

                impl<'de> Visitor<'de> for IdVisitor {
                    type Value = $ty;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        f.write_str($expecting)
                    }

                    fn visit_u64<E: de::Error>(self, v: u64) -> Result<$ty, E> {
                        <$raw>::try_from(v)
                            .map($ty)
                            .map_err(|_| E::custom(format!("{} out of range", v)))
                    }

                    fn visit_i64<E: de::Error>(self, v: i64) -> Result<$ty, E> {
                        <$raw>::try_from(v)
                            .map($ty)
                            .map_err(|_| E::custom(format!("{} out of range", v)))
                    }

                    fn visit_str<E: de::Error>(self, v: &str) -> Result<$ty, E> {
                        v.parse::<$ty>().map_err(E::custom)
                    }
                }

                deserializer.deserialize_any(IdVisitor)
            }
        }
    };
}

numeric_id_serde!(Dpid, u64, "a datapath id (integer or string)");
numeric_id_serde!(PortNo, u32, "a port number (integer or string)");
numeric_id_serde!(QueueId, u32, "a queue id (integer or string)");
