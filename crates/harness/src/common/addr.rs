//! Guest address type.
//!
//! The emulator parses every address flag with a base-16 conversion, so this
//! module owns the one place where addresses are rendered and parsed:
//! 1. **Rendering:** `Display` always emits `0x`-prefixed lowercase hex.
//! 2. **Parsing:** Accepts `0x`-prefixed hex or plain decimal text.
//! 3. **Serde:** Deserializes from either a JSON integer or a string; serializes as hex text.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

/// An address in the emulated guest's physical address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GuestAddr(pub u64);

impl GuestAddr {
    /// Creates a guest address from a raw 64-bit value.
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw 64-bit address value.
    #[inline]
    pub const fn val(self) -> u64 {
        self.0
    }
}

impl From<u64> for GuestAddr {
    fn from(addr: u64) -> Self {
        Self(addr)
    }
}

impl fmt::Display for GuestAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Error returned when an address string is neither hex nor decimal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid address literal '{0}'")]
pub struct ParseAddrError(pub String);

impl FromStr for GuestAddr {
    type Err = ParseAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parsed = if let Some(hex) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            u64::from_str_radix(&hex.replace('_', ""), 16)
        } else {
            trimmed.replace('_', "").parse::<u64>()
        };
        parsed
            .map(Self)
            .map_err(|_| ParseAddrError(s.to_string()))
    }
}

struct GuestAddrVisitor;

impl Visitor<'_> for GuestAddrVisitor {
    type Value = GuestAddr;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an unsigned integer or a hex/decimal address string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(GuestAddr(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u64::try_from(v)
            .map(GuestAddr)
            .map_err(|_| E::custom(format!("negative address {v}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for GuestAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(GuestAddrVisitor)
    }
}

impl Serialize for GuestAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
