//! Record version codec.
//!
//! Versions are written `MM.mm` off-chain and packed as `MM * 100 + mm` into a `uint16`
//! on-chain, so that ordering comparisons on the packed form match the dotted form.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, ScrError};

/// Largest packed version the protocol accepts (`99.99`).
pub const MAX_PACKED_VERSION: u16 = 9999;

/// A two component record version, each component in `0..=99`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    major: u8,
    minor: u8,
}

impl Version {
    /// Version assigned to a record when none is requested.
    pub const INITIAL: Version = Version { major: 1, minor: 0 };
    /// The highest version the protocol can represent.
    pub const MAX: Version = Version {
        major: 99,
        minor: 99,
    };

    /// Create a version from its components.
    pub fn new(major: u8, minor: u8) -> Result<Self> {
        if major > 99 || minor > 99 {
            return Err(ScrError::MalformedVersion(format!("{major}.{minor}")));
        }
        Ok(Self { major, minor })
    }

    pub fn major(&self) -> u8 {
        self.major
    }

    pub fn minor(&self) -> u8 {
        self.minor
    }

    /// The packed integer used by the registry.
    pub fn packed(&self) -> u16 {
        self.major as u16 * 100 + self.minor as u16
    }

    /// Decode a packed on-chain version.
    pub fn from_packed(packed: u16) -> Result<Self> {
        if packed > MAX_PACKED_VERSION {
            return Err(ScrError::MalformedVersion(packed.to_string()));
        }
        Ok(Self {
            major: (packed / 100) as u8,
            minor: (packed % 100) as u8,
        })
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}.{:02}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = ScrError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || ScrError::MalformedVersion(s.to_string());

        let (major, minor) = s.split_once('.').ok_or_else(malformed)?;
        let is_group = |g: &str| g.len() == 2 && g.bytes().all(|b| b.is_ascii_digit());
        if !is_group(major) || !is_group(minor) {
            return Err(malformed());
        }

        Ok(Self {
            major: major.parse().map_err(|_| malformed())?,
            minor: minor.parse().map_err(|_| malformed())?,
        })
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Pack a dotted `DD.DD` version string.
pub fn to_packed(dotted: &str) -> Result<u16> {
    dotted.parse::<Version>().map(|v| v.packed())
}

/// Render a packed version as its dotted string.
pub fn to_dotted(packed: u16) -> Result<String> {
    Version::from_packed(packed).map(|v| v.to_string())
}
