//! Write-ahead-log positions
//!
//! An LSN is a 64-bit byte position in the WAL, rendered the way the engine
//! prints it: the high and low 32-bit halves in hex separated by a slash
//! (`16/B374D848`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::VaultError;

/// A position in the write-ahead log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Lsn(pub u64);

impl Lsn {
    pub const ZERO: Lsn = Lsn(0);

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Index of the WAL segment containing this position
    pub fn segment_number(&self, segment_size: u64) -> u64 {
        self.0 / segment_size
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}

impl FromStr for Lsn {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (hi, lo) = s
            .split_once('/')
            .ok_or_else(|| VaultError::Engine(format!("Malformed WAL position '{}'", s)))?;
        let hi = u32::from_str_radix(hi, 16)
            .map_err(|_| VaultError::Engine(format!("Malformed WAL position '{}'", s)))?;
        let lo = u32::from_str_radix(lo, 16)
            .map_err(|_| VaultError::Engine(format!("Malformed WAL position '{}'", s)))?;
        Ok(Lsn(((hi as u64) << 32) | lo as u64))
    }
}

impl Serialize for Lsn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Lsn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The WAL window a backup captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalRange {
    pub start: Lsn,
    pub end: Lsn,
}

impl WalRange {
    pub fn new(start: Lsn, end: Lsn) -> Self {
        Self { start, end }
    }

    /// True when no WAL was written inside the window
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Bytes of WAL covered by the window
    pub fn len(&self) -> u64 {
        self.end.0.saturating_sub(self.start.0)
    }
}

impl fmt::Display for WalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
