//! Typed Stratum wire values.
//!
//! The protocol exchanges header fields as fixed-width lowercase hex
//! strings, byte-for-byte as they appear in the 80-byte header. Each value
//! gets its own type with explicit parse and format so raw strings never
//! leak past the session layer.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::target;
use ruint::aliases::U256;

/// Errors from parsing wire values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("expected {expected} hex chars, got {got}")]
    BadLength { expected: usize, got: usize },

    #[error("invalid hex: {0}")]
    BadHex(String),
}

fn fixed_bytes<const N: usize>(s: &str) -> Result<[u8; N], WireError> {
    if s.len() != N * 2 {
        return Err(WireError::BadLength {
            expected: N * 2,
            got: s.len(),
        });
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(s, &mut out).map_err(|_| WireError::BadHex(s.to_string()))?;
    Ok(out)
}

/// Job identifier, `<epoch>_<counter>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn new(epoch: u64, counter: u64) -> Self {
        Self(format!("{epoch}_{counter}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-assigned extranonce, allocated from a monotonic counter.
///
/// Serialized as the hex of the counter's four little-endian bytes, and
/// spliced into the coinbase in that same byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtraNonce1(u32);

impl ExtraNonce1 {
    pub fn from_counter(counter: u32) -> Self {
        Self(counter)
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl FromStr for ExtraNonce1 {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(u32::from_le_bytes(fixed_bytes::<4>(s)?)))
    }
}

impl fmt::Display for ExtraNonce1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

/// Miner-chosen extranonce. Fixed at four bytes for every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtraNonce2([u8; 4]);

impl ExtraNonce2 {
    pub const SIZE: usize = 4;

    pub fn to_bytes(self) -> [u8; 4] {
        self.0
    }
}

impl FromStr for ExtraNonce2 {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(fixed_bytes::<4>(s)?))
    }
}

impl fmt::Display for ExtraNonce2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Header nonce, kept in the byte order the miner sent it; those bytes go
/// straight into the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce([u8; 4]);

impl Nonce {
    pub fn to_bytes(self) -> [u8; 4] {
        self.0
    }
}

impl FromStr for Nonce {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(fixed_bytes::<4>(s)?))
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Header timestamp as submitted by the miner, same byte-order convention
/// as [`Nonce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderTime([u8; 4]);

impl HeaderTime {
    pub fn to_bytes(self) -> [u8; 4] {
        self.0
    }
}

impl FromStr for HeaderTime {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(fixed_bytes::<4>(s)?))
    }
}

impl fmt::Display for HeaderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Compact target from the block template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactBits(u32);

impl CompactBits {
    pub fn from_u32(bits: u32) -> Self {
        Self(bits)
    }

    /// Parse the `bits` field of a template (8 hex chars, numeric).
    pub fn from_template_hex(s: &str) -> Result<Self, WireError> {
        if s.len() != 8 {
            return Err(WireError::BadLength {
                expected: 8,
                got: s.len(),
            });
        }
        u32::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| WireError::BadHex(s.to_string()))
    }

    pub fn to_u32(self) -> u32 {
        self.0
    }

    /// Little-endian bytes as they appear in the header.
    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    pub fn to_target(self) -> U256 {
        target::bits_to_target(self.0)
    }
}

impl fmt::Display for CompactBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}
