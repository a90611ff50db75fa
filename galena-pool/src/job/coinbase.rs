//! Coinbase transaction assembly.
//!
//! The coinbase is built by hand so the extranonce placeholder lands at a
//! known byte offset: the input script ends with eight zero bytes that the
//! session splices `extranonce1 || extranonce2` over at validation time.

use std::str::FromStr;

use bitcoin::{Address, Network};
use thiserror::Error;

use crate::codec::push_varint;

/// Placeholder width reserved for `extranonce1 || extranonce2`.
pub const EXTRANONCE_LEN: usize = 8;

/// Longest coinbase message embedded in the input script.
pub const MAX_MESSAGE_LEN: usize = 100;

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("invalid reward address {0:?}: {1}")]
    Parse(String, bitcoin::address::ParseError),

    #[error("reward address {0:?} is not valid for network {1}")]
    WrongNetwork(String, Network),
}

/// A serialized coinbase with the byte offset of its extranonce placeholder.
#[derive(Debug, Clone)]
pub struct CoinbaseParts {
    pub bytes: Vec<u8>,
    pub splice_offset: usize,
}

/// Decode a reward address into its output script.
///
/// Handles Base58Check and Bech32 forms alike; the resulting script is
/// whatever the address type dictates (P2PKH, P2SH, P2WPKH, P2TR).
pub fn reward_script(address: &str, network: Network) -> Result<Vec<u8>, AddressError> {
    let parsed = Address::from_str(address)
        .map_err(|e| AddressError::Parse(address.to_string(), e))?;
    let checked = parsed
        .require_network(network)
        .map_err(|_| AddressError::WrongNetwork(address.to_string(), network))?;
    Ok(checked.script_pubkey().into_bytes())
}

/// Serialize a coinbase paying `value` satoshis to `reward_script`.
///
/// The input script is `height (u32 LE) || message || 0^8`, the trailing
/// zeros being the extranonce placeholder. Messages longer than
/// [`MAX_MESSAGE_LEN`] are truncated.
pub fn build_coinbase(
    height: u32,
    value: u64,
    message: &[u8],
    reward_script: &[u8],
) -> CoinbaseParts {
    let message = &message[..message.len().min(MAX_MESSAGE_LEN)];
    let script_sig_len = 4 + message.len() + EXTRANONCE_LEN;

    let mut tx = Vec::with_capacity(128 + message.len() + reward_script.len());

    // Version
    tx.extend_from_slice(&1u32.to_le_bytes());
    // Input count
    push_varint(&mut tx, 1);
    // Null previous output
    tx.extend_from_slice(&[0u8; 32]);
    tx.extend_from_slice(&0xffff_ffffu32.to_le_bytes());
    // Input script
    push_varint(&mut tx, script_sig_len as u64);
    tx.extend_from_slice(&height.to_le_bytes());
    tx.extend_from_slice(message);
    let splice_offset = tx.len();
    tx.extend_from_slice(&[0u8; EXTRANONCE_LEN]);
    // Sequence
    tx.extend_from_slice(&0xffff_ffffu32.to_le_bytes());
    // Single output paying the pool address
    push_varint(&mut tx, 1);
    tx.extend_from_slice(&value.to_le_bytes());
    push_varint(&mut tx, reward_script.len() as u64);
    tx.extend_from_slice(reward_script);
    // Locktime
    tx.extend_from_slice(&0u32.to_le_bytes());

    CoinbaseParts {
        bytes: tx,
        splice_offset,
    }
}

/// Replace the placeholder at `splice_offset` with the given extranonces.
pub fn splice_extranonce(
    coinbase: &[u8],
    splice_offset: usize,
    extranonce1: [u8; 4],
    extranonce2: [u8; 4],
) -> Vec<u8> {
    let mut out = coinbase.to_vec();
    out[splice_offset..splice_offset + 4].copy_from_slice(&extranonce1);
    out[splice_offset + 4..splice_offset + EXTRANONCE_LEN].copy_from_slice(&extranonce2);
    out
}
