//! Mining jobs: immutable work units derived from block templates.

pub mod coinbase;
pub mod merkle;
pub mod registry;

use thiserror::Error;

use crate::node::BlockTemplate;
use crate::stratum::wire::{CompactBits, JobId, WireError};

use coinbase::CoinbaseParts;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("bad {field} in template: {source}")]
    BadField {
        field: &'static str,
        source: WireError,
    },

    #[error("bad hex in template {field}")]
    BadHex { field: &'static str },
}

/// An immutable unit of work handed to miners.
///
/// Everything here is fixed at template time. The merkle root is not: it
/// depends on the extranonce pair, so only the branches are precomputed and
/// the validator folds them into the actual coinbase hash per submission.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub version: u32,
    /// Previous block hash exactly as the template carried it.
    pub prev_hash: [u8; 32],
    pub bits: CompactBits,
    pub height: u32,
    /// Serialized coinbase with the zeroed extranonce placeholder embedded.
    pub coinbase_bytes: Vec<u8>,
    /// Byte position of the placeholder within `coinbase_bytes`.
    pub splice_offset: usize,
    /// Hex of the coinbase before the placeholder.
    pub coinbase1: String,
    /// Hex of the coinbase after the placeholder.
    pub coinbase2: String,
    /// Sibling hashes folding the coinbase hash to the merkle root.
    pub merkle_branches: Vec<[u8; 32]>,
    /// Serialized non-coinbase transactions, template order.
    pub transactions: Vec<Vec<u8>>,
}

impl Job {
    /// Merkle branches as lowercase hex, the `mining.notify` form.
    pub fn branches_hex(&self) -> Vec<String> {
        self.merkle_branches.iter().map(hex::encode).collect()
    }

    pub fn prev_hash_hex(&self) -> String {
        hex::encode(self.prev_hash)
    }
}

fn decode_fixed<const N: usize>(s: &str, field: &'static str) -> Result<[u8; N], JobError> {
    let mut out = [0u8; N];
    if s.len() != N * 2 {
        return Err(JobError::BadHex { field });
    }
    hex::decode_to_slice(s, &mut out).map_err(|_| JobError::BadHex { field })?;
    Ok(out)
}

/// Build a [`Job`] from a block template.
///
/// The coinbase embeds the block height, the pool's message, and the
/// extranonce placeholder; merkle branches are computed with the coinbase
/// promoted to leaf 0 and the template's txids (byte-reversed to internal
/// order) as leaves 1..n.
pub fn build_job(
    template: &BlockTemplate,
    id: JobId,
    message: &[u8],
    reward_script: &[u8],
) -> Result<Job, JobError> {
    let prev_hash = decode_fixed::<32>(&template.previous_block_hash, "previousblockhash")?;
    let bits = CompactBits::from_template_hex(&template.bits).map_err(|source| {
        JobError::BadField {
            field: "bits",
            source,
        }
    })?;

    let CoinbaseParts {
        bytes: coinbase_bytes,
        splice_offset,
    } = coinbase::build_coinbase(
        template.height,
        template.coinbase_value,
        message,
        reward_script,
    );

    let mut tx_hashes = Vec::with_capacity(template.transactions.len());
    let mut transactions = Vec::with_capacity(template.transactions.len());
    for tx in &template.transactions {
        let mut txid = decode_fixed::<32>(&tx.txid, "txid")?;
        txid.reverse();
        tx_hashes.push(txid);
        transactions.push(hex::decode(&tx.data).map_err(|_| JobError::BadHex { field: "data" })?);
    }

    let merkle_branches = merkle::coinbase_branches(&tx_hashes);

    let coinbase1 = hex::encode(&coinbase_bytes[..splice_offset]);
    let coinbase2 = hex::encode(&coinbase_bytes[splice_offset + coinbase::EXTRANONCE_LEN..]);

    Ok(Job {
        id,
        version: template.version,
        prev_hash,
        bits,
        height: template.height,
        coinbase_bytes,
        splice_offset,
        coinbase1,
        coinbase2,
        merkle_branches,
        transactions,
    })
}
