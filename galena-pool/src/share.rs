//! Share validation and block submission.
//!
//! Reconstructs the 80-byte header from the miner's fields, double-SHA256s
//! it, and compares the little-endian value against the session's share
//! target and the job's network target. A share that also meets the network
//! target is serialized into a full block and handed to the node.

use thiserror::Error;

use crate::codec::{double_sha256, push_varint};
use crate::job::Job;
use crate::job::coinbase::splice_extranonce;
use crate::job::merkle::fold_branches;
use crate::services::Services;
use crate::stratum::wire::{ExtraNonce1, ExtraNonce2, HeaderTime, JobId, Nonce};
use crate::target::{difficulty_to_target, hash_value};
use crate::tracing::prelude::*;

/// Rejection reasons for a submitted share.
#[derive(Debug, Error)]
pub enum ShareError {
    #[error("stale or unknown job {0}")]
    StaleJob(JobId),

    #[error("share above target")]
    LowDifficulty,
}

/// What an accepted share amounted to.
#[derive(Debug)]
pub enum ShareVerdict {
    /// Met the share target only.
    Share,
    /// Met the network target too; the block was submitted.
    Block {
        accepted: bool,
        reject_reason: Option<String>,
        hash: String,
        height: u32,
    },
}

/// Assemble the 80-byte header for a submission against a job.
fn build_header(job: &Job, merkle_root: [u8; 32], ntime: HeaderTime, nonce: Nonce) -> [u8; 80] {
    let mut header = [0u8; 80];
    header[..4].copy_from_slice(&job.version.to_le_bytes());
    header[4..36].copy_from_slice(&job.prev_hash);
    header[36..68].copy_from_slice(&merkle_root);
    header[68..72].copy_from_slice(&ntime.to_bytes());
    header[72..76].copy_from_slice(&job.bits.to_le_bytes());
    header[76..80].copy_from_slice(&nonce.to_bytes());
    header
}

/// Serialize the full block: header, transaction count, coinbase, then the
/// template transactions in order.
fn build_block(job: &Job, header: &[u8; 80], coinbase: &[u8]) -> Vec<u8> {
    let tx_bodies: usize = job.transactions.iter().map(Vec::len).sum();
    let mut block = Vec::with_capacity(80 + 9 + coinbase.len() + tx_bodies);
    block.extend_from_slice(header);
    push_varint(&mut block, 1 + job.transactions.len() as u64);
    block.extend_from_slice(coinbase);
    for tx in &job.transactions {
        block.extend_from_slice(tx);
    }
    block
}

/// Validate one submission and submit any found block.
///
/// `difficulty` is the session's current difficulty at the moment the
/// submit arrived; the share is judged against the job it names, not the
/// newest one.
pub async fn process_submission(
    services: &Services,
    job_id: &JobId,
    extranonce1: ExtraNonce1,
    extranonce2: ExtraNonce2,
    ntime: HeaderTime,
    nonce: Nonce,
    difficulty: f64,
) -> Result<ShareVerdict, ShareError> {
    // Unknown job: rejected before any hashing happens.
    let job = services
        .jobs
        .lock()
        .get(job_id)
        .ok_or_else(|| ShareError::StaleJob(job_id.clone()))?;

    let coinbase = splice_extranonce(
        &job.coinbase_bytes,
        job.splice_offset,
        extranonce1.to_bytes(),
        extranonce2.to_bytes(),
    );
    let coinbase_hash = double_sha256(&coinbase);
    let merkle_root = fold_branches(coinbase_hash, &job.merkle_branches);

    let header = build_header(&job, merkle_root, ntime, nonce);
    let hash = double_sha256(&header);
    let value = hash_value(hash);
    let hash_hex = hex::encode(hash);

    if value > difficulty_to_target(difficulty) {
        debug!(job = %job_id, hash = %hash_hex, "Share above target");
        return Err(ShareError::LowDifficulty);
    }

    if value > job.bits.to_target() {
        return Ok(ShareVerdict::Share);
    }

    info!(height = job.height, hash = %hash_hex, "Share meets network target, submitting block");
    let block_hex = hex::encode(build_block(&job, &header, &coinbase));

    let (accepted, reject_reason) = match services.node.submit_block(&block_hex).await {
        Ok(None) => (true, None),
        Ok(Some(reason)) if reason.is_empty() => (true, None),
        Ok(Some(reason)) => {
            warn!(height = job.height, reason = %reason, "Block rejected by node");
            (false, Some(reason))
        }
        Err(err) => {
            error!(height = job.height, error = %err, "Failed to submit block");
            (false, Some(err.to_string()))
        }
    };

    Ok(ShareVerdict::Block {
        accepted,
        reject_reason,
        hash: hash_hex,
        height: job.height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{build_job, coinbase::reward_script};
    use crate::node::{
        AddressInfo, BlockTemplate, BlockchainInfo, NodeClient, NodeError, TemplateTransaction,
    };
    use crate::vardiff::VardiffConfig;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::str::FromStr;
    use std::sync::Arc;

    /// Node stub that records submitted blocks.
    #[derive(Default)]
    struct StubNode {
        submitted: Mutex<Vec<String>>,
        reject_with: Option<String>,
    }

    #[async_trait]
    impl NodeClient for StubNode {
        async fn get_blockchain_info(&self) -> Result<BlockchainInfo, NodeError> {
            Ok(BlockchainInfo {
                chain: "regtest".into(),
                blocks: 0,
            })
        }

        async fn get_block_template(&self) -> Result<BlockTemplate, NodeError> {
            Err(NodeError::Unreachable(0))
        }

        async fn submit_block(&self, block_hex: &str) -> Result<Option<String>, NodeError> {
            self.submitted.lock().push(block_hex.to_string());
            Ok(self.reject_with.clone())
        }

        async fn validate_address(&self, _: &str) -> Result<AddressInfo, NodeError> {
            Ok(AddressInfo { is_valid: true })
        }
    }

    fn template(bits: &str, tx_count: usize) -> BlockTemplate {
        let transactions = (0..tx_count)
            .map(|i| {
                let body = vec![i as u8 + 1; 40];
                let mut txid = double_sha256(&body);
                txid.reverse();
                TemplateTransaction {
                    txid: hex::encode(txid),
                    data: hex::encode(&body),
                }
            })
            .collect();

        BlockTemplate {
            height: 120,
            version: 0x2000_0000,
            previous_block_hash: "11".repeat(32),
            bits: bits.into(),
            coinbase_value: 5_000_000_000,
            transactions,
        }
    }

    fn services_with(node: Arc<StubNode>, bits: &str, tx_count: usize) -> (Services, JobId) {
        let script = reward_script(
            "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa",
            bitcoin::Network::Bitcoin,
        )
        .unwrap();
        let services = Services::new(
            node,
            "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa".into(),
            script.clone(),
            b"test".to_vec(),
            VardiffConfig::default(),
        );

        let id = services.next_job_id();
        let job = build_job(&template(bits, tx_count), id.clone(), b"test", &script).unwrap();
        services.jobs.lock().insert(job);
        (services, id)
    }

    fn submission_parts() -> (ExtraNonce1, ExtraNonce2, HeaderTime) {
        (
            ExtraNonce1::from_counter(1),
            ExtraNonce2::from_str("00000001").unwrap(),
            HeaderTime::from_str("66aabbcc").unwrap(),
        )
    }

    /// Brute-force a nonce whose header hash meets the job's network target.
    fn mine_nonce(services: &Services, id: &JobId) -> Nonce {
        let job = services.jobs.lock().get(id).unwrap();
        let (en1, en2, ntime) = submission_parts();
        let coinbase =
            splice_extranonce(&job.coinbase_bytes, job.splice_offset, en1.to_bytes(), en2.to_bytes());
        let root = fold_branches(double_sha256(&coinbase), &job.merkle_branches);
        let target = job.bits.to_target();

        for n in 0u32..100_000 {
            let nonce = Nonce::from_str(&format!("{n:08x}")).unwrap();
            let header = build_header(&job, root, ntime, nonce);
            if hash_value(double_sha256(&header)) <= target {
                return nonce;
            }
        }
        panic!("no nonce found under regtest target");
    }

    #[tokio::test]
    async fn test_stale_job_rejected() {
        let node = Arc::new(StubNode::default());
        let (services, _) = services_with(node.clone(), "1d00ffff", 0);
        let (en1, en2, ntime) = submission_parts();

        let result = process_submission(
            &services,
            &JobId::from("9999_9"),
            en1,
            en2,
            ntime,
            Nonce::from_str("00000000").unwrap(),
            1.0,
        )
        .await;

        assert!(matches!(result, Err(ShareError::StaleJob(_))));
        assert!(node.submitted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_low_difficulty_share_rejected() {
        // At difficulty 1.0 an arbitrary nonce is above target with
        // overwhelming probability.
        let node = Arc::new(StubNode::default());
        let (services, id) = services_with(node.clone(), "1d00ffff", 0);
        let (en1, en2, ntime) = submission_parts();

        let result = process_submission(
            &services,
            &id,
            en1,
            en2,
            ntime,
            Nonce::from_str("12345678").unwrap(),
            1.0,
        )
        .await;

        assert!(matches!(result, Err(ShareError::LowDifficulty)));
        assert!(node.submitted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_valid_share_without_block_does_not_submit() {
        // A saturated share target accepts anything, but mainnet bits keep
        // the network target far out of reach.
        let node = Arc::new(StubNode::default());
        let (services, id) = services_with(node.clone(), "1d00ffff", 0);
        let (en1, en2, ntime) = submission_parts();

        let verdict = process_submission(
            &services,
            &id,
            en1,
            en2,
            ntime,
            Nonce::from_str("12345678").unwrap(),
            1e-10,
        )
        .await
        .unwrap();

        assert!(matches!(verdict, ShareVerdict::Share));
        assert!(node.submitted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_block_found_is_submitted_once() {
        let node = Arc::new(StubNode::default());
        let (services, id) = services_with(node.clone(), "207fffff", 2);
        let (en1, en2, ntime) = submission_parts();
        let nonce = mine_nonce(&services, &id);

        let verdict = process_submission(&services, &id, en1, en2, ntime, nonce, 1e-10)
            .await
            .unwrap();

        match verdict {
            ShareVerdict::Block {
                accepted,
                reject_reason,
                height,
                ..
            } => {
                assert!(accepted);
                assert_eq!(reject_reason, None);
                assert_eq!(height, 120);
            }
            other => panic!("expected block verdict, got {other:?}"),
        }
        assert_eq!(node.submitted.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_submitted_block_serialization() {
        let node = Arc::new(StubNode::default());
        let (services, id) = services_with(node.clone(), "207fffff", 2);
        let (en1, en2, ntime) = submission_parts();
        let nonce = mine_nonce(&services, &id);

        process_submission(&services, &id, en1, en2, ntime, nonce, 1e-10)
            .await
            .unwrap();

        let job = services.jobs.lock().get(&id).unwrap();
        let block = hex::decode(&node.submitted.lock()[0]).unwrap();

        // header(80) || varint(3) || coinbase || tx bodies
        assert_eq!(block[80], 3);
        let coinbase_len = job.coinbase_bytes.len();
        let coinbase = &block[81..81 + coinbase_len];
        // Extranonces spliced into the placeholder position.
        assert_eq!(
            &coinbase[job.splice_offset..job.splice_offset + 8],
            &[0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01]
        );
        let tail: Vec<u8> = job.transactions.iter().flatten().copied().collect();
        assert_eq!(&block[81 + coinbase_len..], &tail[..]);
    }

    #[tokio::test]
    async fn test_rejected_block_reports_reason() {
        let node = Arc::new(StubNode {
            reject_with: Some("bad-txnmrklroot".into()),
            ..StubNode::default()
        });
        let (services, id) = services_with(node.clone(), "207fffff", 0);
        let (en1, en2, ntime) = submission_parts();
        let nonce = mine_nonce(&services, &id);

        let verdict = process_submission(&services, &id, en1, en2, ntime, nonce, 1e-10)
            .await
            .unwrap();

        match verdict {
            ShareVerdict::Block {
                accepted,
                reject_reason,
                ..
            } => {
                assert!(!accepted);
                assert_eq!(reject_reason.as_deref(), Some("bad-txnmrklroot"));
            }
            other => panic!("expected block verdict, got {other:?}"),
        }
    }
}
