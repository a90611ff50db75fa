//! Bitcoin wire-format primitives.
//!
//! Everything in the block format is little-endian. These helpers cover the
//! handful of encodings the pool needs to assemble coinbases and blocks by
//! hand: the double-SHA256 hash, the variable-length integer, and fixed-width
//! integer packing.

use sha2::{Digest, Sha256};

/// `SHA256(SHA256(data))`, the hash used for txids, merkle nodes, and block
/// headers.
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// Encode `n` as a Bitcoin varint.
///
/// One byte below 0xfd, then 0xfd/0xfe/0xff prefixes for 16-, 32-, and
/// 64-bit little-endian payloads.
pub fn encode_varint(n: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    push_varint(&mut out, n);
    out
}

/// Append a varint to an existing buffer.
pub fn push_varint(out: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        out.push(n as u8);
    } else if n <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&n.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_double_sha256_known_vector() {
        // SHA256d of the empty string.
        let hash = double_sha256(b"");
        assert_eq!(
            hex::encode(hash),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn test_double_sha256_hello() {
        let hash = double_sha256(b"hello");
        assert_eq!(
            hex::encode(hash),
            "9595c9df90075148eb06860365df33584b75bff782a510c6cd4883a419833d50"
        );
    }

    #[test_case(0x00, &[0x00]; "zero")]
    #[test_case(0xfc, &[0xfc]; "one byte max")]
    #[test_case(0xfd, &[0xfd, 0xfd, 0x00]; "two byte min")]
    #[test_case(0xffff, &[0xfd, 0xff, 0xff]; "two byte max")]
    #[test_case(0x1_0000, &[0xfe, 0x00, 0x00, 0x01, 0x00]; "four byte min")]
    #[test_case(0xffff_ffff, &[0xfe, 0xff, 0xff, 0xff, 0xff]; "four byte max")]
    #[test_case(
        0x1_0000_0000,
        &[0xff, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00];
        "eight byte min"
    )]
    fn test_varint_encoding(n: u64, expected: &[u8]) {
        assert_eq!(encode_varint(n), expected);
    }

    #[test]
    fn test_push_varint_appends() {
        let mut buf = vec![0xaa];
        push_varint(&mut buf, 1);
        push_varint(&mut buf, 0xfd);
        assert_eq!(buf, vec![0xaa, 0x01, 0xfd, 0xfd, 0x00]);
    }
}
