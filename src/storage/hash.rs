use sha2::{Digest, Sha256};

use crate::utils::{IpfsError, Result};

/// Multihash code for sha2-256.
pub const SHA2_256: u8 = 0x12;
pub const SHA2_256_LEN: u8 = 0x20;

pub struct HashUtils;

impl HashUtils {
    pub fn sha256(data: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hasher.finalize().into()
    }

    /// sha2-256 multihash bytes: `0x12 0x20 || digest`.
    pub fn multihash(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(34);
        out.push(SHA2_256);
        out.push(SHA2_256_LEN);
        out.extend_from_slice(&Self::sha256(data));
        out
    }

    /// Content address of `data`, base58btc encoded (`Qm...`).
    pub fn content_address(data: &[u8]) -> String {
        bs58::encode(Self::multihash(data)).into_string()
    }

    /// Checks that `s` is a well-formed base58 sha2-256 multihash.
    pub fn parse_address(s: &str) -> Result<[u8; 32]> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| IpfsError::InvalidPath(format!("{}: {}", s, e)))?;
        if bytes.len() != 34 || bytes[0] != SHA2_256 || bytes[1] != SHA2_256_LEN {
            return Err(IpfsError::InvalidPath(format!(
                "{} is not a sha2-256 multihash",
                s
            )));
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&bytes[2..]);
        Ok(digest)
    }

    pub fn is_address(s: &str) -> bool {
        Self::parse_address(s).is_ok()
    }

    pub fn verify_data(data: &[u8], expected: &str) -> bool {
        Self::content_address(data) == expected
    }
}
