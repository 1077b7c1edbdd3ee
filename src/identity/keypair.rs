//! Ed25519 identity keypair and the peer ID derived from it.
//!
//! All signing is delegated to `ed25519-dalek`; this module only fixes how
//! keys are encoded and how the public identifier is computed.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use std::str::FromStr;

use crate::storage::HashUtils;
use crate::utils::{IpfsError, Result};

/// A node or naming identity. The signing key is zeroized on drop.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    /// Parses the hex encoding used in key files and the repo config.
    pub fn from_secret_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| IpfsError::CorruptKey(format!("invalid hex: {}", e)))?;
        let secret: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            IpfsError::CorruptKey(format!("expected 32 secret bytes, got {}", bytes.len()))
        })?;
        Ok(Self::from_secret_bytes(&secret))
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    pub fn peer_id(&self) -> Result<PeerId> {
        PeerId::from_public_key(&self.public_key_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &hex::encode(self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}

/// Checks an Ed25519 signature made by [`Keypair::sign`].
pub fn verify_signature(public_key: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    key.verify(message, &Signature::from_bytes(signature))
        .is_ok()
}

/// Public identifier of a keypair: base58 sha2-256 multihash of the public key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PeerId {
    multihash: Vec<u8>,
}

impl PeerId {
    /// Rejects keys that do not decode to a curve point and small-order keys,
    /// which could never produce a verifiable record.
    pub fn from_public_key(public_key: &[u8; 32]) -> Result<Self> {
        let key = VerifyingKey::from_bytes(public_key)
            .map_err(|e| IpfsError::KeyDerivation(format!("malformed public key: {}", e)))?;
        if key.is_weak() {
            return Err(IpfsError::KeyDerivation(
                "public key has small order".to_string(),
            ));
        }
        Ok(Self {
            multihash: HashUtils::multihash(public_key),
        })
    }

    pub fn matches_key(&self, public_key: &[u8; 32]) -> bool {
        self.multihash == HashUtils::multihash(public_key)
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(&self.multihash).into_string()
    }
}

impl FromStr for PeerId {
    type Err = IpfsError;

    fn from_str(s: &str) -> Result<Self> {
        HashUtils::parse_address(s)
            .map_err(|_| IpfsError::InvalidPath(format!("{} is not a peer ID", s)))?;
        let multihash = bs58::decode(s)
            .into_vec()
            .map_err(|e| IpfsError::InvalidPath(e.to_string()))?;
        Ok(Self { multihash })
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.to_base58())
    }
}
