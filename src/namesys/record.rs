use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::{Keypair, PeerId, verify_signature};
use crate::routing::RecordValidator;
use crate::storage::Path;
use crate::utils::{IpfsError, Result};

pub const IPNS_KEY_PREFIX: &str = "/ipns/";

/// Routing key under which `peer_id`'s record lives.
pub fn record_key(peer_id: &PeerId) -> String {
    format!("{}{}", IPNS_KEY_PREFIX, peer_id)
}

/// Signed binding of a peer ID to a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpnsRecord {
    pub value: String,
    pub sequence: u64,
    /// RFC 3339 end of life, signed as written.
    pub validity: String,
    pub public_key: String,
    pub signature: String,
}

impl IpnsRecord {
    pub fn create(key: &Keypair, value: &Path, sequence: u64, lifetime: Duration) -> Self {
        let value = value.to_string();
        let validity = (Utc::now() + lifetime).to_rfc3339_opts(SecondsFormat::Nanos, true);
        let signature = key.sign(&Self::signing_bytes(&value, &validity, sequence));

        Self {
            value,
            sequence,
            validity,
            public_key: hex::encode(key.public_key_bytes()),
            signature: hex::encode(signature),
        }
    }

    fn signing_bytes(value: &str, validity: &str, sequence: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(value.len() + validity.len() + 11);
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(validity.as_bytes());
        out.extend_from_slice(b"EOL");
        out.extend_from_slice(&sequence.to_be_bytes());
        out
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| IpfsError::InvalidRecord(format!("undecodable record: {}", e)))
    }

    pub fn expires_at(&self) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.validity)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| IpfsError::InvalidRecord(format!("bad validity: {}", e)))
    }

    pub fn path(&self) -> Result<Path> {
        Path::parse(&self.value)
    }

    /// Signature, key-to-name binding and expiry.
    pub fn verify(&self, name: &PeerId) -> Result<()> {
        let public_key: [u8; 32] = hex::decode(&self.public_key)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| IpfsError::InvalidRecord("bad public key".to_string()))?;
        if !name.matches_key(&public_key) {
            return Err(IpfsError::InvalidRecord(format!(
                "record key does not belong to {}",
                name
            )));
        }

        let signature: [u8; 64] = hex::decode(&self.signature)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| IpfsError::InvalidRecord("bad signature encoding".to_string()))?;
        let message = Self::signing_bytes(&self.value, &self.validity, self.sequence);
        if !verify_signature(&public_key, &message, &signature) {
            return Err(IpfsError::InvalidRecord(format!(
                "bad signature on record for {}",
                name
            )));
        }

        if self.expires_at()? <= Utc::now() {
            return Err(IpfsError::InvalidRecord(format!("record for {} expired", name)));
        }
        Ok(())
    }
}

/// Accepts only well-signed, unexpired records under `/ipns/<peer id>` and
/// prefers the highest sequence, then the later expiry.
pub struct IpnsValidator;

impl IpnsValidator {
    fn name_of(key: &str) -> Result<PeerId> {
        key.strip_prefix(IPNS_KEY_PREFIX)
            .ok_or_else(|| IpfsError::InvalidRecord(format!("{} is not an IPNS key", key)))?
            .parse()
            .map_err(|_| IpfsError::InvalidRecord(format!("{} does not name a peer", key)))
    }
}

impl RecordValidator for IpnsValidator {
    fn validate(&self, key: &str, value: &[u8]) -> Result<()> {
        let name = Self::name_of(key)?;
        IpnsRecord::decode(value)?.verify(&name)
    }

    fn select(&self, _key: &str, values: &[Vec<u8>]) -> Result<usize> {
        let mut best: Option<(usize, u64, DateTime<Utc>)> = None;
        for (i, value) in values.iter().enumerate() {
            let record = IpnsRecord::decode(value)?;
            let expires = record.expires_at()?;
            let better = match best {
                None => true,
                Some((_, seq, eol)) => (record.sequence, expires) > (seq, eol),
            };
            if better {
                best = Some((i, record.sequence, expires));
            }
        }
        best.map(|(i, _, _)| i)
            .ok_or_else(|| IpfsError::NotFound("no candidate records".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::HashUtils;

    fn target() -> Path {
        Path::ipfs(&HashUtils::content_address(b"target"))
    }

    #[test]
    fn test_signed_record_verifies() {
        let key = Keypair::generate();
        let name = key.peer_id().unwrap();
        let record = IpnsRecord::create(&key, &target(), 0, Duration::hours(1));

        let decoded = IpnsRecord::decode(&record.encode().unwrap()).unwrap();
        decoded.verify(&name).unwrap();
        assert_eq!(decoded.path().unwrap(), target());
        IpnsValidator
            .validate(&record_key(&name), &record.encode().unwrap())
            .unwrap();
    }

    #[test]
    fn test_tampered_and_foreign_records_fail() {
        let key = Keypair::generate();
        let name = key.peer_id().unwrap();
        let mut record = IpnsRecord::create(&key, &target(), 0, Duration::hours(1));
        record.sequence = 9;
        assert!(record.verify(&name).is_err());

        let other = Keypair::generate().peer_id().unwrap();
        let record = IpnsRecord::create(&key, &target(), 0, Duration::hours(1));
        assert!(record.verify(&other).is_err());
    }

    #[test]
    fn test_expired_record_fails() {
        let key = Keypair::generate();
        let record = IpnsRecord::create(&key, &target(), 0, Duration::seconds(-1));
        assert!(matches!(
            record.verify(&key.peer_id().unwrap()),
            Err(IpfsError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_select_prefers_sequence() {
        let key = Keypair::generate();
        let k = record_key(&key.peer_id().unwrap());
        let old = IpnsRecord::create(&key, &target(), 1, Duration::hours(48));
        let new = IpnsRecord::create(&key, &target(), 2, Duration::hours(1));
        let values = vec![old.encode().unwrap(), new.encode().unwrap()];
        assert_eq!(IpnsValidator.select(&k, &values).unwrap(), 1);
    }

    #[test]
    fn test_bad_keys() {
        assert!(IpnsValidator.validate("/pk/abc", b"{}").is_err());
        assert!(IpnsValidator.validate("/ipns/not-a-peer", b"{}").is_err());
    }
}
