use serde::{Deserialize, Serialize};

use crate::identity::Keypair;
use crate::utils::{IpfsError, Result};

pub const DEFAULT_SWARM_PORT: u16 = 4001;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IdentityConfig {
    #[serde(rename = "PeerID")]
    pub peer_id: String,
    pub priv_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddressesConfig {
    pub swarm_port: u16,
}

impl Default for AddressesConfig {
    fn default() -> Self {
        Self {
            swarm_port: DEFAULT_SWARM_PORT,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoutingConfig {
    pub query_timeout_secs: u64,
    pub replication: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            query_timeout_secs: 10,
            replication: 20,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpnsConfig {
    pub record_lifetime_secs: u64,
    pub resolve_depth_limit: usize,
}

impl Default for IpnsConfig {
    fn default() -> Self {
        Self {
            record_lifetime_secs: crate::namesys::DEFAULT_RECORD_LIFETIME_SECS,
            resolve_depth_limit: crate::namesys::DEFAULT_DEPTH_LIMIT,
        }
    }
}

/// Contents of the repo's `config` file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RepoConfig {
    pub identity: IdentityConfig,
    #[serde(default)]
    pub addresses: AddressesConfig,
    #[serde(default)]
    pub bootstrap: Vec<String>,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub ipns: IpnsConfig,
}

impl RepoConfig {
    /// Fresh config with a newly generated node identity.
    pub fn init() -> Result<Self> {
        let key = Keypair::generate();
        let peer_id = key.peer_id()?;

        Ok(Self {
            identity: IdentityConfig {
                peer_id: peer_id.to_string(),
                priv_key: key.secret_hex(),
            },
            addresses: AddressesConfig::default(),
            bootstrap: Vec::new(),
            routing: RoutingConfig::default(),
            ipns: IpnsConfig::default(),
        })
    }

    /// The node keypair, checked against the recorded peer ID.
    pub fn keypair(&self) -> Result<Keypair> {
        let key = Keypair::from_secret_hex(&self.identity.priv_key)?;
        let derived = key.peer_id()?.to_string();
        if derived != self.identity.peer_id {
            return Err(IpfsError::ConfigError(format!(
                "identity mismatch: config says {}, key derives {}",
                self.identity.peer_id, derived
            )));
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_layout() {
        let conf = RepoConfig::init().unwrap();
        let json = serde_json::to_value(&conf).unwrap();

        assert_eq!(json["Identity"]["PeerID"], conf.identity.peer_id.as_str());
        assert_eq!(json["Addresses"]["SwarmPort"], DEFAULT_SWARM_PORT);
        assert_eq!(json["Ipns"]["ResolveDepthLimit"], 32);
        assert!(json["Routing"]["QueryTimeoutSecs"].is_u64());
    }

    #[test]
    fn test_missing_sections_default() {
        let conf = RepoConfig::init().unwrap();
        let minimal = serde_json::json!({
            "Identity": {
                "PeerID": conf.identity.peer_id,
                "PrivKey": conf.identity.priv_key,
            }
        });

        let parsed: RepoConfig = serde_json::from_value(minimal).unwrap();
        assert_eq!(parsed.addresses.swarm_port, DEFAULT_SWARM_PORT);
        assert_eq!(parsed.routing.replication, 20);
        parsed.keypair().unwrap();
    }

    #[test]
    fn test_mismatched_identity() {
        let mut conf = RepoConfig::init().unwrap();
        conf.identity.peer_id = RepoConfig::init().unwrap().identity.peer_id;
        assert!(matches!(conf.keypair(), Err(IpfsError::ConfigError(_))));
    }
}
