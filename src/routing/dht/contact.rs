use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::node_id::NodeId;

/// A peer known to the DHT, addressed by where its datagrams come from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Contact {
    pub node_id: NodeId,
    pub addr: SocketAddr,
    #[serde(skip)]
    pub last_seen: Option<Instant>,
}

impl Contact {
    /// Create a contact seen just now
    pub fn new(node_id: NodeId, addr: SocketAddr) -> Self {
        Self {
            node_id,
            addr,
            last_seen: Some(Instant::now()),
        }
    }

    /// The sender's claimed id at the address we actually heard it from.
    /// A node bound to `0.0.0.0` cannot know its own reachable address.
    pub fn observed(claimed: &Contact, from: SocketAddr) -> Self {
        Self::new(claimed.node_id, from)
    }

    /// Mark the contact as seen now
    pub fn touch(&mut self) {
        self.last_seen = Some(Instant::now());
    }

    /// Contacts decoded off the wire carry no timestamp and count as stale.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        match self.last_seen {
            Some(last_seen) => last_seen.elapsed() > max_age,
            None => true,
        }
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.node_id == other.node_id && self.addr == other.addr
    }
}

impl Eq for Contact {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observed_keeps_id_replaces_addr() {
        let claimed = Contact::new(NodeId::random(), "0.0.0.0:4001".parse().unwrap());
        let from: SocketAddr = "127.0.0.1:50000".parse().unwrap();
        let seen = Contact::observed(&claimed, from);
        assert_eq!(seen.node_id, claimed.node_id);
        assert_eq!(seen.addr, from);
        assert!(seen.last_seen.is_some());
    }

    #[test]
    fn test_staleness() {
        let mut contact = Contact::new(NodeId::random(), "127.0.0.1:8080".parse().unwrap());
        assert!(!contact.is_stale(Duration::from_secs(60)));

        contact.last_seen = None;
        assert!(contact.is_stale(Duration::from_secs(60)));
        contact.touch();
        assert!(!contact.is_stale(Duration::from_secs(60)));
    }

    #[test]
    fn test_wire_contact_is_stale() {
        let contact = Contact::new(NodeId::random(), "127.0.0.1:8080".parse().unwrap());
        let decoded: Contact =
            serde_json::from_slice(&serde_json::to_vec(&contact).unwrap()).unwrap();
        assert_eq!(decoded, contact);
        assert!(decoded.is_stale(Duration::from_secs(3600)));
    }
}
