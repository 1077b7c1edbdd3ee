use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::contact::Contact;
use super::node_id::NodeId;

/// DHT datagrams. Every response echoes the `request_id` of its request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DhtMessage {
    Ping {
        request_id: Uuid,
        sender: Contact,
    },

    Pong {
        request_id: Uuid,
        sender: Contact,
    },

    FindNode {
        request_id: Uuid,
        sender: Contact,
        target: NodeId,
    },

    FindNodeResponse {
        request_id: Uuid,
        sender: Contact,
        contacts: Vec<Contact>,
    },

    /// Store a signed record under `key`.
    PutValue {
        request_id: Uuid,
        sender: Contact,
        key: String,
        value: Vec<u8>,
    },

    PutValueResponse {
        request_id: Uuid,
        sender: Contact,
        accepted: bool,
    },

    GetValue {
        request_id: Uuid,
        sender: Contact,
        key: String,
    },

    /// `value` when the peer holds a record, closer contacts either way.
    GetValueResponse {
        request_id: Uuid,
        sender: Contact,
        value: Option<Vec<u8>>,
        contacts: Vec<Contact>,
    },
}

impl DhtMessage {
    pub fn sender(&self) -> &Contact {
        match self {
            DhtMessage::Ping { sender, .. }
            | DhtMessage::Pong { sender, .. }
            | DhtMessage::FindNode { sender, .. }
            | DhtMessage::FindNodeResponse { sender, .. }
            | DhtMessage::PutValue { sender, .. }
            | DhtMessage::PutValueResponse { sender, .. }
            | DhtMessage::GetValue { sender, .. }
            | DhtMessage::GetValueResponse { sender, .. } => sender,
        }
    }

    pub fn request_id(&self) -> Uuid {
        match self {
            DhtMessage::Ping { request_id, .. }
            | DhtMessage::Pong { request_id, .. }
            | DhtMessage::FindNode { request_id, .. }
            | DhtMessage::FindNodeResponse { request_id, .. }
            | DhtMessage::PutValue { request_id, .. }
            | DhtMessage::PutValueResponse { request_id, .. }
            | DhtMessage::GetValue { request_id, .. }
            | DhtMessage::GetValueResponse { request_id, .. } => *request_id,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(
            self,
            DhtMessage::Ping { .. }
                | DhtMessage::FindNode { .. }
                | DhtMessage::PutValue { .. }
                | DhtMessage::GetValue { .. }
        )
    }

    pub fn is_response(&self) -> bool {
        !self.is_request()
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn decode(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn contact() -> Contact {
        let addr: SocketAddr = "127.0.0.1:4001".parse().unwrap();
        Contact::new(NodeId::random(), addr)
    }

    #[test]
    fn test_get_value_response_on_the_wire() {
        let id = Uuid::new_v4();
        let msg = DhtMessage::GetValueResponse {
            request_id: id,
            sender: contact(),
            value: Some(b"record".to_vec()),
            contacts: vec![contact()],
        };

        let decoded = DhtMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.request_id(), id);
        match decoded {
            DhtMessage::GetValueResponse {
                value, contacts, ..
            } => {
                assert_eq!(value.as_deref(), Some(&b"record"[..]));
                assert_eq!(contacts.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_is_request() {
        let ping = DhtMessage::Ping {
            request_id: Uuid::new_v4(),
            sender: contact(),
        };
        assert!(ping.is_request());

        let put = DhtMessage::PutValueResponse {
            request_id: ping.request_id(),
            sender: contact(),
            accepted: true,
        };
        assert!(put.is_response());
    }
}
