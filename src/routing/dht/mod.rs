//! Kademlia-style DHT over UDP, used to replicate and look up naming records.

mod contact;
mod dht_node;
mod node_id;
mod routing_table;
mod rpc;

pub use contact::Contact;
pub use dht_node::{DhtConfig, DhtNode, DhtRouting};
pub use node_id::NodeId;
pub use rpc::DhtMessage;
