//! Mini IPFS Library
//!
//! A content-addressed block store with signed, mutable names published over
//! a small Kademlia DHT, driven through a single [`Session`] facade.

pub mod core;
pub mod identity;
pub mod namesys;
pub mod repo;
pub mod routing;
pub mod storage;
pub mod utils;

// Re-export main types
pub use core::{Config, Session, SessionState};
pub use identity::{KeySelection, Keypair, PeerId};
pub use storage::{DagReader, Path};
pub use utils::{
    ErrorClass, MemoryLog, NodeLogger, setup_logging,
    error::{IpfsError, Result},
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
