pub mod config;
pub mod init;
pub mod node;
pub mod session;

pub use config::Config;
pub use node::{BuildCfg, Node};
pub use session::{RESOLVE_DEPTH, Session, SessionState};
