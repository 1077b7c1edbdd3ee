pub mod keyfile;
pub mod keypair;

pub use keyfile::{KeySelection, load_or_create};
pub use keypair::{Keypair, PeerId, verify_signature};
