pub mod block_store;
pub mod chunk;
pub mod dag;
pub mod dag_reader;
pub mod hash;
pub mod path;
pub mod pin;

pub use block_store::{Block, BlockStore, Codec};
pub use chunk::{CHUNK_SIZE, Chunker};
pub use dag::{DagNode, DagService, LeafSpan, Link, MAX_LINKS, NodeKind};
pub use dag_reader::DagReader;
pub use hash::HashUtils;
pub use path::{IPFS_PREFIX, IPNS_PREFIX, Namespace, Path};
pub use pin::{PinMode, Pinner};
