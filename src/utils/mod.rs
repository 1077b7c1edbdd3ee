pub mod cancel;
pub mod error;
pub mod logger;

pub use cancel::{ensure_active, until_cancelled};
pub use error::{ErrorClass, IpfsError, Result};
pub use logger::{MemoryLog, NodeLogger, setup_logging};
