//! Named-resource locking with wait-for-release semantics (spec §4.8), used
//! to coalesce concurrent renders of the same metatile (spec §4.10).

pub mod file;
pub mod memory;
pub mod traits;

pub use file::FileLocker;
pub use memory::MemoryLocker;
pub use traits::{LockHandle, LockOutcome, LockResult, Locker};
