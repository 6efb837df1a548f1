mod error;
mod mem;
mod store;
mod types;
mod zfs;

pub use error::SnapshotError;
pub use mem::MemoryStore;
pub use store::SnapshotStore;
pub use types::Subvolume;
pub use zfs::ZfsStore;
