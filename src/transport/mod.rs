//! Zero-copy bulk-transfer seam (spec.md §1, §4.2) and the in-process
//! reference transport this crate exercises itself with.

pub mod local;
pub mod traits;
pub mod wire;

pub use local::{BatchPayload, FeedPayload, LocalBulk};
pub use traits::{BulkHandle, BulkRef};
