#![warn(missing_docs)]

//! STAF thread manager: a growable pool of worker threads
//!
//! Work items are closures dispatched to an idle worker. When no worker is
//! idle the pool grows by its growth delta, or rejects the item if the
//! delta is zero. Threads come from `staf_osif::thread`, so they honour the
//! configured stack size.

pub mod pool;

pub use pool::{DispatchOutcome, ThreadManager};
pub use staf_osif::{OsError, OsResult};
