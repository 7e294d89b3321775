//! Cross-context and cross-thread synchronization.
//!
//! - `ShareSynchronizer` orders GPU writes and reads of a resource shared by
//!   two contexts with fences.
//! - `Rendezvous` is the blocking handoff used when a task's resources are
//!   released from the UI thread.

mod rendezvous;
mod share;

pub use rendezvous::Rendezvous;
pub(crate) use rendezvous::SignalOnDrop;
pub use share::{ShareSynchronizer, UpdateScope, UsageScope};
