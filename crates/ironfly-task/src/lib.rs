//! Ironfly task manager
//!
//! Serializes mutating access to a node across conductors by using the
//! node's `reservation` field as a lock token.
//!
//! # Architecture
//!
//! ```text
//! caller ──acquire──► WorkerPool::try_admit ──► Store::reserve_node (CAS)
//!                           │                         │
//!                     NoFreeConductorWorker      NodeLocked{host}
//!                                                     │
//!                                              load ports/portgroups
//!                                                     │
//!                                                   Task ──release──► Store::release_node
//! ```
//!
//! Acquisition fails fast; [`TaskManager::acquire_with_retry`] is the
//! opt-in helper for callers that want bounded backoff on `NodeLocked`.

pub mod manager;
pub mod pool;
pub mod task;

pub use manager::{RetryPolicy, TaskManager};
pub use pool::{WorkerPermit, WorkerPool};
pub use task::Task;
