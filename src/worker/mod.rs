//! Out-of-band execution.
//!
//! - JobDispatcher: accepts workflow ids and returns immediately
//! - ProcessorPool: background tasks pulling jobs off the shared queue
//! - RunLifecycle: per-job load / record / orchestrate / record

pub mod dispatcher;
pub mod lifecycle;
pub mod pool;

use std::sync::Arc;

pub use dispatcher::{DispatchError, Job, JobDispatcher, JobReceiver};
pub use lifecycle::{LifecycleSettings, RunLifecycle};
pub use pool::ProcessorPool;

/// Create a dispatcher wired to a freshly spawned processor pool
pub fn start(processors: usize, lifecycle: Arc<RunLifecycle>) -> (JobDispatcher, ProcessorPool) {
    let (dispatcher, receiver) = JobDispatcher::channel();
    let pool = ProcessorPool::spawn(processors, receiver, lifecycle);
    (dispatcher, pool)
}
