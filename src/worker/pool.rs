//! Background processors consuming dispatched jobs.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::dispatcher::JobReceiver;
use super::lifecycle::RunLifecycle;

/// A fixed set of processor tasks sharing one job queue
#[derive(Debug)]
pub struct ProcessorPool {
    handles: Vec<JoinHandle<()>>,
}

impl ProcessorPool {
    /// Start `processors` tasks (at least one)
    pub fn spawn(processors: usize, receiver: JobReceiver, lifecycle: Arc<RunLifecycle>) -> Self {
        let count = processors.max(1);
        let handles = (0..count)
            .map(|n| tokio::spawn(process_jobs(n, receiver.clone(), lifecycle.clone())))
            .collect();

        info!(processors = count, "Processor pool started");
        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait until every processor has drained the queue and stopped
    ///
    /// Processors stop once all dispatchers have been dropped.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Processor task failed");
            }
        }
        info!("Processor pool stopped");
    }
}

async fn process_jobs(processor: usize, receiver: JobReceiver, lifecycle: Arc<RunLifecycle>) {
    loop {
        // Hold the lock only while waiting for the next job
        let job = { receiver.lock().await.recv().await };
        let Some(job) = job else {
            break;
        };

        debug!(processor, job_id = %job.id, "Picked up job");

        // Run in its own task so a panicking step cannot take the processor down
        let lifecycle = lifecycle.clone();
        let job_id = job.id;
        let outcome = tokio::spawn(async move { lifecycle.process(&job).await }).await;
        if let Err(e) = outcome {
            error!(processor, %job_id, error = %e, "Job aborted");
        }
    }

    debug!(processor, "Processor stopped");
}
