//! Background state publisher
//!
//! A single worker task delivers publications in order so event handling
//! never waits on the network. Each delivery is bounded by a timeout;
//! failures are logged and not retried.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{StateChange, StateSink};

#[derive(Debug)]
enum Job {
    Announce,
    Change(StateChange),
    Muted(bool),
    Close,
}

/// Queues state publications for a background worker
#[derive(Debug, Default)]
pub struct StatePublisher {
    tx: Option<mpsc::UnboundedSender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl StatePublisher {
    /// Start a worker delivering to `sinks`
    ///
    /// Queues a discovery announcement first. Must be called from within a
    /// tokio runtime.
    #[must_use]
    pub fn spawn(sinks: Vec<Box<dyn StateSink>>, timeout: Duration) -> Self {
        if sinks.is_empty() {
            return Self::disabled();
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                for sink in &sinks {
                    deliver(sink.as_ref(), &job, timeout).await;
                }
            }
            for sink in &sinks {
                deliver(sink.as_ref(), &Job::Close, timeout).await;
            }
            tracing::debug!("state publisher drained");
        });

        let publisher = Self {
            tx: Some(tx),
            worker: Some(worker),
        };
        publisher.send(Job::Announce);
        publisher
    }

    /// Publisher that drops everything
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Queue a state change
    pub fn publish(&self, change: StateChange) {
        self.send(Job::Change(change));
    }

    /// Queue a mute switch update
    pub fn publish_muted(&self, muted: bool) {
        self.send(Job::Muted(muted));
    }

    fn send(&self, job: Job) {
        if let Some(tx) = &self.tx
            && tx.send(job).is_err()
        {
            tracing::warn!("state publisher stopped, dropping publication");
        }
    }

    /// Deliver everything queued and stop the worker
    pub async fn close(&mut self) {
        drop(self.tx.take());
        if let Some(worker) = self.worker.take()
            && let Err(e) = worker.await
        {
            tracing::error!(error = %e, "state publisher task failed");
        }
    }
}

async fn deliver(sink: &dyn StateSink, job: &Job, timeout: Duration) {
    let result = match job {
        Job::Announce => tokio::time::timeout(timeout, sink.announce()).await,
        Job::Change(change) => tokio::time::timeout(timeout, sink.publish(change)).await,
        Job::Muted(muted) => tokio::time::timeout(timeout, sink.publish_muted(*muted)).await,
        Job::Close => tokio::time::timeout(timeout, sink.close()).await,
    };

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(sink = sink.name(), error = %e, "state publish failed");
        }
        Err(_) => {
            tracing::warn!(
                sink = sink.name(),
                timeout_ms = timeout.as_millis(),
                "state publish timed out"
            );
        }
    }
}
