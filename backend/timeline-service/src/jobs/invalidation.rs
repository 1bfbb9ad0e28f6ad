//! Publish-time cache invalidation worker
//!
//! Publish notifications are queued on a bounded channel and drained by one
//! background task, so the publish call returns before the fan-out runs.
//! A full queue drops the notification; affected pages then expire by TTL.

use crate::cache::TimelineCache;
use crate::metrics;
use crate::models::Post;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct InvalidationDispatcher {
    tx: mpsc::Sender<Post>,
}

impl InvalidationDispatcher {
    /// Start the worker on the current Tokio runtime
    pub fn spawn(cache: Arc<TimelineCache>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_worker(cache, rx));

        info!(capacity = capacity.max(1), "Timeline invalidation worker started");
        (Self { tx }, handle)
    }

    /// Queue an invalidation for `post`. Returns false when the notification was dropped.
    pub fn dispatch(&self, post: Post) -> bool {
        match self.tx.try_send(post) {
            Ok(()) => true,
            Err(TrySendError::Full(post)) => {
                warn!(post_id = %post.id, "Invalidation queue full, dropping notification");
                metrics::record_dropped_invalidation();
                false
            }
            Err(TrySendError::Closed(post)) => {
                warn!(post_id = %post.id, "Invalidation worker stopped, dropping notification");
                metrics::record_dropped_invalidation();
                false
            }
        }
    }
}

async fn run_worker(cache: Arc<TimelineCache>, mut rx: mpsc::Receiver<Post>) {
    while let Some(post) = rx.recv().await {
        let report = cache.invalidate_for_new_post(&post).await;
        debug!(
            post_id = %post.id,
            viewers = report.viewers,
            failures = report.failures,
            "Processed publish notification"
        );
    }

    info!("Timeline invalidation worker stopped");
}
