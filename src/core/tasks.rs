// Engine-owned set of background reaction tasks

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::error;

/// Every send / cancel / confirmation the engine starts lives here, so
/// pending work can be counted, reaped and drained instead of leaking as
/// detached tasks. A panicking task is caught at its boundary and logged
/// with its label; it never takes the engine down.
#[derive(Default)]
pub struct TaskSet {
    set: Mutex<JoinSet<()>>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a labelled task. Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, label: impl Into<String>, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let label = label.into();
        self.set.lock().spawn(async move {
            if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
                error!(task = %label, "💥 Background task panicked: {}", panic_message(&panic));
            }
        });
    }

    /// Number of tasks spawned and not yet reaped
    pub fn len(&self) -> usize {
        self.set.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.lock().is_empty()
    }

    /// Collect finished tasks without waiting. Returns how many were reaped.
    pub fn reap(&self) -> usize {
        let mut set = self.set.lock();
        let mut reaped = 0;
        while let Some(result) = set.try_join_next() {
            reaped += 1;
            if let Err(e) = result {
                error!("💥 Background task failed: {}", e);
            }
        }
        reaped
    }

    /// Wait until every task, including tasks spawned while draining, is done
    pub async fn drain(&self) {
        loop {
            let mut batch = std::mem::take(&mut *self.set.lock());
            if batch.is_empty() {
                return;
            }
            while let Some(result) = batch.join_next().await {
                if let Err(e) = result {
                    error!("💥 Background task failed: {}", e);
                }
            }
        }
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
