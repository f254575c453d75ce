// Timer abstraction for the ownership grace period

use std::time::Duration;

use async_trait::async_trait;

/// Source of delays for the dispatcher. Production uses the tokio clock;
/// tests substitute timers they can fire by hand.
#[async_trait]
pub trait GraceTimer: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

#[async_trait]
impl GraceTimer for TokioTimer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
