// Shutdown: best-effort cancellation of every resting grid order

use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{info, warn};

use crate::core::engine::GridEngine;

impl GridEngine {
    /// Spawn a cancel for every live order of every grid and return at once.
    /// Fills seen afterwards no longer re-arm grids, and placements that
    /// complete afterwards are cancelled. Returns the number of cancels spawned.
    pub fn cancel_all_live(&self) -> usize {
        self.ctx.stopping.store(true, Ordering::SeqCst);

        let mut spawned = 0;
        for (symbol, grid) in self.ctx.grids.iter() {
            let live = grid.lock().live_orders();
            for (_, order_id) in live {
                self.spawn_cancel(symbol, order_id);
                spawned += 1;
            }
        }
        info!("🛑 Cancelling {} live orders", spawned);
        spawned
    }

    /// Cancel everything, then give pending tasks up to `window` to finish.
    /// Returns false if the window elapsed first; leftover orders stay resting.
    pub async fn shutdown(&self, window: Duration) -> bool {
        self.cancel_all_live();
        match tokio::time::timeout(window, self.drain()).await {
            Ok(()) => {
                info!("✅ All pending order work finished");
                true
            }
            Err(_) => {
                warn!("⏱️ Tasks still pending after {:?}, some orders may remain open", window);
                false
            }
        }
    }
}
