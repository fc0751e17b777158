//! Lazy expiry of unpaid manual-payment sessions
//!
//! There is no background timer. The sweep runs at the start of listings,
//! proof submission, order creation and the admin review queue, so an
//! overdue session stays `payment_pending` in storage until the next such
//! request. Proof submission re-checks `payment_due_at` itself and never
//! depends on the sweep having run.

use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::errors::Result;
use crate::metrics;
use crate::store::SessionStore;

#[derive(Clone)]
pub struct ExpirySweeper {
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
}

impl ExpirySweeper {
    pub fn new(sessions: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { sessions, clock }
    }

    /// Cancel every overdue manual session; returns how many changed
    pub async fn sweep(&self) -> Result<u64> {
        let expired = self.sessions.expire_overdue_manual(self.clock.now()).await?;
        if expired > 0 {
            info!(expired, "Expired overdue manual-payment sessions");
            metrics::record_expired(expired);
        }
        Ok(expired)
    }

    /// Sweep for read paths: failures are logged and the read continues
    pub async fn sweep_best_effort(&self) {
        if let Err(e) = self.sweep().await {
            warn!(error = %e, "Manual-payment expiry sweep failed");
        }
    }
}
