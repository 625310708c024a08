//! # Expiry Sweeper
//!
//! Removes records whose deadline has passed. Runs inline at the top of every
//! lifecycle operation; there is no background scheduler. Backend TTLs are
//! the second line of defense, so a failed sweep is logged and ignored.

use crate::clock::SharedClock;
use crate::error::{CloakError, CloakResult};
use crate::record::TokenRecord;
use crate::store::{BoxedTokenStore, Namespace};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Outcome of a single sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
}

#[derive(Clone)]
pub struct ExpirySweeper {
    store: BoxedTokenStore,
    namespace: Namespace,
    clock: SharedClock,
}

impl ExpirySweeper {
    pub fn new(store: BoxedTokenStore, namespace: Namespace, clock: SharedClock) -> Self {
        Self {
            store,
            namespace,
            clock,
        }
    }

    /// Sweep, swallowing backend failures.
    pub async fn sweep(&self) -> SweepReport {
        match self.try_sweep().await {
            Ok(report) => report,
            Err(e) => {
                warn!("Failed to sweep expired tokens: {}", e);
                SweepReport::default()
            }
        }
    }

    pub async fn try_sweep(&self) -> CloakResult<SweepReport> {
        let now = self.clock.now();
        let keys = self.store.list_keys(&self.namespace.key_prefix()).await?;
        let mut report = SweepReport {
            scanned: keys.len(),
            removed: 0,
        };

        for key in &keys {
            let record = match self.store.get(key).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(CloakError::Serialization(e)) => {
                    warn!("Skipping unreadable token record {}: {}", key, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            if is_past_deadline(&record, now) && self.store.delete(key).await? {
                report.removed += 1;
            }
        }

        if report.removed > 0 {
            debug!(
                "Swept {} expired tokens out of {}",
                report.removed, report.scanned
            );
        }

        Ok(report)
    }
}

fn is_past_deadline(record: &TokenRecord, now: DateTime<Utc>) -> bool {
    record.expires_at < now
}
