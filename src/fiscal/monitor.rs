//! Fiscal authority status monitor.
//!
//! # Responsibilities
//! - Periodically probe the authority
//! - Record reachability (gauge and in-memory flag)
//! - Optionally enter contingency when a probe fails; never leave it

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::fiscal::client::FiscalClient;
use crate::fiscal::types::{ContingencyType, Transition};
use crate::observability::metrics;

/// Latest probe result, shared with the status endpoint.
#[derive(Debug)]
pub struct AuthorityHealth {
    online: AtomicBool,
    probed: AtomicBool,
}

impl AuthorityHealth {
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(false),
            probed: AtomicBool::new(false),
        }
    }

    /// `None` until the first probe finished.
    pub fn online(&self) -> Option<bool> {
        self.probed
            .load(Ordering::Acquire)
            .then(|| self.online.load(Ordering::Acquire))
    }

    fn record(&self, online: bool) {
        self.online.store(online, Ordering::Release);
        self.probed.store(true, Ordering::Release);
        metrics::record_authority_health(online);
    }
}

impl Default for AuthorityHealth {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FiscalStatusMonitor {
    client: Arc<FiscalClient>,
    health: Arc<AuthorityHealth>,
    interval: Duration,
    auto_enable: Option<ContingencyType>,
}

impl FiscalStatusMonitor {
    pub fn new(
        client: Arc<FiscalClient>,
        health: Arc<AuthorityHealth>,
        interval: Duration,
        auto_enable: Option<ContingencyType>,
    ) -> Self {
        Self {
            client,
            health,
            interval,
            auto_enable,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval = ?self.interval,
            auto_enable = ?self.auto_enable,
            "Fiscal status monitor starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Fiscal status monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one probe and apply its consequences.
    pub async fn probe(&self) {
        if let Err(e) = self.client.contingency().refresh().await {
            tracing::warn!(error = %e, "Contingency state refresh failed");
        }

        let online = match self.client.service_status().await {
            Ok(status) => {
                if !status.online {
                    tracing::warn!(message = ?status.message, "Fiscal authority reports offline");
                }
                status.online
            }
            Err(e) => {
                tracing::warn!(error = %e, "Fiscal status probe rejected");
                false
            }
        };

        let previous = self.health.online();
        self.health.record(online);
        if previous.is_some() && previous != Some(online) {
            tracing::info!(online, "Fiscal authority reachability changed");
        }

        if online {
            return;
        }
        let Some(kind) = self.auto_enable else {
            return;
        };

        match self.client.contingency().enable(kind, "authority unreachable").await {
            Ok(Transition::Entered(record)) => {
                tracing::warn!(kind = %record.kind, id = %record.id, "Contingency entered automatically");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Failed to enter contingency"),
        }
    }
}
