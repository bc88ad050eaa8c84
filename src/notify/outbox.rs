//! Transactional outbox for notifications.

use super::Notifier;
use crate::db::{OutboxRow, Repository};
use crate::domain::{Notification, TimeMs};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A row is abandoned after this many failed deliveries.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

/// Write side of the outbox. Enqueueing never fails the caller.
#[derive(Debug, Clone)]
pub struct Outbox {
    repo: Arc<Repository>,
}

impl Outbox {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    pub async fn enqueue(&self, notification: Notification) {
        if let Err(e) = self
            .repo
            .insert_notification(&notification, TimeMs::now())
            .await
        {
            warn!(
                "Dropping notification {} for user={}: {}",
                notification.id, notification.user_id, e
            );
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct OutboxDispatcher {
    repo: Arc<Repository>,
    notifier: Arc<dyn Notifier>,
    max_attempts: u32,
}

impl OutboxDispatcher {
    pub fn new(repo: Arc<Repository>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            repo,
            notifier,
            max_attempts: MAX_DELIVERY_ATTEMPTS,
        }
    }

    /// Deliver up to `limit` pending rows concurrently.
    pub async fn dispatch_pending(&self, limit: u32) -> Result<DispatchReport, sqlx::Error> {
        let rows = self
            .repo
            .pending_notifications(limit, self.max_attempts)
            .await?;
        if rows.is_empty() {
            return Ok(DispatchReport::default());
        }
        debug!("Dispatching {} outbox rows", rows.len());

        let outcomes = join_all(rows.iter().map(|row| self.deliver(row))).await;

        let mut report = DispatchReport::default();
        for outcome in outcomes {
            match outcome? {
                true => report.delivered += 1,
                false => report.failed += 1,
            }
        }
        Ok(report)
    }

    async fn deliver(&self, row: &OutboxRow) -> Result<bool, sqlx::Error> {
        let id = row.notification.id.as_str();
        match self.notifier.notify(&row.notification).await {
            Ok(()) => {
                self.repo.mark_delivered(id, TimeMs::now()).await?;
                Ok(true)
            }
            Err(e) => {
                let attempt = row.attempts + 1;
                if attempt >= self.max_attempts {
                    warn!(
                        "Giving up on notification {} after {} attempts: {}",
                        id, attempt, e
                    );
                } else {
                    warn!("Notification {} attempt {} failed: {}", id, attempt, e);
                }
                self.repo.record_delivery_failure(id, &e.to_string()).await?;
                Ok(false)
            }
        }
    }

    /// Poll forever, dispatching every `interval`.
    pub async fn run(self, interval: Duration, batch: u32) {
        info!("Outbox dispatcher started, interval={:?}", interval);
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.dispatch_pending(batch).await {
                warn!("Outbox dispatch failed: {}", e);
            }
        }
    }
}
