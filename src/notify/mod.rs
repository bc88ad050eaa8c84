//! Notification port and its delivery backends.
//!
//! Callers never talk to a [`Notifier`] directly; they enqueue into the
//! [`Outbox`] after their state change commits, and the
//! [`OutboxDispatcher`] delivers independently. A delivery failure can
//! therefore never roll back or fail a business operation.

use crate::domain::Notification;
use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

pub mod outbox;

pub use outbox::{DispatchReport, Outbox, OutboxDispatcher, MAX_DELIVERY_ATTEMPTS};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync + fmt::Debug {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log. Default when no webhook is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            "Notify user={} kind={} title={:?} link={:?}",
            notification.user_id,
            notification.kind.as_str(),
            notification.title,
            notification.link
        );
        Ok(())
    }
}

/// POSTs each notification as JSON to a push gateway.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError::Delivery(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

/// Keeps delivered notifications in memory; can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    delivered: Mutex<Vec<Notification>>,
    failing: Mutex<bool>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    pub fn delivered_to(&self, user_id: &str) -> Vec<Notification> {
        self.delivered()
            .into_iter()
            .filter(|n| n.user_id == user_id)
            .collect()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let failing = self.failing.lock().map(|f| *f).unwrap_or(false);
        if failing {
            return Err(NotifyError::Delivery("memory notifier forced failure".to_string()));
        }
        self.delivered
            .lock()
            .map_err(|e| NotifyError::Delivery(e.to_string()))?
            .push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NotificationKind;

    #[tokio::test]
    async fn test_memory_notifier_records_and_fails_on_demand() {
        let notifier = MemoryNotifier::new();
        let n = Notification::new("u1", NotificationKind::Info, "Hola", "Mensaje");
        notifier.notify(&n).await.unwrap();
        assert_eq!(notifier.delivered_to("u1").len(), 1);

        notifier.set_failing(true);
        assert!(notifier.notify(&n).await.is_err());
        assert_eq!(notifier.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let n = Notification::new("u1", NotificationKind::Alert, "t", "m").with_link("/x");
        assert!(LogNotifier.notify(&n).await.is_ok());
    }
}
