//! Retention Sweeps
//!
//! Periodic cleanup of expired and aged-out records: scheduled message
//! expiry, old messages, old notifications and old rejected friend
//! requests. Each sweep is an unconditional bulk delete, idempotent and
//! safe to run concurrently with live traffic.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::error::Result;
use crate::store::{FriendRequestStore, MessageStore, NotificationStore, Store};

/// What one sweep pass removed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_messages: u64,
    pub aged_messages: u64,
    pub aged_notifications: u64,
    pub aged_rejected_requests: u64,
}

impl SweepReport {
    pub fn total(&self) -> u64 {
        self.expired_messages
            + self.aged_messages
            + self.aged_notifications
            + self.aged_rejected_requests
    }
}

/// Periodic retention sweeper
#[derive(Clone)]
pub struct Sweeper {
    store: Arc<dyn Store>,
    message_retention: Duration,
    notification_retention: Duration,
    rejected_request_retention: Duration,
    interval: std::time::Duration,
}

impl Sweeper {
    pub fn new(store: Arc<dyn Store>, settings: &Settings) -> Self {
        Self {
            store,
            message_retention: Duration::days(settings.message_retention_days),
            notification_retention: Duration::days(settings.notification_retention_days),
            rejected_request_retention: Duration::days(settings.rejected_request_retention_days),
            interval: settings.sweep_interval,
        }
    }

    /// Run every sweep once
    ///
    /// The sweeps are independent; a failure in one aborts the pass but
    /// the next pass starts clean.
    pub async fn run_once(&self) -> Result<SweepReport> {
        let now = Utc::now();
        let report = SweepReport {
            expired_messages: self.store.delete_expired(now).await?,
            aged_messages: MessageStore::delete_created_before(
                self.store.as_ref(),
                now - self.message_retention,
            )
            .await?,
            aged_notifications: NotificationStore::delete_created_before(
                self.store.as_ref(),
                now - self.notification_retention,
            )
            .await?,
            aged_rejected_requests: self
                .store
                .delete_rejected_before(now - self.rejected_request_retention)
                .await?,
        };
        if report.total() > 0 {
            tracing::info!(
                expired = report.expired_messages,
                aged_messages = report.aged_messages,
                aged_notifications = report.aged_notifications,
                aged_rejected_requests = report.aged_rejected_requests,
                "retention sweep removed records"
            );
        }
        Ok(report)
    }

    /// Run sweeps on a fixed interval until the task is aborted
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::warn!(error = %e, "retention sweep failed, will retry next interval");
                }
            }
        })
    }
}
