//! Host-side collaborators for running the worker from a terminal.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use anyplace_core::{Notification, Notifier, WorkerHost};
use async_trait::async_trait;
use tracing::info;

/// Prints notifications to stderr; there is no desktop integration.
pub struct TerminalNotifier;

#[async_trait]
impl Notifier for TerminalNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        info!(tag = %notification.tag, "Showing notification");
        let actions: Vec<&str> = notification.actions.iter().map(|a| a.title.as_str()).collect();
        eprintln!(
            "[{}] {}  ({})",
            notification.title,
            notification.body,
            actions.join(" / ")
        );
        Ok(())
    }
}

/// A single-process host: there are no other worker versions or pages, so
/// skip-waiting and claim only record that they happened.
#[derive(Default)]
pub struct TerminalHost {
    skipped_waiting: AtomicBool,
    claimed: AtomicBool,
}

impl TerminalHost {
    pub fn skipped_waiting(&self) -> bool {
        self.skipped_waiting.load(Ordering::Relaxed)
    }

    pub fn claimed(&self) -> bool {
        self.claimed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl WorkerHost for TerminalHost {
    async fn skip_waiting(&self) -> Result<()> {
        self.skipped_waiting.store(true, Ordering::Relaxed);
        info!("Skipped waiting");
        Ok(())
    }

    async fn claim_clients(&self) -> Result<()> {
        self.claimed.store(true, Ordering::Relaxed);
        info!("Claimed clients");
        Ok(())
    }

    /// The `watch` command drives periodic sync on a timer.
    fn supports_periodic_sync(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_host_records_calls() {
        let host = TerminalHost::default();
        assert!(!host.skipped_waiting());
        host.skip_waiting().await.unwrap();
        host.claim_clients().await.unwrap();
        assert!(host.skipped_waiting());
        assert!(host.claimed());
        assert!(host.supports_periodic_sync());
    }

    #[tokio::test]
    async fn test_notifier_succeeds() {
        let notification = Notification::new_data(3);
        assert!(TerminalNotifier.notify(&notification).await.is_ok());
    }
}
