//! Process lifecycle: shutdown broadcast, OS signals, fail-fast exit
//!
//! A single `ShutdownTrigger` fans out to any number of `Shutdown` handles.
//! Dropping the trigger counts as a shutdown too, so handles never wait on a
//! sender that no longer exists.
//!
//! Created: 2026-02-03

use anyhow::Result;
use futures::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::fmt::Display;
use tokio::sync::watch;
use tracing::{error, info};

/// Create a linked trigger/handle pair.
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Broadcast side, owned by the driver
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receive side, cloned into every background task
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once shutdown was broadcast or the trigger was dropped.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Block until SIGINT or SIGTERM arrives.
pub async fn wait_for_signal() -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    if let Some(sig) = signals.next().await {
        let name = if sig == SIGINT { "SIGINT" } else { "SIGTERM" };
        info!("{} received, shutting down...", name);
    }
    signals.handle().close();
    Ok(())
}

/// Fatal failure: log and terminate the process immediately.
pub fn fatal(context: &str, err: impl Display) -> ! {
    error!("FATAL: {}: {}", context, err);
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_resolves_on_trigger() {
        let (trigger, mut shutdown) = shutdown_channel();
        let mut other = shutdown.clone();
        assert!(!shutdown.is_triggered());

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .expect("wait should resolve after trigger");
        tokio::time::timeout(Duration::from_secs(1), other.wait())
            .await
            .expect("every clone sees the broadcast");
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_wait_resolves_when_trigger_dropped() {
        let (trigger, mut shutdown) = shutdown_channel();
        drop(trigger);
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .expect("dropped trigger counts as shutdown");
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_trigger() {
        let (trigger, _shutdown) = shutdown_channel();
        trigger.trigger();
        let mut late = trigger.subscribe();
        tokio::time::timeout(Duration::from_secs(1), late.wait())
            .await
            .expect("subscriber created after the trigger still resolves");
    }
}
