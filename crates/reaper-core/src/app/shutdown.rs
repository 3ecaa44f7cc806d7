//! Shutdown - 協調的な停止
//!
//! `ShutdownHandle::request` raises a flag that every `Shutdown` clone can
//! observe. Nothing is cancelled forcibly: workers look at the flag between
//! batches, and the controller's inter-cycle sleep wakes up early.

use std::sync::Arc;

use tokio::sync::watch;

/// Sending side, owned by whoever receives the termination signal.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn request(&self) {
        // send_replace never fails, even with no receiver left
        self.tx.send_replace(true);
    }
}

/// Receiving side, cloned into every worker.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// A flag that is never raised.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once stop is requested. Never resolves if the handle is
    /// gone without having requested it.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx: Arc::new(tx) }, Shutdown { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn request_is_seen_by_every_clone() {
        let (handle, shutdown) = channel();
        let other = shutdown.clone();
        assert!(!shutdown.is_stopped());

        handle.request();
        assert!(shutdown.is_stopped());
        assert!(other.is_stopped());
    }

    #[tokio::test]
    async fn wait_returns_when_already_requested() {
        let (handle, shutdown) = channel();
        handle.request();
        shutdown.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn wait_wakes_on_request() {
        let (handle, shutdown) = channel();
        let waiter = tokio::spawn(async move { shutdown.wait().await });

        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.request();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn never_does_not_fire() {
        let shutdown = Shutdown::never();
        assert!(!shutdown.is_stopped());
        let fired = tokio::time::timeout(Duration::from_secs(3600), shutdown.wait()).await;
        assert!(fired.is_err());
    }
}
