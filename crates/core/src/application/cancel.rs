// Run Cancellation Token

use tokio::sync::watch;

/// Cancellation signal handed to a run. Cloneable so every awaited phase can
/// race against it.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for cancellation. Resolves immediately when already cancelled;
    /// pends forever if the handle was dropped without cancelling, so racing
    /// this future never produces a spurious wakeup.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Cancellation sender
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal cancellation to the run
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a cancellation channel
pub fn cancel_channel() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_resolves_after_cancel() {
        let (handle, mut token) = cancel_channel();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
        // Must resolve even though cancellation happened before the wait
        tokio::time::timeout(Duration::from_secs(1), token.wait())
            .await
            .expect("wait should resolve after cancel");
    }

    #[tokio::test]
    async fn test_wait_pends_when_handle_dropped_uncancelled() {
        let (handle, mut token) = cancel_channel();
        drop(handle);
        let waited =
            tokio::time::timeout(Duration::from_millis(50), token.wait()).await;
        assert!(waited.is_err(), "wait must not resolve without a cancel");
        assert!(!token.is_cancelled());
    }
}
