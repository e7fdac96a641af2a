use std::sync::Arc;

use tokio::sync::watch;

/// Requests a cooperative shutdown of whatever is listening to it.
///
/// The request is sticky: listeners created after [ShutdownHandle::shutdown] was called still see
/// it, and checking it does not consume it. Each pipeline stage owns its own handle so that stages
/// can be stopped one at a time.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: Arc::new(watch::channel(false).0),
        }
    }

    pub fn shutdown(&self) {
        if self.sender.send_replace(true) {
            log::trace!("Shutdown was already requested");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe())
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: watch::Receiver<bool>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: watch::Receiver<bool>) -> Self {
        Self { receiver }
    }

    /// Point in time check if shutdown has been requested. If this returns true then work should
    /// be stopped at the next convenient point.
    ///
    /// A listener whose handle has been dropped reports shutdown, nothing is left that could keep
    /// it running.
    pub fn should_shutdown(&self) -> bool {
        *self.receiver.borrow() || self.receiver.has_changed().is_err()
    }

    /// Wait until shutdown is requested. It is safe to race this with another future so that the
    /// shutdown request can be used to cancel other work in progress.
    pub async fn wait_for_shutdown(&mut self) {
        if self.receiver.wait_for(|stop| *stop).await.is_err() {
            log::trace!("Shutdown handle dropped, treating it as a shutdown request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn listener_starts_running() {
        let handle = ShutdownHandle::new();
        let listener = handle.new_listener();

        assert!(!listener.should_shutdown());
        assert!(!handle.is_shutdown());
    }

    #[test]
    fn shutdown_is_visible_to_existing_and_late_listeners() {
        let handle = ShutdownHandle::new();
        let early = handle.new_listener();

        handle.shutdown();
        let late = handle.new_listener();

        assert!(early.should_shutdown());
        assert!(late.should_shutdown());
        // Checking does not consume the request
        assert!(early.should_shutdown());
    }

    #[test]
    fn dropped_handle_counts_as_shutdown() {
        let handle = ShutdownHandle::new();
        let listener = handle.new_listener();
        drop(handle);

        assert!(listener.should_shutdown());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_shutdown_wakes_on_request() {
        let handle = ShutdownHandle::new();
        let mut listener = handle.new_listener();

        let waiter = tokio::spawn(async move { listener.wait_for_shutdown().await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!waiter.is_finished());

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("listener did not wake up")
            .unwrap();
    }

    #[tokio::test]
    async fn wait_for_shutdown_returns_immediately_when_already_requested() {
        let handle = ShutdownHandle::new();
        handle.shutdown();

        let mut listener = handle.new_listener();
        listener.wait_for_shutdown().await;
        // Can be awaited again without blocking
        listener.wait_for_shutdown().await;
    }
}
