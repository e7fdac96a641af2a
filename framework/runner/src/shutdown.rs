use gatling_influx_core::prelude::ShutdownHandle;
use tokio::runtime::Handle;
use tokio::signal;

/// Trigger the returned handle when the operator presses Ctrl-C.
pub(crate) fn start_shutdown_listener(runtime: &Handle) -> ShutdownHandle {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Received shutdown signal, shutting down...");
                listener_handle.shutdown();
            }
            Err(e) => {
                log::error!("Failed to listen for Ctrl-C, the relay can only stop on its own: {e}");
            }
        }
    });

    handle
}
