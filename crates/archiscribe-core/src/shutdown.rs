//! Graceful shutdown via cancellation token

use tokio_util::sync::CancellationToken;

/// Cancel `token` on the first Ctrl-C (SIGINT).
///
/// Must be called from inside a tokio runtime.
pub fn cancel_on_ctrl_c(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => {
                    log::warn!("Interrupt received, shutting down");
                    token.cancel();
                }
                Err(e) => log::error!("Cannot listen for Ctrl-C: {e}"),
            },
            () = token.cancelled() => {}
        }
    });
}
