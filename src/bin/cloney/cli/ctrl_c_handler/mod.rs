use tokio::task::JoinHandle;
use tokio::{select, signal};
use tracing::{debug, error, warn};

use cloney::types::token::PipelineCancellationToken;

/// Cancels the pipeline on the first ctrl-c. Workers finish the unit they are on as a failure and
/// the remaining queued units are reported as cancelled.
pub fn spawn_ctrl_c_handler(cancellation_token: PipelineCancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        select! {
            _ = cancellation_token.cancelled() => {
                debug!("pipeline finished or cancelled. ctrl-c handler stopped.")
            }
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("failed to listen for ctrl-c signal: {e}");
                    return;
                }

                warn!("ctrl-c received, cancelling remaining transfers.");
                cancellation_token.cancel();
            }
        }
    })
}
