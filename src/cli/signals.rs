//! SIGUSR1 listener for `--continue-after signal`

use crate::pipeline::completion::CompletionSignal;
use anyhow::Result;

/// Installs a SIGUSR1 handler whose first delivery releases the returned signal
#[cfg(unix)]
pub fn spawn_continue_listener() -> Result<CompletionSignal> {
    use crate::pipeline::completion::completion;
    use anyhow::Context;
    use tokio::signal::unix::{signal, SignalKind};
    use tracing::{debug, info};

    let mut stream =
        signal(SignalKind::user_defined1()).context("Failed to install SIGUSR1 handler")?;
    let (done, waiter) = completion();

    tokio::spawn(async move {
        if stream.recv().await.is_some() {
            info!("Received SIGUSR1");
            done.fire();
        } else {
            debug!("SIGUSR1 stream closed");
        }
    });

    Ok(waiter)
}

#[cfg(not(unix))]
pub fn spawn_continue_listener() -> Result<CompletionSignal> {
    anyhow::bail!("--continue-after signal is only supported on Unix")
}
