//! Turning process signals into cooperative cancellation
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{Error, Result};

/// A token cancelled on the first ctrl-c or SIGTERM
///
/// Handlers are installed before returning so a signal arriving right after
/// this call is not lost. Must be called from within a tokio runtime.
pub fn on_signal() -> Result<CancellationToken> {
    let token = CancellationToken::new();
    let trigger = token.clone();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        // local development needs listening for ctrl_c
        let mut sigint = signal(SignalKind::interrupt()).map_err(Error::Signal)?;
        // kubernetes apps need to listen for SIGTERM
        let mut sigterm = signal(SignalKind::terminate()).map_err(Error::Signal)?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => warn!("Intercepted ctrl_c signal"),
                _ = sigterm.recv() => warn!("Intercepted SIGTERM"),
            }
            trigger.cancel();
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => warn!("Intercepted ctrl_c signal"),
            Err(err) => warn!(error = %Error::Signal(err), "ctrl_c handler failed, shutting down"),
        }
        trigger.cancel();
    });

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_starts_uncancelled() {
        let token = on_signal().unwrap();
        assert!(!token.is_cancelled());
        let child = token.child_token();
        token.cancel();
        assert!(child.is_cancelled());
    }
}
