//! Shutdown signal handling for the harness.
//!
//! A run normally ends when every producer has sent its messages. A signal
//! cuts it short: producers stop after their current message and whatever is
//! already queued on the dispatcher is still drained before statistics are
//! reported.

use std::fmt;

use tokio::signal;

/// The signal that ended a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT on Unix, Ctrl+C on Windows
    Interrupt,
    /// SIGTERM, Unix only
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("SIGINT"),
            Self::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Waits for the process to be asked to stop.
///
/// The handlers are installed on first poll, so create the future before the
/// run starts and poll it alongside the pump loop.
///
/// # Platform Support
///
/// * **Unix platforms**: SIGINT and SIGTERM
/// * **Windows**: Ctrl+C only
///
/// # Returns
///
/// The signal received, or an error if a handler could not be installed.
pub async fn wait_for_shutdown() -> anyhow::Result<ShutdownSignal> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        let received = tokio::select! {
            _ = interrupt.recv() => ShutdownSignal::Interrupt,
            _ = terminate.recv() => ShutdownSignal::Terminate,
        };
        Ok(received)
    }

    #[cfg(windows)]
    {
        signal::ctrl_c().await?;
        Ok(ShutdownSignal::Interrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_names() {
        assert_eq!(ShutdownSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(ShutdownSignal::Terminate.to_string(), "SIGTERM");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pending_until_signalled() {
        let waiting = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            wait_for_shutdown(),
        )
        .await;
        assert!(waiting.is_err());
    }
}
