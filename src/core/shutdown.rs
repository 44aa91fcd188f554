//! Termination signals for `Manager::run_until_signal`.
//!
//! A controller process usually runs under a supervisor (systemd, a kubelet) that asks it
//! to stop with SIGTERM; interactive runs send SIGINT. Both start the same graceful path.

/// Resolves once the process is asked to terminate.
///
/// Unix listens for SIGINT, SIGTERM and SIGQUIT; other targets only for Ctrl-C. Fails when
/// a handler cannot be registered, in which case the caller shuts down right away.
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use futures::stream::{FuturesUnordered, StreamExt};
        use tokio::signal::unix::{SignalKind, signal};

        let mut first = FuturesUnordered::new();
        for kind in [SignalKind::interrupt(), SignalKind::terminate(), SignalKind::quit()] {
            let mut stream = signal(kind)?;
            first.push(async move {
                stream.recv().await;
            });
        }
        first.next().await;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
