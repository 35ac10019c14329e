use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Which signal ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

fn install(kind: SignalKind, label: &str) -> Option<Signal> {
    match signal(kind) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!("Failed to create {} handler: {}", label, e);
            None
        }
    }
}

async fn recv(slot: &mut Option<Signal>) {
    match slot {
        Some(s) => {
            if s.recv().await.is_none() {
                // Stream closed with the runtime
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

/// Cancel `token` on the first SIGINT or SIGTERM.
///
/// Handlers are installed before this returns, so a signal arriving right
/// after startup is not lost. Later signals are logged and otherwise ignored:
/// teardown must finish to clean up pid files. If the token is cancelled
/// elsewhere first, the task ends.
pub fn spawn_signal_listener(token: CancellationToken) -> JoinHandle<()> {
    let mut sigint = install(SignalKind::interrupt(), "SIGINT");
    let mut sigterm = install(SignalKind::terminate(), "SIGTERM");

    if sigint.is_none() && sigterm.is_none() {
        tracing::warn!(
            "No signal handlers available; the supervisor can only be killed externally"
        );
    }

    tokio::spawn(async move {
        let received = tokio::select! {
            _ = recv(&mut sigint) => ShutdownSignal::Interrupt,
            _ = recv(&mut sigterm) => ShutdownSignal::Terminate,
            _ = token.cancelled() => return,
        };
        tracing::info!("Received {}, shutting down", received);
        token.cancel();

        // Keep the handlers installed so repeated Ctrl+C does not kill us mid-teardown
        loop {
            tokio::select! {
                _ = recv(&mut sigint) => {}
                _ = recv(&mut sigterm) => {}
            }
            tracing::warn!("Shutdown already in progress");
        }
    })
}
