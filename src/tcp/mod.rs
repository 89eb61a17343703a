//! Robot-facing TCP server: line-oriented session protocol.

mod session;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::manager::RobotManager;

/// Accept robot sessions until the main token fires. Each socket gets its
/// own task running the line protocol.
pub async fn serve(
    listener: TcpListener,
    manager: Arc<RobotManager>,
    token: CancellationToken,
) -> std::io::Result<()> {
    let local = listener.local_addr()?;
    tracing::info!(addr = %local, "TCP server listening");

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(peer = %peer, "accepted robot connection");
                        let manager = Arc::clone(&manager);
                        let token = token.clone();
                        tokio::spawn(session::run(stream, peer, manager, token));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }

    tracing::info!("TCP server shut down");
    Ok(())
}
