use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use lib_common::protocols::enc_rpc::{Args, Outcome, ProtocolError, Reply, framed, read_message, write_message};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::config::ServeMode;
use super::handler::handle;
use super::state::AppState;

static NEXT_CONNECTION_ID: AtomicUsize = AtomicUsize::new(1);

/// Serves request frames on one connection until the peer closes it.
///
/// A frame that is not a valid envelope gets an error reply and the connection
/// stays usable. Transport errors end the connection.
pub async fn serve_connection(stream: TcpStream, peer: SocketAddr, state: AppState) {
    let connection_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    info!(connection_id, %peer, "Connection accepted");

    let mut framed = framed(stream);
    let mut served = 0usize;

    loop {
        let outcome = match read_message::<Args, _>(&mut framed).await {
            Ok(Some(args)) => handle(&state, &args).await,
            Ok(None) => break,
            Err(ProtocolError::Json(e)) => {
                warn!(connection_id, "Malformed request envelope: {}", e);
                Outcome::Failure(format!("Malformed request envelope: {e}"))
            }
            Err(e) => {
                warn!(connection_id, "Connection error: {}", e);
                break;
            }
        };

        served += 1;
        if let Err(e) = write_message(&mut framed, &Reply::from(outcome)).await {
            warn!(connection_id, "Reply could not be sent: {}", e);
            break;
        }
    }

    info!(connection_id, served, "Connection closed");
}

/// Accepts connections on `listener` according to `mode` until shut down.
///
/// In [`ServeMode::Once`] the first connection is served to completion and the
/// function returns. In [`ServeMode::Forever`] each connection gets its own
/// task; on shutdown the accept loop stops and open connections are drained.
pub async fn run(
    listener: TcpListener,
    state: AppState,
    mode: ServeMode,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, ?mode, "ENC service listening");

    match mode {
        ServeMode::Once => {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    serve_connection(stream, peer, state).await;
                }
                _ = shutdown.recv() => {
                    info!("Shutdown before any connection arrived.");
                }
            }
        }
        ServeMode::Forever => {
            let mut connections = JoinSet::new();
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            connections.spawn(serve_connection(stream, peer, state.clone()));
                        }
                        Err(e) => warn!("Accept error: {}", e),
                    },
                    Some(_) = connections.join_next(), if !connections.is_empty() => {}
                    _ = shutdown.recv() => {
                        info!("ENC service shutting down.");
                        break;
                    }
                }
            }
            debug!(open = connections.len(), "Draining connections");
            while connections.join_next().await.is_some() {}
        }
    }

    Ok(())
}
