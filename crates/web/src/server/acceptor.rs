//! Listener setup and the accept loops.
//!
//! The listening socket is tuned before `listen`: REUSEADDR, REUSEPORT
//! where available, and the configured receive/send buffer sizes
//! (accepted sockets inherit them). Several acceptor tasks share one
//! listener; each accepted socket gets its per-connection options and is
//! moved exclusively into a spawned connection task.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use oxapi_http::connection::{ConnectionConfig, HttpConnection};
use oxapi_http::handler::Handler;
use oxapi_http::protocol::ClientInfo;
use tokio::net::{TcpListener, TcpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;

/// Splits the worker budget into acceptor tasks and general workers.
///
/// Small pools run one acceptor; mid-size pools one per six workers (at
/// least two); large pools one per eight (at least three). General
/// workers are whatever remains, never less than one.
pub(crate) fn partition_workers(workers: usize) -> (usize, usize) {
    let acceptors = if workers <= 4 {
        1
    } else if workers <= 16 {
        (workers / 6).max(2)
    } else {
        (workers / 8).max(3)
    };

    let general = workers.saturating_sub(acceptors).max(1);
    (acceptors, general)
}

pub(crate) fn bind_listener(addr: SocketAddr, config: &ServerConfig) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };

    socket.set_reuseaddr(true)?;

    #[cfg(unix)]
    if let Err(e) = socket.set_reuseport(true) {
        warn!("failed to set REUSEPORT on listener: {}", e);
    }

    if config.rcv_buf_size > 0 {
        if let Err(e) = socket.set_recv_buffer_size(config.rcv_buf_size) {
            warn!("failed to set receive buffer size: {}", e);
        }
    }

    if config.snd_buf_size > 0 {
        if let Err(e) = socket.set_send_buffer_size(config.snd_buf_size) {
            warn!("failed to set send buffer size: {}", e);
        }
    }

    socket.bind(addr)?;
    socket.listen(config.max_connections)
}

/// One acceptor task: accepts until cancelled, tuning and handing each
/// socket to its own connection task.
pub(crate) async fn accept_loop<H>(
    listener: Arc<TcpListener>,
    handler: Arc<H>,
    connection_config: ConnectionConfig,
    tcp_no_delay: bool,
    shutdown: CancellationToken,
) where
    H: Handler + 'static,
{
    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("acceptor cancelled");
                return;
            }
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(stream_and_peer) => stream_and_peer,
            Err(e) => {
                warn!("failed to accept connection: {}", e);
                continue;
            }
        };

        if tcp_no_delay {
            if let Err(e) = stream.set_nodelay(true) {
                warn!("failed to set TCP_NODELAY: {}", e);
            }
        }

        let handler = handler.clone();
        let connection_config = connection_config.clone();

        tokio::spawn(async move {
            let (reader, writer) = stream.into_split();
            let connection = HttpConnection::new(reader, writer, connection_config, ClientInfo::from(peer));
            match connection.process(handler).await {
                Ok(_) => {
                    debug!(peer = %peer, "connection finished");
                }
                Err(e) => {
                    info!(peer = %peer, "connection closed with error: {}", e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_partition_bands() {
        assert_eq!(partition_workers(1), (1, 1));
        assert_eq!(partition_workers(4), (1, 3));
        assert_eq!(partition_workers(5), (2, 3));
        assert_eq!(partition_workers(12), (2, 10));
        assert_eq!(partition_workers(16), (2, 14));
        assert_eq!(partition_workers(17), (3, 14));
        assert_eq!(partition_workers(32), (4, 28));
        assert_eq!(partition_workers(64), (8, 56));
    }
}
