//! UDP broadcast backend.
//!
//! The sensor node broadcasts one packet per datagram, so there is no
//! reassembly: every datagram goes straight to [`decode_datagram`].

use super::{ListenError, MEASUREMENT_CHANNEL_BUFFER_SIZE, MeasurementResult, decode_datagram};
use crate::packet::MAX_PACKET_SIZE;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Bind to `bind` and start receiving sensor broadcasts.
///
/// # Arguments
/// * `bind` - Local address, normally `0.0.0.0:18511`
/// * `verbose` - If true, decode errors are sent as Err values; otherwise they're silently dropped.
pub async fn start(
    bind: SocketAddr,
    verbose: bool,
) -> Result<mpsc::Receiver<MeasurementResult>, ListenError> {
    let socket = UdpSocket::bind(bind).await?;
    socket.set_broadcast(true)?;
    info!(%bind, "listening for UDP broadcasts");
    Ok(spawn_receiver(socket, verbose))
}

/// Run the receive loop for an already bound socket.
///
/// The loop ends when the receiver is dropped.
pub fn spawn_receiver(socket: UdpSocket, verbose: bool) -> mpsc::Receiver<MeasurementResult> {
    let (tx, rx) = mpsc::channel(MEASUREMENT_CHANNEL_BUFFER_SIZE);
    tokio::spawn(receive_loop(socket, tx, verbose));
    rx
}

/// Pause after a failed receive before trying again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

async fn receive_loop(socket: UdpSocket, tx: mpsc::Sender<MeasurementResult>, verbose: bool) {
    let mut buf = [0u8; MAX_PACKET_SIZE];
    loop {
        let received = tokio::select! {
            _ = tx.closed() => break,
            received = socket.recv_from(&mut buf) => received,
        };

        let (n, peer) = match received {
            Ok(received) => received,
            Err(e) => {
                warn!(error = %e, "UDP receive failed");
                tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                continue;
            }
        };

        let result = decode_datagram(peer, &buf[..n]);
        if (result.is_ok() || verbose) && tx.send(result).await.is_err() {
            break;
        }
    }
    debug!("UDP receive loop stopped");
}
