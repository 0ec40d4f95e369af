// Copyright (c) 2024 Omerta Mesh Contributors

//! The node's single UDP socket: a reader task that owns the socket and a
//! cloneable [`TransportHandle`] that producers use to enqueue outbound
//! datagrams.
//!
//! Exactly one task ever touches the socket. Everyone else talks to it
//! through a bounded channel, so a burst of outbound traffic backpressures
//! the producer instead of contending on the socket directly.

use crate::error::{NetError, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Maximum UDP payload this transport will attempt to read or write. Larger
/// than any single envelope this mesh produces; guards against a malformed
/// or hostile peer forcing an oversized allocation.
pub const MAX_DATAGRAM_LEN: usize = 2048;

/// How long a producer waits for room in the outbound queue before giving
/// up and reporting [`NetError::QueueFull`].
const SEND_BACKPRESSURE_DEADLINE: Duration = Duration::from_millis(200);

/// An inbound datagram together with the address it arrived from.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub from: SocketAddr,
    pub bytes: Vec<u8>,
}

struct Outbound {
    to: SocketAddr,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct Counters {
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    send_queue_drops: AtomicU64,
    receive_errors: AtomicU64,
}

/// Point-in-time snapshot of transport counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub send_queue_drops: u64,
    pub receive_errors: u64,
}

/// Cloneable handle to the running transport. Cheap to clone; every clone
/// shares the same outbound queue and counters.
#[derive(Clone)]
pub struct TransportHandle {
    outbound: mpsc::Sender<Outbound>,
    counters: Arc<Counters>,
    local_addr: SocketAddr,
}

impl TransportHandle {
    /// The address the underlying socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Enqueue `bytes` for delivery to `to`. Waits up to a small deadline
    /// for room in the outbound queue; beyond that the datagram is dropped
    /// and [`NetError::QueueFull`] is returned rather than blocking the
    /// caller indefinitely (§5 backpressure policy).
    pub async fn send_to(&self, to: SocketAddr, bytes: Vec<u8>) -> Result<()> {
        match tokio::time::timeout(
            SEND_BACKPRESSURE_DEADLINE,
            self.outbound.send(Outbound { to, bytes }),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(NetError::Closed),
            Err(_) => {
                self.counters.send_queue_drops.fetch_add(1, Ordering::Relaxed);
                Err(NetError::QueueFull(to))
            }
        }
    }

    pub fn stats(&self) -> TransportStats {
        TransportStats {
            packets_sent: self.counters.packets_sent.load(Ordering::Relaxed),
            packets_received: self.counters.packets_received.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.counters.bytes_received.load(Ordering::Relaxed),
            send_queue_drops: self.counters.send_queue_drops.load(Ordering::Relaxed),
            receive_errors: self.counters.receive_errors.load(Ordering::Relaxed),
        }
    }
}

/// Bind a UDP socket at `bind_addr` and spawn its reader/writer task.
///
/// Returns a [`TransportHandle`] for sending, and a receiver of every
/// datagram read off the wire; the caller (`mesh-node`) is responsible for
/// parsing the envelope header and routing to the matching crypto envelope.
pub async fn spawn(
    bind_addr: SocketAddr,
    outbound_queue_depth: usize,
) -> Result<(TransportHandle, mpsc::Receiver<Datagram>)> {
    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|e| NetError::Bind(bind_addr, e))?;
    let local_addr = socket.local_addr().unwrap_or(bind_addr);

    let (outbound_tx, outbound_rx) = mpsc::channel(outbound_queue_depth);
    let (inbound_tx, inbound_rx) = mpsc::channel(outbound_queue_depth);
    let counters = Arc::new(Counters::default());

    debug!(%local_addr, "transport bound");
    tokio::spawn(run(socket, outbound_rx, inbound_tx, counters.clone()));

    Ok((
        TransportHandle {
            outbound: outbound_tx,
            counters,
            local_addr,
        },
        inbound_rx,
    ))
}

async fn run(
    socket: UdpSocket,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    inbound_tx: mpsc::Sender<Datagram>,
    counters: Arc<Counters>,
) {
    let mut buf = [0u8; MAX_DATAGRAM_LEN];
    loop {
        tokio::select! {
            biased;

            outgoing = outbound_rx.recv() => {
                let Some(Outbound { to, bytes }) = outgoing else {
                    debug!("transport outbound queue closed, reader task exiting");
                    return;
                };
                match socket.send_to(&bytes, to).await {
                    Ok(sent) => {
                        counters.packets_sent.fetch_add(1, Ordering::Relaxed);
                        counters.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
                    }
                    Err(err) => {
                        // Transient network errors (no route, ICMP unreachable) are not
                        // surfaced per §7; the caller already moved on.
                        trace!(%to, %err, "send_to failed, dropping");
                    }
                }
            }

            received = socket.recv_from(&mut buf) => {
                match received {
                    Ok((len, from)) => {
                        counters.packets_received.fetch_add(1, Ordering::Relaxed);
                        counters.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
                        let datagram = Datagram { from, bytes: buf[..len].to_vec() };
                        if inbound_tx.send(datagram).await.is_err() {
                            debug!("inbound consumer gone, reader task exiting");
                            return;
                        }
                    }
                    Err(err) => {
                        counters.receive_errors.fetch_add(1, Ordering::Relaxed);
                        warn!(%err, "udp recv_from failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn two_transports_exchange_a_datagram() {
        let (handle_a, mut inbound_a) = spawn("127.0.0.1:0".parse().unwrap(), 16).await.unwrap();
        let (handle_b, mut inbound_b) = spawn("127.0.0.1:0".parse().unwrap(), 16).await.unwrap();

        handle_a
            .send_to(handle_b.local_addr(), b"hello".to_vec())
            .await
            .unwrap();

        let datagram = tokio::time::timeout(Duration::from_secs(1), inbound_b.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(datagram.bytes, b"hello");
        assert_eq!(datagram.from, handle_a.local_addr());

        assert_eq!(handle_a.stats().packets_sent, 1);
        assert_eq!(handle_b.stats().packets_received, 1);

        drop(inbound_a);
    }

    #[tokio::test]
    async fn queue_full_reports_an_error_instead_of_blocking_forever() {
        let (handle, _inbound) = spawn("127.0.0.1:0".parse().unwrap(), 1).await.unwrap();
        let target: SocketAddr = "127.0.0.1:1".parse().unwrap();

        // Saturate the one-slot queue, then a second concurrent send should
        // time out rather than hang.
        let a = handle.send_to(target, vec![0u8; 8]);
        let b = handle.send_to(target, vec![0u8; 8]);
        let (ra, rb) = tokio::join!(a, b);
        assert!(ra.is_ok() || rb.is_ok());
    }
}
