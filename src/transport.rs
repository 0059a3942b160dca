//! A concrete [`crate::server::Transport`] backed by a real UDP socket.
//!
//! Mirrors the bind/recv_from/send_to shape the teacher's own `SnmpService`
//! used, but split into the `Transport`/`Replier` seam so the server loop
//! stays testable against an in-memory stand-in (see `server`'s test
//! module) while shipping a real socket here.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::server::{Inbound, Replier, Transport};

/// MTU-sized receive buffer; SNMP datagrams are small, but GetBulk
/// responses against a generous `max_repetitions` can approach this.
const RECV_BUFFER_LEN: usize = 65_507;

/// A UDP-backed [`Transport`]. Each inbound datagram gets its own
/// [`UdpReplier`] carrying the peer address the request arrived from --
/// UDP is connectionless, so every reply is addressed independently.
///
/// `UdpSocket` has no way to cancel an in-flight `recv_from` from another
/// task, so `shutdown()` is modeled with a [`Notify`]: a blocked
/// `next_datagram` races the receive against the shutdown signal and
/// returns an I/O-flavored error either way, matching the "`shutdown()`
/// unblocks `next_snmp` with an I/O error" contract the server loop
/// expects.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    shutdown: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
}

impl UdpTransport {
    pub async fn bind(addr: impl Into<SocketAddr>) -> Result<Self> {
        let addr = addr.into();
        let socket = UdpSocket::bind(addr).await?;
        info!(%addr, "SNMP transport bound");
        Ok(Self {
            socket: Arc::new(socket),
            shutdown: Arc::new(Notify::new()),
            shutting_down: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn next_datagram(&self) -> Result<Option<Inbound>> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(Error::invalid_state("SNMP transport is shut down"));
        }

        let mut buf = vec![0u8; RECV_BUFFER_LEN];
        let received = tokio::select! {
            result = self.socket.recv_from(&mut buf) => result,
            _ = self.shutdown.notified() => {
                return Err(Error::invalid_state("SNMP transport shut down while receiving"));
            }
        };

        match received {
            Ok((len, peer)) => {
                buf.truncate(len);
                Ok(Some(Inbound {
                    bytes: buf,
                    replier: Box::new(UdpReplier {
                        socket: self.socket.clone(),
                        peer,
                    }),
                }))
            }
            Err(err) => {
                warn!(error = %err, "SNMP transport closed");
                Err(Error::Io(err))
            }
        }
    }

    async fn shutdown(&self) {
        info!("SNMP transport shutting down");
        self.shutting_down.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }
}

struct UdpReplier {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

#[async_trait]
impl Replier for UdpReplier {
    async fn reply(&self, bytes: &[u8]) -> Result<()> {
        self.socket.send_to(bytes, self.peer).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_and_round_trip_a_datagram() {
        let transport = UdpTransport::bind(([127, 0, 0, 1], 0)).await.unwrap();
        let addr = transport.local_addr().unwrap();

        let client = UdpSocket::bind(("127.0.0.1", 0)).await.unwrap();
        client.send_to(b"hello", addr).await.unwrap();

        let inbound = transport.next_datagram().await.unwrap().unwrap();
        assert_eq!(inbound.bytes, b"hello");

        inbound.replier.reply(b"world").await.unwrap();
        let mut buf = [0u8; 16];
        let (len, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"world");
    }

    #[tokio::test]
    async fn shutdown_unblocks_a_pending_receive() {
        let transport = Arc::new(UdpTransport::bind(([127, 0, 0, 1], 0)).await.unwrap());
        let waiting = transport.clone();
        let handle = tokio::spawn(async move { waiting.next_datagram().await });

        // Give the receive a moment to actually start waiting before we
        // shut the transport down.
        tokio::task::yield_now().await;
        transport.shutdown().await;

        let result = handle.await.unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn next_datagram_after_shutdown_errors_immediately() {
        let transport = UdpTransport::bind(([127, 0, 0, 1], 0)).await.unwrap();
        transport.shutdown().await;
        assert!(transport.next_datagram().await.is_err());
    }
}
