//! The request-serving loop: pulls datagrams off a [`Transport`], hands
//! them to the current [`MasterAgent`], and writes back any response.
//!
//! The master agent is held behind an `ArcSwap` so [`SnmpServer::swap_master`]
//! can hot-swap configuration between requests with no interruption -- the
//! loop reloads the pointer on every iteration.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::master::MasterAgent;

/// One inbound datagram and a way to reply to its sender.
pub struct Inbound {
    pub bytes: Vec<u8>,
    pub replier: Box<dyn Replier>,
}

/// Sends a reply datagram back to whoever sent the inbound one. Kept as
/// a trait object per-datagram (rather than a fixed peer address on the
/// transport) so UDP's connectionless "every recv carries its own return
/// address" shape is represented directly.
#[async_trait]
pub trait Replier: Send + Sync {
    async fn reply(&self, bytes: &[u8]) -> Result<()>;

    /// Called when a reply could not be delivered; implementations that
    /// hold per-peer state (e.g. a connected socket) can use this to tear
    /// that state down. The default does nothing.
    async fn shutdown(&self) {}
}

/// Pulls the next inbound datagram, or signals the listener has closed.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns `Ok(None)` when the transport has been shut down cleanly,
    /// or `Err` when the underlying socket is closed or errors out (which
    /// includes the unblocking this trait's `shutdown()` is expected to
    /// cause on a receive that is already in flight). Either way the
    /// server loop treats this as a clean stop, never as a fatal error.
    async fn next_datagram(&self) -> Result<Option<Inbound>>;

    async fn shutdown(&self);
}

/// Serves SNMP requests from a [`Transport`] against a hot-swappable
/// [`MasterAgent`].
pub struct SnmpServer<T: Transport> {
    transport: T,
    master: Arc<ArcSwap<MasterAgent>>,
}

impl<T: Transport> SnmpServer<T> {
    pub fn new(transport: T, master: MasterAgent) -> Self {
        Self {
            transport,
            master: Arc::new(ArcSwap::from_pointee(master)),
        }
    }

    /// A clonable handle that callers can use to hot-swap the running
    /// configuration from outside the serve loop.
    pub fn master_handle(&self) -> Arc<ArcSwap<MasterAgent>> {
        self.master.clone()
    }

    pub fn swap_master(&self, master: MasterAgent) {
        self.master.store(Arc::new(master));
    }

    /// Serves one datagram: decode, dispatch, reply. Callback panics are
    /// already contained inside `SubAgent`, but decode/encode is run on a
    /// `tokio::spawn`ed task too, so a panic anywhere in the pipeline (not
    /// just inside a callback) is caught by tokio's task boundary and
    /// surfaces as a `JoinError` here instead of taking down the listener.
    /// A send failure drops that peer's replier without breaking the loop
    /// for everyone else.
    pub async fn serve_next_request(&self) -> Result<bool> {
        // A transport error -- including the one `shutdown()` causes a
        // blocked receive to unblock with -- means the socket is closed.
        // Per the transport contract this is a clean stop, not a fatal
        // error: `serve_forever` must return `Ok(())`, never propagate it.
        let inbound = match self.transport.next_datagram().await {
            Ok(Some(inbound)) => inbound,
            Ok(None) => return Ok(false),
            Err(err) => {
                info!(error = %err, "SNMP transport closed, stopping server loop");
                return Ok(false);
            }
        };
        let master = self.master.load_full();
        let bytes = inbound.bytes;

        let outcome = tokio::spawn(async move { master.response_for_buffer(&bytes).await }).await;

        match outcome {
            Ok(Ok(Some(response_bytes))) => {
                if let Err(err) = inbound.replier.reply(&response_bytes).await {
                    warn!(error = %err, "failed to send SNMP response, dropping peer");
                    inbound.replier.shutdown().await;
                }
            }
            Ok(Ok(None)) => {
                // Fire-and-forget trap/Trap2, nothing to send back.
            }
            Ok(Err(err)) => {
                error!(error = %err, "failed to build a response for the last request");
            }
            Err(join_err) => {
                error!(error = %join_err, "request handling panicked; recovered, server continues");
            }
        }
        Ok(true)
    }

    /// Runs [`SnmpServer::serve_next_request`] until the transport closes
    /// cleanly or returns a fatal error.
    pub async fn serve_forever(&self) -> Result<()> {
        loop {
            match self.serve_next_request().await {
                Ok(true) => continue,
                Ok(false) => {
                    info!("transport closed, stopping SNMP server loop");
                    return Ok(());
                }
                Err(err) => {
                    error!(error = %err, "SNMP server loop terminated");
                    return Err(err);
                }
            }
        }
    }

    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
    }
}

fn assert_send_sync<T: Send + Sync>() {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::SecurityConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct MemoryReplier {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    #[async_trait]
    impl Replier for MemoryReplier {
        async fn reply(&self, bytes: &[u8]) -> Result<()> {
            self.sent.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }
    }

    struct MemoryTransport {
        inbox: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        closed: AtomicUsize,
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn next_datagram(&self) -> Result<Option<Inbound>> {
            let mut inbox = self.inbox.lock().unwrap();
            match inbox.try_recv() {
                Ok(bytes) => Ok(Some(Inbound {
                    bytes,
                    replier: Box::new(MemoryReplier {
                        sent: self.sent.clone(),
                    }),
                })),
                Err(mpsc::error::TryRecvError::Empty) => Ok(None),
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.closed.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            }
        }

        async fn shutdown(&self) {}
    }

    #[test]
    fn master_agent_is_send_sync_for_spawn() {
        assert_send_sync::<MasterAgent>();
    }

    #[tokio::test]
    async fn empty_transport_stops_the_loop_cleanly() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let transport = MemoryTransport {
            inbox: Mutex::new(rx),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: AtomicUsize::new(0),
        };
        let mut security = SecurityConfig::default();
        security.ready_for_work();
        let master = MasterAgent::new(security, vec![]);
        let server = SnmpServer::new(transport, master);
        assert!(!server.serve_next_request().await.unwrap());
    }
}
