// MeshTail - platform/transport.rs
//
// Mesh transport: moves encoded frames between nodes.
//
// The live view only needs "send these bytes to node X"; that seam is the
// `MeshTransport` trait. `UdpTransport` implements it over a UDP socket,
// learning which socket address belongs to which node from the sender
// field of every valid inbound frame (seeded from the static peer table).
// `MemoryTransport` records frames instead of sending them.

use crate::core::model::NodeAddress;
use crate::core::selector::ControlSink;
use crate::core::wire::{FrameStamper, MeshMessage};
use crate::util::error::{self, MeshTailError, TransportError};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::net::{ToSocketAddrs, UdpSocket};

/// Outbound frame delivery to one node.
///
/// Implementations must not block and must not emit `tracing` events from
/// `send`: it is called from the forwarding path.
pub trait MeshTransport: Send + Sync {
    fn send(&self, to: NodeAddress, frame: &[u8]) -> Result<(), TransportError>;
}

// =============================================================================
// UDP transport
// =============================================================================

pub struct UdpTransport {
    socket: UdpSocket,
    peers: RwLock<HashMap<NodeAddress, SocketAddr>>,
}

impl UdpTransport {
    pub async fn bind(addr: impl ToSocketAddrs) -> error::Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| MeshTailError::Io {
                operation: "mesh transport bind",
                source,
            })?;
        Ok(Self {
            socket,
            peers: RwLock::new(HashMap::new()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Remember that `node` is reachable at `endpoint`.
    /// Returns `true` when this is new or changed information.
    pub fn learn(&self, node: NodeAddress, endpoint: SocketAddr) -> bool {
        let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);
        peers.insert(node, endpoint) != Some(endpoint)
    }

    pub fn endpoint_of(&self, node: NodeAddress) -> Option<SocketAddr> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&node)
            .copied()
    }

    /// Send to a socket address directly (used before the node address of
    /// the aggregator is known).
    pub fn send_to_endpoint(&self, endpoint: SocketAddr, frame: &[u8]) -> Result<(), TransportError> {
        self.socket
            .try_send_to(frame, endpoint)
            .map(|_| ())
            .map_err(|source| TransportError::Io { source })
    }

    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }
}

impl MeshTransport for UdpTransport {
    fn send(&self, to: NodeAddress, frame: &[u8]) -> Result<(), TransportError> {
        let endpoint = self.endpoint_of(to).ok_or(TransportError::UnknownPeer(to))?;
        self.send_to_endpoint(endpoint, frame)
    }
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("local", &self.socket.local_addr().ok())
            .finish()
    }
}

// =============================================================================
// In-memory transport
// =============================================================================

/// Records every frame handed to it. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<(NodeAddress, Vec<u8>)>>,
}

impl MemoryTransport {
    /// Drain the recorded frames in send order.
    pub fn take_sent(&self) -> Vec<(NodeAddress, Vec<u8>)> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl MeshTransport for MemoryTransport {
    fn send(&self, to: NodeAddress, frame: &[u8]) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((to, frame.to_vec()));
        Ok(())
    }
}

// =============================================================================
// Control channel adapter
// =============================================================================

/// Sends stream control frames over a mesh transport.
pub struct MeshControl {
    transport: Arc<dyn MeshTransport>,
    stamper: Arc<FrameStamper>,
}

impl MeshControl {
    pub fn new(transport: Arc<dyn MeshTransport>, stamper: Arc<FrameStamper>) -> Self {
        Self { transport, stamper }
    }
}

impl ControlSink for MeshControl {
    fn send_control(&self, to: NodeAddress, enable: bool) -> Result<(), TransportError> {
        let frame = self.stamper.encode(MeshMessage::Control { enable });
        self.transport.send(to, &frame)
    }
}
