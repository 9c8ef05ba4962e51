use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::net::SocketAddr;

use log::{debug, warn};
use tokio::net::UdpSocket;

use super::{NodeId, RaftError, RaftMessage};

// Largest datagram we expect; election messages are well under 100 bytes.
const MAX_DATAGRAM: usize = 4096;

/// Fire-and-forget UDP transport for one node.
///
/// Sends never fail from the caller's point of view: an unreachable peer is
/// just a lost message, and recovery is left to the election timeout.
pub struct UdpTransport {
    socket: UdpSocket,
    peers: BTreeMap<NodeId, SocketAddr>,
    buf: Vec<u8>,
}

impl UdpTransport {
    pub async fn bind(
        addr: SocketAddr,
        peers: BTreeMap<NodeId, SocketAddr>,
    ) -> Result<Self, RaftError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| RaftError::Bind { addr, source })?;

        Ok(Self {
            socket,
            peers,
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RaftError> {
        Ok(self.socket.local_addr()?)
    }

    pub async fn send_to(&self, addr: SocketAddr, message: &RaftMessage) {
        let data = match message.encode() {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to encode {message:?}: {e}");
                return;
            }
        };

        if let Err(e) = self.socket.send_to(&data, addr).await {
            debug!("Failed to send {message:?} to {addr}: {e}");
        }
    }

    pub async fn send_to_peer(&self, peer_id: NodeId, message: &RaftMessage) {
        match self.peers.get(&peer_id) {
            Some(addr) => self.send_to(*addr, message).await,
            None => debug!("Dropping {message:?} for unknown peer {peer_id}"),
        }
    }

    pub async fn broadcast(&self, message: &RaftMessage) {
        for peer_id in self.peers.keys() {
            self.send_to_peer(*peer_id, message).await;
        }
    }

    /// Returns the next pending message without waiting, or `None` once the
    /// socket has nothing queued. Undecodable datagrams are logged and skipped.
    pub fn try_recv(&mut self) -> Option<(RaftMessage, SocketAddr)> {
        loop {
            let (len, from) = match self.socket.try_recv_from(&mut self.buf) {
                Ok(received) => received,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return None,
                Err(e) => {
                    // ICMP port-unreachable from an earlier send surfaces here on
                    // some platforms. Leave the rest of the queue for the next tick.
                    debug!("Receive error: {e}");
                    return None;
                }
            };

            match RaftMessage::decode(&self.buf[..len]) {
                Ok(message) => {
                    debug!("Received {message:?} from {from}");
                    return Some((message, from));
                }
                Err(e) => warn!("Dropping malformed datagram from {from}: {e}"),
            }
        }
    }
}
