//! Unreliable-channel multiplexer.
//!
//! One UDP socket shared by all players, keyed by player id -> peer
//! endpoint. The endpoint is learned from the client's `PLAYER_ID` echo;
//! until then outbound datagrams for that player are dropped and the id is
//! queued for the per-tick re-send of the id assignment over TCP.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use terra_shared::math::Vec3;
use terra_shared::message::Message;
use terra_shared::packet::PacketBuffer;
use terra_shared::wire::MAX_PACKET_SIZE;

use crate::player::PlayerId;
use crate::registry::GuardedMap;
use crate::server::WorldServer;
use crate::session::Stage;

/// Outcome of one outbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdpSend {
    Sent,
    /// No endpoint bound for the player yet; datagram dropped.
    NoEndpoint,
    /// The packet buffer entered write-error state; send abandoned.
    Abandoned,
    /// Socket error; treated as a transport fault for the player.
    Failed,
}

pub struct UdpMux {
    socket: UdpSocket,
    endpoints: GuardedMap<PlayerId, SocketAddr>,
    /// Shared outbound buffer for all simulation sends.
    pub packet: PacketBuffer,
}

impl UdpMux {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(addr).await.context("udp bind")?;
        Ok(Self {
            socket,
            endpoints: GuardedMap::new(),
            packet: PacketBuffer::new(),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Binds the peer endpoint for a player. The first echo wins; later
    /// echoes from other addresses are ignored.
    pub fn bind_endpoint(&self, id: PlayerId, addr: SocketAddr) -> bool {
        self.endpoints.with(|map| {
            if map.contains_key(&id) {
                false
            } else {
                map.insert(id, addr);
                true
            }
        })
    }

    pub fn endpoint_of(&self, id: PlayerId) -> Option<SocketAddr> {
        self.endpoints.with(|map| map.get(&id).copied())
    }

    pub fn remove_endpoint(&self, id: PlayerId) {
        self.endpoints.remove(&id);
    }

    /// Encodes and sends one message to a player through the shared buffer.
    pub async fn send(&self, id: PlayerId, msg: &Message) -> UdpSend {
        if !msg.encode(&self.packet) {
            warn!(player = %id, id = ?msg.packet_id(), "datagram overflow, send abandoned");
            return UdpSend::Abandoned;
        }

        let Some(addr) = self.endpoint_of(id) else {
            // Queuing to the network layer never happens; release the buffer.
            self.packet.abandon();
            return UdpSend::NoEndpoint;
        };

        let Some(bytes) = self.packet.take() else {
            return UdpSend::Abandoned;
        };

        match self.socket.send_to(&bytes, addr).await {
            Ok(_) => UdpSend::Sent,
            Err(e) => {
                warn!(player = %id, error = %e, "datagram send failed");
                UdpSend::Failed
            }
        }
    }
}

/// Drives the datagram receive loop until shutdown.
pub async fn run(server: Arc<WorldServer>) {
    let mut shutdown = server.shutdown_rx();
    let mut buf = vec![0u8; MAX_PACKET_SIZE];

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if !*shutdown.borrow() {
                    return;
                }
            }
            received = server.udp.socket.recv_from(&mut buf) => match received {
                Ok((n, from)) => handle_datagram(&server, &buf[..n], from),
                Err(e) => warn!(error = %e, "datagram receive failed"),
            }
        }
    }
}

fn handle_datagram(server: &Arc<WorldServer>, data: &[u8], from: SocketAddr) {
    let msg = match Message::decode(data) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(%from, error = %e, "dropping malformed datagram");
            return;
        }
    };

    if server.show_debug() {
        debug!(%from, id = ?msg.packet_id(), bytes = data.len(), "datagram");
    }

    match msg {
        // The client echoes its assigned id so the datagram endpoint can be
        // bound to the player.
        Message::PlayerId { player_id } => {
            let id = PlayerId(player_id);
            let Some(session) = server.session_of(id) else {
                warn!(player = %id, "id echo for unknown player");
                return;
            };
            server.udp.bind_endpoint(id, from);
            session.advance_stage(Stage::EndpointConfirmed);
            session.send(&Message::PlayerIdSaved);
            info!(player = %id, %from, "datagram endpoint bound");
        }
        Message::PlayerMovementAndCamera {
            player_id,
            anim_id,
            pos,
            yaw,
            pitch,
        } => {
            let id = PlayerId(player_id);
            let found = server.with_players(|players| {
                let Some(player) = players.get_mut(&id) else {
                    return false;
                };
                player.pos = pos;
                player.cam_yaw = yaw;
                player.cam_pitch = pitch;
                player.anim_id = anim_id;
                true
            });
            if !found {
                debug!(player = %id, "movement for unknown player");
            }
        }
        Message::PlayerJump { player_id } => {
            let id = PlayerId(player_id);
            let jump_force = server.cfg.player_jump_force;
            server.with_players(|players| {
                if let Some(player) = players.get_mut(&id) {
                    player.on_ground = false;
                    player.velocity.y = jump_force;
                    player.pos = player.pos + Vec3::new(0.0, 1.0, 0.0);
                }
            });
        }
        other => {
            debug!(%from, id = ?other.packet_id(), "unexpected message on datagram channel");
        }
    }
}
