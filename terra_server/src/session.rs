//! Reliable-channel sessions.
//!
//! One session per connection: a framed TCP stream, the connection
//! handshake state, and a bounded outbound queue drained by a writer task.
//! Producers (tick loop, broadcasts, packet handlers) enqueue fully-built
//! frames through [`SessionHandle`] instead of touching the socket.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use terra_shared::config::ClientConfig;
use terra_shared::message::Message;
use terra_shared::packet::PacketBuffer;
use terra_shared::wire::{MAX_CHAT_LEN, MAX_PACKET_SIZE};

use crate::player::PlayerId;
use crate::server::WorldServer;

/// Frames queued per session before the writer task must catch up.
pub const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// Connection handshake state, initial to terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Connected,
    IdAssigned,
    EndpointConfirmed,
    ItemListSent,
    ConfigExchanged,
    FullyConnected,
}

/// Cheap, cloneable handle for delivering messages to one session.
///
/// The player registry owns the `Player`; this is the non-owning back
/// reference the rest of the server uses.
#[derive(Clone)]
pub struct SessionHandle {
    pub player_id: PlayerId,
    outbound: mpsc::Sender<Bytes>,
    packet: Arc<PacketBuffer>,
    stage: Arc<Mutex<Stage>>,
    client_cfg: Arc<Mutex<Option<ClientConfig>>>,
}

impl SessionHandle {
    pub fn new(player_id: PlayerId) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        (
            Self {
                player_id,
                outbound: tx,
                packet: Arc::new(PacketBuffer::new()),
                stage: Arc::new(Mutex::new(Stage::Connected)),
                client_cfg: Arc::new(Mutex::new(None)),
            },
            rx,
        )
    }

    pub fn stage(&self) -> Stage {
        *self.stage.lock().unwrap()
    }

    /// Moves the handshake forward. Transitions never go backwards.
    pub fn advance_stage(&self, to: Stage) {
        let mut stage = self.stage.lock().unwrap();
        if to > *stage {
            *stage = to;
        }
    }

    pub fn is_fully_connected(&self) -> bool {
        self.stage() == Stage::FullyConnected
    }

    pub fn client_config(&self) -> Option<ClientConfig> {
        self.client_cfg.lock().unwrap().clone()
    }

    pub fn set_client_config(&self, cfg: ClientConfig) {
        *self.client_cfg.lock().unwrap() = Some(cfg);
    }

    /// Encodes the message through the session's packet buffer and queues
    /// the frame for the writer task. Returns false when the message was
    /// dropped (buffer overflow or a saturated/closed queue).
    pub fn send(&self, msg: &Message) -> bool {
        if !msg.encode(&self.packet) {
            warn!(player = %self.player_id, id = ?msg.packet_id(), "outbound packet overflow, send abandoned");
            return false;
        }
        let Some(bytes) = self.packet.take() else {
            return false;
        };
        match self.outbound.try_send(bytes) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(player = %self.player_id, "outbound queue full, frame dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Runs one session to completion: spawns the writer task and services the
/// read loop until disconnect or server shutdown.
pub async fn run(
    server: Arc<WorldServer>,
    stream: TcpStream,
    handle: SessionHandle,
    outbound_rx: mpsc::Receiver<Bytes>,
) {
    let player_id = handle.player_id;
    let (read_half, write_half) = stream.into_split();

    tokio::spawn(write_loop(
        Arc::clone(&server),
        player_id,
        write_half,
        outbound_rx,
    ));

    read_loop(server, read_half, handle).await;
    debug!(player = %player_id, "session closed");
}

async fn write_loop(
    server: Arc<WorldServer>,
    player_id: PlayerId,
    mut write_half: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Bytes>,
) {
    while let Some(frame) = rx.recv().await {
        let len = (frame.len() as u32).to_le_bytes();
        let result = async {
            write_half.write_all(&len).await?;
            write_half.write_all(&frame).await
        }
        .await;

        if let Err(e) = result {
            warn!(player = %player_id, error = %e, "reliable write failed, disconnecting");
            server.remove_player(player_id);
            return;
        }
    }
}

async fn read_loop(server: Arc<WorldServer>, mut read_half: OwnedReadHalf, handle: SessionHandle) {
    let player_id = handle.player_id;
    let mut shutdown = server.shutdown_rx();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if !*shutdown.borrow() {
                    return;
                }
            }
            frame = read_frame(&mut read_half) => match frame {
                Ok(Some(data)) => handle_packet(&server, &handle, &data),
                Ok(None) => {
                    info!(player = %player_id, "peer closed the connection");
                    server.remove_player(player_id);
                    return;
                }
                Err(e) => {
                    warn!(player = %player_id, error = %e, "reliable read failed, disconnecting");
                    server.remove_player(player_id);
                    return;
                }
            }
        }
    }
}

/// Reads one length-prefixed frame. `Ok(None)` is a clean EOF.
async fn read_frame(read_half: &mut OwnedReadHalf) -> anyhow::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match read_half.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("read frame length"),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len == 0 || len > MAX_PACKET_SIZE {
        bail!("invalid frame length {len}");
    }

    let mut data = vec![0u8; len];
    read_half
        .read_exact(&mut data)
        .await
        .context("read frame payload")?;
    Ok(Some(data))
}

fn handle_packet(server: &Arc<WorldServer>, handle: &SessionHandle, data: &[u8]) {
    let msg = match Message::decode(data) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(player = %handle.player_id, error = %e, "dropping malformed reliable packet");
            return;
        }
    };

    if server.show_debug() {
        debug!(player = %handle.player_id, id = ?msg.packet_id(), bytes = data.len(), "reliable packet");
    }

    match msg {
        Message::ChatMessage { text } => handle_chat(server, handle, &text),
        Message::PlayerConnected => {
            handle.send(&Message::SaveItemList {
                json: server.catalog_json().to_string(),
            });
            handle.advance_stage(Stage::ItemListSent);
        }
        Message::GetServerConfig => {
            handle.send(&Message::ServerConfig {
                json: server.config_json().to_string(),
            });
        }
        Message::ClientConfig { json } => match ClientConfig::from_json_str(&json) {
            Ok(cfg) => {
                debug!(player = %handle.player_id, ?cfg, "client config received");
                handle.set_client_config(cfg);
                handle.send(&Message::TimeOfDaySync {
                    time_of_day: server.time_of_day(),
                });
                handle.advance_stage(Stage::ConfigExchanged);
            }
            Err(e) => {
                warn!(player = %handle.player_id, error = %e, "dropping unparseable client config");
            }
        },
        Message::PlayerFullyConnected => {
            handle.advance_stage(Stage::FullyConnected);
            info!(player = %handle.player_id, "player fully connected");
        }
        Message::PlayerUnloadedChunks { positions } => {
            if handle.is_fully_connected() {
                server.unload_player_chunks(handle.player_id, &positions);
            }
        }
        Message::PlayerPickupItem { uuid } => {
            server.pickup_item(handle.player_id, uuid);
        }
        other => {
            debug!(player = %handle.player_id, id = ?other.packet_id(), "unexpected message on reliable channel");
        }
    }
}

fn handle_chat(server: &Arc<WorldServer>, handle: &SessionHandle, text: &str) {
    if text.is_empty() {
        return;
    }
    if text.len() > MAX_CHAT_LEN {
        warn!(player = %handle.player_id, len = text.len(), "ignored overlong chat message");
        return;
    }
    // Printable ASCII only.
    if !text.bytes().all(|b| (0x20..=0x7E).contains(&b)) {
        warn!(player = %handle.player_id, "ignored chat message with non-printable bytes");
        return;
    }

    info!(player = %handle.player_id, len = text.len(), "chat: {text}");
    server.broadcast(&Message::ChatMessage {
        text: text.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_only_advances() {
        let (handle, _rx) = SessionHandle::new(PlayerId(1));
        assert_eq!(handle.stage(), Stage::Connected);
        handle.advance_stage(Stage::ItemListSent);
        assert_eq!(handle.stage(), Stage::ItemListSent);
        handle.advance_stage(Stage::IdAssigned);
        assert_eq!(handle.stage(), Stage::ItemListSent);
        handle.advance_stage(Stage::FullyConnected);
        assert!(handle.is_fully_connected());
    }

    #[test]
    fn send_enqueues_framed_message() {
        let (handle, mut rx) = SessionHandle::new(PlayerId(2));
        assert!(handle.send(&Message::PlayerIdSaved));
        let frame = rx.try_recv().unwrap();
        let back = Message::decode(&frame).unwrap();
        assert_eq!(back, Message::PlayerIdSaved);
    }
}
