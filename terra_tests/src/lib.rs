//! Test support: a minimal client that drives the wire protocol.
//!
//! The real client (renderer, input, presentation) is out of scope for the
//! server; this one exists only so integration tests can walk the handshake
//! and observe broadcasts over real sockets.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

use terra_shared::message::Message;
use terra_shared::wire::MAX_PACKET_SIZE;

/// How long the helpers wait for an expected message.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestClient {
    pub player_id: i32,
    tcp: TcpStream,
    udp: UdpSocket,
    server_udp: SocketAddr,
}

impl TestClient {
    /// Opens both transports against a server bound on localhost.
    pub async fn connect(tcp_port: u16, udp_port: u16) -> anyhow::Result<Self> {
        let tcp_addr = SocketAddr::from(([127, 0, 0, 1], tcp_port));
        let server_udp = SocketAddr::from(([127, 0, 0, 1], udp_port));

        let tcp = TcpStream::connect(tcp_addr).await.context("tcp connect")?;
        let udp = UdpSocket::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .context("udp bind")?;
        udp.connect(server_udp).await.context("udp connect")?;

        Ok(Self {
            player_id: -1,
            tcp,
            udp,
            server_udp,
        })
    }

    pub fn server_udp_addr(&self) -> SocketAddr {
        self.server_udp
    }

    pub async fn send_tcp(&mut self, msg: &Message) -> anyhow::Result<()> {
        let bytes = msg.encode_to_bytes()?;
        let len = (bytes.len() as u32).to_le_bytes();
        self.tcp.write_all(&len).await?;
        self.tcp.write_all(&bytes).await?;
        Ok(())
    }

    /// Reads the next reliable-channel message.
    pub async fn recv_tcp(&mut self) -> anyhow::Result<Message> {
        let mut len_buf = [0u8; 4];
        self.tcp.read_exact(&mut len_buf).await?;
        let len = u32::from_le_bytes(len_buf) as usize;
        if len == 0 || len > MAX_PACKET_SIZE {
            bail!("invalid frame length {len}");
        }
        let mut data = vec![0u8; len];
        self.tcp.read_exact(&mut data).await?;
        Message::decode(&data)
    }

    /// Reads reliable-channel messages until `pred` matches, skipping
    /// unrelated traffic (server notices, clock syncs, id re-sends).
    pub async fn recv_tcp_matching(
        &mut self,
        mut pred: impl FnMut(&Message) -> bool,
    ) -> anyhow::Result<Message> {
        timeout(RECV_TIMEOUT, async {
            loop {
                let msg = self.recv_tcp().await?;
                if pred(&msg) {
                    return Ok(msg);
                }
            }
        })
        .await
        .context("timed out waiting for reliable message")?
    }

    pub async fn send_udp(&self, msg: &Message) -> anyhow::Result<()> {
        let bytes = msg.encode_to_bytes()?;
        self.udp.send(&bytes).await?;
        Ok(())
    }

    pub async fn recv_udp(&self) -> anyhow::Result<Message> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let n = self.udp.recv(&mut buf).await?;
        Message::decode(&buf[..n])
    }

    /// Reads datagrams until `pred` matches.
    pub async fn recv_udp_matching(
        &self,
        mut pred: impl FnMut(&Message) -> bool,
    ) -> anyhow::Result<Message> {
        timeout(RECV_TIMEOUT, async {
            loop {
                let msg = self.recv_udp().await?;
                if pred(&msg) {
                    return Ok(msg);
                }
            }
        })
        .await
        .context("timed out waiting for datagram")?
    }

    /// Reads one datagram, or `None` when nothing arrives in `wait`.
    pub async fn recv_udp_within(&self, wait: Duration) -> anyhow::Result<Option<Message>> {
        match timeout(wait, self.recv_udp()).await {
            Ok(msg) => Ok(Some(msg?)),
            Err(_) => Ok(None),
        }
    }

    /// Walks the whole connection handshake to `FullyConnected`.
    pub async fn handshake(&mut self) -> anyhow::Result<()> {
        // Server assigns an id over TCP.
        let msg = self
            .recv_tcp_matching(|m| matches!(m, Message::PlayerId { .. }))
            .await?;
        let Message::PlayerId { player_id } = msg else {
            unreachable!()
        };
        self.player_id = player_id;

        // Echo it over UDP so the server binds this endpoint.
        self.send_udp(&Message::PlayerId { player_id }).await?;
        self.recv_tcp_matching(|m| matches!(m, Message::PlayerIdSaved))
            .await?;

        // Announce readiness, store the item catalog.
        self.send_tcp(&Message::PlayerConnected).await?;
        self.recv_tcp_matching(|m| matches!(m, Message::SaveItemList { .. }))
            .await?;

        // Exchange configuration.
        self.send_tcp(&Message::GetServerConfig).await?;
        self.recv_tcp_matching(|m| matches!(m, Message::ServerConfig { .. }))
            .await?;
        self.send_tcp(&Message::ClientConfig {
            json: r#"{"player_name":"tester","render_distance":4}"#.to_string(),
        })
        .await?;
        self.recv_tcp_matching(|m| matches!(m, Message::TimeOfDaySync { .. }))
            .await?;

        // Confirm everything is applied.
        self.send_tcp(&Message::PlayerFullyConnected).await?;
        Ok(())
    }
}
