//! Typed wire messages.
//!
//! One [`Message`] variant per packet type, encoded through the
//! [`PacketBuffer`] write API and decoded through the generic [`Reader`].
//! Keeping every field read inside this module means no other code does
//! byte-offset arithmetic on received packets.

use anyhow::{bail, Context};
use bytes::Bytes;

use crate::chunk::ChunkPos;
use crate::math::Vec3;
use crate::packet::PacketBuffer;
use crate::wire::{self, axis_flags, PacketId, Reader, MAX_PACKET_SIZE, PACKET_TAG_SIZE};

/// One chunk entry inside a `CHUNK_DATA` blob.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub pos: ChunkPos,
    pub heights: Vec<f32>,
}

/// One item entry inside an `ITEM_UPDATE` packet.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRecord {
    pub uuid: i32,
    pub item_id: i32,
    pub pos: Vec3,
    pub entry_name: String,
}

/// High-level message envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ChatMessage {
        text: String,
    },
    ServerMessage {
        text: String,
    },
    PlayerId {
        player_id: i32,
    },
    PlayerIdSaved,
    PlayerConnected,
    SaveItemList {
        json: String,
    },
    GetServerConfig,
    ServerConfig {
        json: String,
    },
    ClientConfig {
        json: String,
    },
    TimeOfDaySync {
        time_of_day: f32,
    },
    PlayerFullyConnected,
    /// Compressed chunk batch. The blob is produced by
    /// [`compress_chunk_records`]; decoding needs the per-chunk sample count
    /// and goes through [`decompress_chunk_records`].
    ChunkData {
        blob: Vec<u8>,
    },
    PlayerUnloadedChunks {
        positions: Vec<ChunkPos>,
    },
    PlayerMovementAndCamera {
        player_id: i32,
        anim_id: i32,
        pos: Vec3,
        yaw: f32,
        pitch: f32,
    },
    PlayerPosition {
        on_ground: bool,
        chunk: ChunkPos,
        axis_flags: i32,
        pos: Vec3,
    },
    PlayerJump {
        player_id: i32,
    },
    ItemUpdate {
        items: Vec<ItemRecord>,
    },
    PlayerPickupItem {
        uuid: i32,
    },
    PlayerUnloadDroppedItem {
        uuid: i32,
    },
}

impl Message {
    pub fn packet_id(&self) -> PacketId {
        match self {
            Message::ChatMessage { .. } => PacketId::ChatMessage,
            Message::ServerMessage { .. } => PacketId::ServerMessage,
            Message::PlayerId { .. } => PacketId::PlayerId,
            Message::PlayerIdSaved => PacketId::PlayerIdSaved,
            Message::PlayerConnected => PacketId::PlayerConnected,
            Message::SaveItemList { .. } => PacketId::SaveItemList,
            Message::GetServerConfig => PacketId::GetServerConfig,
            Message::ServerConfig { .. } => PacketId::ServerConfig,
            Message::ClientConfig { .. } => PacketId::ClientConfig,
            Message::TimeOfDaySync { .. } => PacketId::TimeOfDaySync,
            Message::PlayerFullyConnected => PacketId::PlayerFullyConnected,
            Message::ChunkData { .. } => PacketId::ChunkData,
            Message::PlayerUnloadedChunks { .. } => PacketId::PlayerUnloadedChunks,
            Message::PlayerMovementAndCamera { .. } => PacketId::PlayerMovementAndCamera,
            Message::PlayerPosition { .. } => PacketId::PlayerPosition,
            Message::PlayerJump { .. } => PacketId::PlayerJump,
            Message::ItemUpdate { .. } => PacketId::ItemUpdate,
            Message::PlayerPickupItem { .. } => PacketId::PlayerPickupItem,
            Message::PlayerUnloadDroppedItem { .. } => PacketId::PlayerUnloadDroppedItem,
        }
    }

    /// Writes the message into `buf` (prepare + field writes). Returns false
    /// when the buffer entered write-error state; the caller abandons the
    /// send and the buffer recovers on its next `prepare`.
    pub fn encode(&self, buf: &PacketBuffer) -> bool {
        buf.prepare(self.packet_id());
        match self {
            Message::ChatMessage { text } | Message::ServerMessage { text } => buf.write_str(text),
            Message::PlayerId { player_id } | Message::PlayerJump { player_id } => {
                buf.write_i32(&[*player_id])
            }
            Message::PlayerIdSaved
            | Message::PlayerConnected
            | Message::GetServerConfig
            | Message::PlayerFullyConnected => true,
            Message::SaveItemList { json }
            | Message::ServerConfig { json }
            | Message::ClientConfig { json } => buf.write_str(json),
            Message::TimeOfDaySync { time_of_day } => buf.write_f32(&[*time_of_day]),
            Message::ChunkData { blob } => buf.write_bytes(blob),
            Message::PlayerUnloadedChunks { positions } => positions
                .iter()
                .all(|pos| buf.write_i32(&[pos.x, pos.z])),
            Message::PlayerMovementAndCamera {
                player_id,
                anim_id,
                pos,
                yaw,
                pitch,
            } => {
                buf.write_i32(&[*player_id, *anim_id])
                    && buf.write_f32(&[pos.x, pos.y, pos.z, *yaw, *pitch])
            }
            Message::PlayerPosition {
                on_ground,
                chunk,
                axis_flags: flags,
                pos,
            } => {
                let mut ok =
                    buf.write_i32(&[*on_ground as i32, chunk.x, chunk.z, *flags]);
                let has_y = flags & axis_flags::UPDATE_Y_AXIS != 0;
                let has_xz = flags & axis_flags::UPDATE_XZ_AXIS != 0;
                ok &= match (has_y, has_xz) {
                    (true, true) => buf.write_f32(&[pos.x, pos.y, pos.z]),
                    (true, false) => buf.write_f32(&[pos.y]),
                    (false, true) => buf.write_f32(&[pos.x, pos.z]),
                    (false, false) => true,
                };
                ok
            }
            Message::ItemUpdate { items } => items.iter().all(|item| {
                buf.write_i32(&[item.uuid, item.item_id])
                    && buf.write_f32(&[item.pos.x, item.pos.y, item.pos.z])
                    && buf.write_str(&item.entry_name)
                    && buf.write_separator()
            }),
            Message::PlayerPickupItem { uuid } | Message::PlayerUnloadDroppedItem { uuid } => {
                buf.write_i32(&[*uuid])
            }
        }
    }

    /// Encodes into a fresh buffer and returns the raw packet bytes.
    pub fn encode_to_bytes(&self) -> anyhow::Result<Bytes> {
        let buf = PacketBuffer::new();
        if !self.encode(&buf) {
            bail!("message too large for packet buffer");
        }
        buf.take().context("packet buffer in write-error state")
    }

    /// Decodes a raw packet (tag + payload). Undersized or malformed
    /// payloads return an error; callers log and drop them.
    pub fn decode(data: &[u8]) -> anyhow::Result<Message> {
        let (id, payload) = wire::split_packet(data)?;
        let mut r = Reader::new(payload);

        Ok(match id {
            PacketId::ChatMessage => Message::ChatMessage {
                text: String::from_utf8_lossy(r.read_rest()).into_owned(),
            },
            PacketId::ServerMessage => Message::ServerMessage {
                text: String::from_utf8_lossy(r.read_rest()).into_owned(),
            },
            PacketId::PlayerId => Message::PlayerId {
                player_id: r.read_i32()?,
            },
            PacketId::PlayerIdSaved => Message::PlayerIdSaved,
            PacketId::PlayerConnected => Message::PlayerConnected,
            PacketId::SaveItemList => Message::SaveItemList {
                json: String::from_utf8_lossy(r.read_rest()).into_owned(),
            },
            PacketId::GetServerConfig => Message::GetServerConfig,
            PacketId::ServerConfig => Message::ServerConfig {
                json: String::from_utf8_lossy(r.read_rest()).into_owned(),
            },
            PacketId::ClientConfig => Message::ClientConfig {
                json: String::from_utf8_lossy(r.read_rest()).into_owned(),
            },
            PacketId::TimeOfDaySync => Message::TimeOfDaySync {
                time_of_day: r.read_f32()?,
            },
            PacketId::PlayerFullyConnected => Message::PlayerFullyConnected,
            PacketId::ChunkData => Message::ChunkData {
                blob: r.read_rest().to_vec(),
            },
            PacketId::PlayerUnloadedChunks => {
                let mut positions = Vec::new();
                while r.remaining() >= 8 {
                    positions.push(ChunkPos::new(r.read_i32()?, r.read_i32()?));
                }
                if r.remaining() != 0 {
                    bail!("trailing bytes in PLAYER_UNLOADED_CHUNKS");
                }
                Message::PlayerUnloadedChunks { positions }
            }
            PacketId::PlayerMovementAndCamera => Message::PlayerMovementAndCamera {
                player_id: r.read_i32()?,
                anim_id: r.read_i32()?,
                pos: Vec3::new(r.read_f32()?, r.read_f32()?, r.read_f32()?),
                yaw: r.read_f32()?,
                pitch: r.read_f32()?,
            },
            PacketId::PlayerPosition => {
                let on_ground = r.read_bool()?;
                let chunk = ChunkPos::new(r.read_i32()?, r.read_i32()?);
                let flags = r.read_i32()?;
                let has_y = flags & axis_flags::UPDATE_Y_AXIS != 0;
                let has_xz = flags & axis_flags::UPDATE_XZ_AXIS != 0;
                let pos = match (has_y, has_xz) {
                    (true, true) => Vec3::new(r.read_f32()?, r.read_f32()?, r.read_f32()?),
                    (true, false) => Vec3::new(0.0, r.read_f32()?, 0.0),
                    (false, true) => {
                        let x = r.read_f32()?;
                        let z = r.read_f32()?;
                        Vec3::new(x, 0.0, z)
                    }
                    (false, false) => Vec3::ZERO,
                };
                Message::PlayerPosition {
                    on_ground,
                    chunk,
                    axis_flags: flags,
                    pos,
                }
            }
            PacketId::PlayerJump => Message::PlayerJump {
                player_id: r.read_i32()?,
            },
            PacketId::ItemUpdate => {
                let mut items = Vec::new();
                while r.remaining() > 0 {
                    let uuid = r.read_i32()?;
                    let item_id = r.read_i32()?;
                    let pos = Vec3::new(r.read_f32()?, r.read_f32()?, r.read_f32()?);
                    let entry_name =
                        String::from_utf8_lossy(r.read_until_separator()).into_owned();
                    items.push(ItemRecord {
                        uuid,
                        item_id,
                        pos,
                        entry_name,
                    });
                }
                Message::ItemUpdate { items }
            }
            PacketId::PlayerPickupItem => Message::PlayerPickupItem {
                uuid: r.read_i32()?,
            },
            PacketId::PlayerUnloadDroppedItem => Message::PlayerUnloadDroppedItem {
                uuid: r.read_i32()?,
            },
        })
    }
}

/// Packs chunk records into the raw (uncompressed) batch layout:
/// repeated `{i32 x, i32 z, f32 heights[samples]}`.
pub fn pack_chunk_records(out: &mut Vec<u8>, pos: ChunkPos, heights: &[f32]) {
    out.extend_from_slice(&pos.x.to_le_bytes());
    out.extend_from_slice(&pos.z.to_le_bytes());
    for h in heights {
        out.extend_from_slice(&h.to_le_bytes());
    }
}

/// Compresses a packed chunk batch for the wire. Fails when the compressed
/// blob cannot fit one datagram; the caller abandons the batch for this tick.
pub fn compress_chunk_records(raw: &[u8]) -> anyhow::Result<Vec<u8>> {
    let blob = lz4_flex::compress_prepend_size(raw);
    if blob.len() + PACKET_TAG_SIZE > MAX_PACKET_SIZE {
        bail!(
            "compressed chunk batch ({} bytes) exceeds the packet limit",
            blob.len()
        );
    }
    Ok(blob)
}

/// Inverse of [`compress_chunk_records`] + [`pack_chunk_records`].
/// `samples` is the `(N+1)^2` sample count from the server config.
pub fn decompress_chunk_records(blob: &[u8], samples: usize) -> anyhow::Result<Vec<ChunkRecord>> {
    let raw = lz4_flex::decompress_size_prepended(blob).context("decompress chunk batch")?;
    let record_size = 8 + samples * 4;
    if record_size == 8 || raw.len() % record_size != 0 {
        bail!(
            "chunk batch size {} is not a multiple of the record size {}",
            raw.len(),
            record_size
        );
    }

    let mut records = Vec::with_capacity(raw.len() / record_size);
    let mut r = Reader::new(&raw);
    while r.remaining() > 0 {
        let pos = ChunkPos::new(r.read_i32()?, r.read_i32()?);
        let mut heights = Vec::with_capacity(samples);
        for _ in 0..samples {
            heights.push(r.read_f32()?);
        }
        records.push(ChunkRecord { pos, heights });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(msg: Message) {
        let bytes = msg.encode_to_bytes().unwrap();
        let back = Message::decode(&bytes).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn simple_messages_roundtrip() {
        roundtrip(Message::PlayerId { player_id: 41 });
        roundtrip(Message::PlayerIdSaved);
        roundtrip(Message::PlayerConnected);
        roundtrip(Message::GetServerConfig);
        roundtrip(Message::PlayerFullyConnected);
        roundtrip(Message::TimeOfDaySync { time_of_day: 0.75 });
        roundtrip(Message::PlayerPickupItem { uuid: 1234 });
        roundtrip(Message::PlayerUnloadDroppedItem { uuid: -7 });
        roundtrip(Message::ChatMessage {
            text: "hello world".into(),
        });
        roundtrip(Message::SaveItemList {
            json: r#"{"apple":{}}"#.into(),
        });
    }

    #[test]
    fn movement_roundtrip() {
        roundtrip(Message::PlayerMovementAndCamera {
            player_id: 3,
            anim_id: 2,
            pos: Vec3::new(1.5, -2.25, 96.0),
            yaw: 180.0,
            pitch: -45.0,
        });
    }

    #[test]
    fn position_variants_roundtrip() {
        roundtrip(Message::PlayerPosition {
            on_ground: true,
            chunk: ChunkPos::new(-3, 9),
            axis_flags: axis_flags::UPDATE_Y_AXIS,
            pos: Vec3::new(0.0, 12.5, 0.0),
        });
        roundtrip(Message::PlayerPosition {
            on_ground: false,
            chunk: ChunkPos::new(0, 0),
            axis_flags: axis_flags::UPDATE_Y_AXIS | axis_flags::UPDATE_XZ_AXIS,
            pos: Vec3::new(4.0, 5.0, 6.0),
        });
        roundtrip(Message::PlayerPosition {
            on_ground: false,
            chunk: ChunkPos::new(2, 2),
            axis_flags: 0,
            pos: Vec3::ZERO,
        });
    }

    #[test]
    fn item_update_separator_roundtrip() {
        roundtrip(Message::ItemUpdate {
            items: vec![
                ItemRecord {
                    uuid: 10,
                    item_id: 0,
                    pos: Vec3::new(1.0, 2.0, 3.0),
                    entry_name: "apple".into(),
                },
                ItemRecord {
                    uuid: 11,
                    item_id: 2,
                    pos: Vec3::new(-4.0, 0.5, 9.0),
                    entry_name: "heavy_axe".into(),
                },
            ],
        });
    }

    #[test]
    fn unloaded_chunks_roundtrip() {
        roundtrip(Message::PlayerUnloadedChunks {
            positions: vec![ChunkPos::new(0, 0), ChunkPos::new(-1, 4)],
        });
    }

    #[test]
    fn undersized_payload_is_error_not_panic() {
        // PLAYER_MOVEMENT_AND_CAMERA with a truncated payload.
        let mut data = (PacketId::PlayerMovementAndCamera as i32)
            .to_le_bytes()
            .to_vec();
        data.extend_from_slice(&[0u8; 8]);
        assert!(Message::decode(&data).is_err());

        // Unknown tag.
        let data = 400i32.to_le_bytes().to_vec();
        assert!(Message::decode(&data).is_err());
    }

    #[test]
    fn chunk_blob_roundtrip() {
        let heights_a: Vec<f32> = (0..9).map(|i| i as f32 * 0.5).collect();
        let heights_b: Vec<f32> = (0..9).map(|i| -(i as f32)).collect();

        let mut raw = Vec::new();
        pack_chunk_records(&mut raw, ChunkPos::new(1, 2), &heights_a);
        pack_chunk_records(&mut raw, ChunkPos::new(-1, 0), &heights_b);

        let blob = compress_chunk_records(&raw).unwrap();
        let records = decompress_chunk_records(&blob, 9).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].pos, ChunkPos::new(1, 2));
        assert_eq!(records[0].heights, heights_a);
        assert_eq!(records[1].pos, ChunkPos::new(-1, 0));
        assert_eq!(records[1].heights, heights_b);
    }

    #[test]
    fn corrupt_chunk_blob_is_error() {
        assert!(decompress_chunk_records(&[1, 2, 3], 9).is_err());
    }
}
