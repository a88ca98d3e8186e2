//! Wire protocol agreements.
//!
//! Every packet on either transport starts with a 4-byte little-endian
//! packet id. Fixed-width fields follow; variable-length records inside one
//! packet are delimited with [`PACKET_DATA_SEPARATOR`]. The reliable channel
//! additionally wraps each packet in a little-endian `u32` length prefix.

use anyhow::bail;

/// Sentinel byte between repeated variable-length records in one packet.
pub const PACKET_DATA_SEPARATOR: u8 = 0x1F;

/// Hard cap for a single packet on either transport.
pub const MAX_PACKET_SIZE: usize = 1024 * 34;

/// Size of the packet id tag.
pub const PACKET_TAG_SIZE: usize = 4;

/// Chat messages longer than this are dropped before broadcast.
pub const MAX_CHAT_LEN: usize = 512;

/// Packet type tags. The discriminant is the on-wire value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum PacketId {
    ChatMessage = 1,
    ServerMessage = 2,
    PlayerId = 3,
    PlayerIdSaved = 4,
    PlayerConnected = 5,
    SaveItemList = 6,
    GetServerConfig = 7,
    ServerConfig = 8,
    ClientConfig = 9,
    PlayerFullyConnected = 10,
    ChunkData = 11,
    PlayerUnloadedChunks = 12,
    PlayerMovementAndCamera = 13,
    PlayerPosition = 14,
    PlayerJump = 15,
    ItemUpdate = 16,
    TimeOfDaySync = 17,
    PlayerPickupItem = 18,
    PlayerUnloadDroppedItem = 19,
}

impl PacketId {
    pub fn from_i32(v: i32) -> Option<Self> {
        Some(match v {
            1 => Self::ChatMessage,
            2 => Self::ServerMessage,
            3 => Self::PlayerId,
            4 => Self::PlayerIdSaved,
            5 => Self::PlayerConnected,
            6 => Self::SaveItemList,
            7 => Self::GetServerConfig,
            8 => Self::ServerConfig,
            9 => Self::ClientConfig,
            10 => Self::PlayerFullyConnected,
            11 => Self::ChunkData,
            12 => Self::PlayerUnloadedChunks,
            13 => Self::PlayerMovementAndCamera,
            14 => Self::PlayerPosition,
            15 => Self::PlayerJump,
            16 => Self::ItemUpdate,
            17 => Self::TimeOfDaySync,
            18 => Self::PlayerPickupItem,
            19 => Self::PlayerUnloadDroppedItem,
            _ => return None,
        })
    }

    /// Minimum payload size (bytes after the tag). Packets under the minimum
    /// are dropped by the session layer with a logged diagnostic.
    pub fn min_payload_size(self) -> usize {
        match self {
            Self::ChatMessage => 1,
            Self::PlayerId => 4,
            Self::PlayerMovementAndCamera => 28,
            Self::PlayerPosition => 16,
            Self::PlayerJump => 4,
            Self::PlayerUnloadedChunks => 8,
            Self::ItemUpdate => 21,
            Self::TimeOfDaySync => 4,
            Self::PlayerPickupItem => 4,
            Self::PlayerUnloadDroppedItem => 4,
            Self::ChunkData => 4,
            _ => 0,
        }
    }
}

/// Bit flags for the `PLAYER_POSITION` `update_axis` field.
pub mod axis_flags {
    pub const UPDATE_Y_AXIS: i32 = 1 << 0;
    pub const UPDATE_XZ_AXIS: i32 = 1 << 1;
}

/// Sequential little-endian field reader over one packet's payload.
///
/// All typed decoding goes through this single reader so per-packet code
/// never does offset arithmetic by hand.
pub struct Reader<'a> {
    buf: &'a [u8],
    off: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, off: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.off
    }

    pub fn read_i32(&mut self) -> anyhow::Result<i32> {
        let bytes = self.read_exact(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_f32(&mut self) -> anyhow::Result<f32> {
        let bytes = self.read_exact(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_bool(&mut self) -> anyhow::Result<bool> {
        Ok(self.read_i32()? != 0)
    }

    /// Consumes everything up to the next separator (or the end of the
    /// payload) and positions the reader after the separator.
    pub fn read_until_separator(&mut self) -> &'a [u8] {
        let start = self.off;
        while self.off < self.buf.len() && self.buf[self.off] != PACKET_DATA_SEPARATOR {
            self.off += 1;
        }
        let out = &self.buf[start..self.off];
        if self.off < self.buf.len() {
            self.off += 1; // skip the separator itself
        }
        out
    }

    /// Consumes the rest of the payload.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.off..];
        self.off = self.buf.len();
        out
    }

    fn read_exact(&mut self, n: usize) -> anyhow::Result<&'a [u8]> {
        if self.remaining() < n {
            bail!(
                "payload truncated: wanted {n} bytes, {} remaining",
                self.remaining()
            );
        }
        let out = &self.buf[self.off..self.off + n];
        self.off += n;
        Ok(out)
    }
}

/// Splits a raw packet into its id and payload.
pub fn split_packet(data: &[u8]) -> anyhow::Result<(PacketId, &[u8])> {
    if data.len() < PACKET_TAG_SIZE {
        bail!("packet shorter than its type tag ({} bytes)", data.len());
    }
    let tag = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let Some(id) = PacketId::from_i32(tag) else {
        bail!("unknown packet id {tag}");
    };
    let payload = &data[PACKET_TAG_SIZE..];
    if payload.len() < id.min_payload_size() {
        bail!(
            "undersized {:?} payload: {} bytes, minimum {}",
            id,
            payload.len(),
            id.min_payload_size()
        );
    }
    Ok((id, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_id_tag_roundtrip() {
        for tag in 1..=19 {
            let id = PacketId::from_i32(tag).unwrap();
            assert_eq!(id as i32, tag);
        }
        assert!(PacketId::from_i32(0).is_none());
        assert!(PacketId::from_i32(999).is_none());
    }

    #[test]
    fn split_rejects_undersized() {
        // PLAYER_ID needs 4 payload bytes.
        let mut data = (PacketId::PlayerId as i32).to_le_bytes().to_vec();
        data.extend_from_slice(&[0, 0]);
        assert!(split_packet(&data).is_err());

        data.extend_from_slice(&[0, 0]);
        let (id, payload) = split_packet(&data).unwrap();
        assert_eq!(id, PacketId::PlayerId);
        assert_eq!(payload.len(), 4);
    }

    #[test]
    fn reader_separator_records() {
        let buf = [b'a', b'b', PACKET_DATA_SEPARATOR, b'c'];
        let mut reader = Reader::new(&buf);
        assert_eq!(reader.read_until_separator(), b"ab");
        assert_eq!(reader.read_until_separator(), b"c");
        assert_eq!(reader.remaining(), 0);
    }
}
