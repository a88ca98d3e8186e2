//! Configuration system.
//!
//! The server consumes configuration as already-parsed values; file IO is
//! left to the app. JSON parsing exists because the same documents travel
//! over the wire during the connection handshake.

use serde::{Deserialize, Serialize};

use crate::noise::NoiseConfig;

/// Root server configuration. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Reliable (stream) channel port.
    pub tcp_port: u16,
    /// Unreliable (datagram) channel port.
    pub udp_port: u16,
    /// Chunk edge length in grid cells. The heightmap holds
    /// `(chunk_size + 1)^2` samples.
    pub chunk_size: u8,
    /// World-unit size of one grid cell.
    pub chunk_scale: f32,
    /// Target interval of the simulation loop in milliseconds.
    pub tick_delay_ms: f32,
    /// Interest radius for chunk and player updates, in chunk units.
    pub render_distance: i32,
    /// Upper bound for one player's uncompressed chunk batch per tick.
    #[serde(default = "default_chunkdata_max_bytes")]
    pub chunkdata_max_bytes: usize,
    /// Downward acceleration applied per tick.
    pub gravity: f32,
    /// Vertical offset between terrain surface and the player camera.
    pub player_cam_height: f32,
    /// Impulse applied on a jump request.
    #[serde(default = "default_jump_force")]
    pub player_jump_force: f32,
    /// Items farther than this from a player are not announced to them.
    pub item_near_distance: f32,
    /// Maximum distance at which a pickup request is honored.
    pub item_pickup_distance: f32,
    /// Length of one full in-game day in real minutes.
    pub day_cycle_minutes: f32,
    /// Slot grid of a freshly created player inventory.
    #[serde(default = "default_inventory_size")]
    pub inventory_size: (u8, u8),
    /// Terrain synthesis tunables.
    #[serde(default)]
    pub noise: NoiseConfig,
    /// World seed for terrain generation.
    #[serde(default)]
    pub world_seed: u64,
}

fn default_chunkdata_max_bytes() -> usize {
    32 * 1024
}

fn default_jump_force() -> f32 {
    1.0
}

fn default_inventory_size() -> (u8, u8) {
    (9, 4)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tcp_port: 40_100,
            udp_port: 40_101,
            chunk_size: 16,
            chunk_scale: 1.0,
            tick_delay_ms: 40.0,
            render_distance: 2,
            chunkdata_max_bytes: default_chunkdata_max_bytes(),
            gravity: 9.8,
            player_cam_height: 1.8,
            player_jump_force: default_jump_force(),
            item_near_distance: 64.0,
            item_pickup_distance: 3.0,
            day_cycle_minutes: 20.0,
            inventory_size: default_inventory_size(),
            noise: NoiseConfig::default(),
            world_seed: 0,
        }
    }
}

impl ServerConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Serializes the config for the `SERVER_CONFIG` handshake packet.
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Side length of one chunk in world units.
    pub fn chunk_world_size(&self) -> f32 {
        self.chunk_size as f32 * self.chunk_scale
    }
}

/// Per-client configuration announced during the handshake.
/// Opaque to the simulation beyond the fields below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub player_name: String,
    /// Client-side render distance preference, in chunk units.
    #[serde(default)]
    pub render_distance: i32,
}

impl ClientConfig {
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_json_roundtrip() {
        let cfg = ServerConfig::default();
        let json = cfg.to_json_string().unwrap();
        let back = ServerConfig::from_json_str(&json).unwrap();
        assert_eq!(back.chunk_size, cfg.chunk_size);
        assert_eq!(back.tcp_port, cfg.tcp_port);
        assert_eq!(back.day_cycle_minutes, cfg.day_cycle_minutes);
    }

    #[test]
    fn client_config_defaults_on_missing_fields() {
        let cfg = ClientConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg.render_distance, 0);
        assert!(cfg.player_name.is_empty());
    }
}
