//! Server-side player state.

use std::collections::HashSet;

use terra_shared::chunk::ChunkPos;
use terra_shared::config::ServerConfig;
use terra_shared::items::Inventory;
use terra_shared::math::Vec3;

use crate::session::SessionHandle;

/// Server-assigned player id, unique while the player is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub i32);

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected player. Owned exclusively by the player registry; the
/// session holds a non-owning handle back for message delivery.
pub struct Player {
    pub id: PlayerId,
    pub pos: Vec3,
    pub velocity: Vec3,
    pub cam_yaw: f32,
    pub cam_pitch: f32,
    pub anim_id: i32,
    pub on_ground: bool,
    pub surface_y: f32,
    /// Set when the server corrected the XZ position this tick; the next
    /// `PLAYER_POSITION` packet then carries all three axes.
    pub pos_xz_updated: bool,
    /// Chunk coordinates already transmitted to this player and not yet
    /// unloaded by them.
    pub loaded_chunks: HashSet<ChunkPos>,
    pub inventory: Inventory,
    pub session: SessionHandle,
}

impl Player {
    pub fn new(id: PlayerId, session: SessionHandle, cfg: &ServerConfig) -> Self {
        let (inv_x, inv_y) = cfg.inventory_size;
        Self {
            id,
            pos: Vec3::ZERO,
            velocity: Vec3::ZERO,
            cam_yaw: 0.0,
            cam_pitch: 0.0,
            anim_id: 0,
            on_ground: true,
            surface_y: 0.0,
            pos_xz_updated: false,
            loaded_chunks: HashSet::new(),
            inventory: Inventory::new(inv_x, inv_y),
            session,
        }
    }

    pub fn is_fully_connected(&self) -> bool {
        self.session.is_fully_connected()
    }
}
