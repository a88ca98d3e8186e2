//! Terrain chunk data.

use serde::{Deserialize, Serialize};

use crate::noise::NoiseField;

/// Divisor applied to world grid coordinates before noise evaluation.
const NOISE_SAMPLE_SCALE: f32 = 10.0;

/// Integer chunk grid coordinate. The sole key for chunk lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// One square terrain tile: `(N+1) x (N+1)` height samples in row-major
/// order (z-major, x-minor), where N is the configured chunk edge length.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub pos: ChunkPos,
    heights: Vec<f32>,
    chunk_size: u8,
    loaded: bool,
}

impl Chunk {
    /// Generates the heightmap for `pos`. Pure: the output depends only on
    /// the chunk position, the noise field (seed + config), and the edge
    /// length.
    pub fn generate(noise: &NoiseField, pos: ChunkPos, chunk_size: u8) -> Self {
        let edge = chunk_size as i32;
        let samples = ((edge + 1) * (edge + 1)) as usize;
        let mut heights = Vec::with_capacity(samples);

        for local_z in 0..=edge {
            for local_x in 0..=edge {
                let world_x = (local_x + pos.x * edge) as f32 / NOISE_SAMPLE_SCALE;
                let world_z = (local_z + pos.z * edge) as f32 / NOISE_SAMPLE_SCALE;
                heights.push(noise.height(world_x, world_z));
            }
        }

        Self {
            pos,
            heights,
            chunk_size,
            loaded: true,
        }
    }

    /// Height sample at local grid coordinates. Out-of-range coordinates and
    /// unloaded chunks read as 0.
    pub fn height_at(&self, local_x: i32, local_z: i32) -> f32 {
        if !self.loaded || local_x < 0 || local_z < 0 {
            return 0.0;
        }
        let stride = self.chunk_size as i32 + 1;
        if local_x >= stride || local_z >= stride {
            return 0.0;
        }
        self.heights[(local_z * stride + local_x) as usize]
    }

    /// Raw sample view for wire packing.
    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    pub fn sample_count(&self) -> usize {
        let stride = self.chunk_size as usize + 1;
        stride * stride
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Releases the heightmap memory.
    pub fn unload(&mut self) {
        if !self.loaded {
            tracing::warn!(pos = ?self.pos, "unload of a chunk that is not loaded");
            return;
        }
        self.heights = Vec::new();
        self.loaded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::NoiseConfig;

    fn field() -> NoiseField {
        NoiseField::new(42, NoiseConfig::default())
    }

    #[test]
    fn generation_is_deterministic() {
        let noise = field();
        let a = Chunk::generate(&noise, ChunkPos::new(3, -2), 16);
        let b = Chunk::generate(&noise, ChunkPos::new(3, -2), 16);
        assert_eq!(a.heights(), b.heights());
    }

    #[test]
    fn sample_count_matches_edge_length() {
        let chunk = Chunk::generate(&field(), ChunkPos::new(0, 0), 16);
        assert_eq!(chunk.heights().len(), 17 * 17);
        assert_eq!(chunk.sample_count(), 17 * 17);
    }

    #[test]
    fn row_major_indexing() {
        let chunk = Chunk::generate(&field(), ChunkPos::new(1, 1), 4);
        // height_at(x, z) must read row z, column x.
        assert_eq!(chunk.height_at(3, 2), chunk.heights()[2 * 5 + 3]);
        assert_eq!(chunk.height_at(5, 0), 0.0);
        assert_eq!(chunk.height_at(0, -1), 0.0);
    }

    #[test]
    fn unload_releases_heights() {
        let mut chunk = Chunk::generate(&field(), ChunkPos::new(0, 0), 8);
        assert!(chunk.is_loaded());
        chunk.unload();
        assert!(!chunk.is_loaded());
        assert_eq!(chunk.height_at(1, 1), 0.0);
    }
}
