//! Spatial chunk storage and terrain queries.
//!
//! `ChunkMap` is the in-lock data structure; `ChunkStore` wraps it in the
//! single mutex shared by the tick loop, the world-gen loop, and surface
//! queries. Callers hold the guard across any lookup-then-use sequence.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use terra_shared::chunk::{Chunk, ChunkPos};
use terra_shared::config::ServerConfig;
use terra_shared::geometry::{CellRect, Ray, Triangle};
use terra_shared::math::Vec3;
use terra_shared::noise::NoiseField;

/// Height the surface ray starts above the query point.
const SURFACE_RAY_HEIGHT: f32 = 10.0;

/// Chunk lookup and geometry queries. Only ever touched through the store's
/// lock.
pub struct ChunkMap {
    chunks: HashMap<ChunkPos, Chunk>,
    chunk_size: u8,
    chunk_scale: f32,
}

impl ChunkMap {
    fn new(cfg: &ServerConfig) -> Self {
        Self {
            chunks: HashMap::new(),
            chunk_size: cfg.chunk_size,
            chunk_scale: cfg.chunk_scale,
        }
    }

    pub fn insert(&mut self, chunk: Chunk) {
        self.chunks.insert(chunk.pos, chunk);
    }

    pub fn get(&self, pos: &ChunkPos) -> Option<&Chunk> {
        self.chunks.get(pos)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Unloads every chunk and empties the map. Returns how many chunks
    /// were released.
    pub fn release_all(&mut self) -> usize {
        let count = self.chunks.len();
        for chunk in self.chunks.values_mut() {
            chunk.unload();
        }
        self.chunks.clear();
        count
    }

    /// Chunk grid coordinate containing a world position.
    pub fn chunk_pos_at(&self, world_x: f32, world_z: f32) -> ChunkPos {
        let side = self.chunk_size as f32 * self.chunk_scale;
        ChunkPos::new(
            (world_x / side).floor() as i32,
            (world_z / side).floor() as i32,
        )
    }

    /// Grid coordinates within the containing chunk, in `0..chunk_size`.
    fn local_coords(&self, world_x: f32, world_z: f32) -> (i32, i32) {
        let size = self.chunk_size as i32;
        let rx = (world_x / self.chunk_scale).floor() as i32;
        let rz = (world_z / self.chunk_scale).floor() as i32;
        ((rx % size + size) % size, (rz % size + size) % size)
    }

    /// Visits the `(2R+1) x (2R+1)` chunk neighborhood around the position,
    /// row-major (z outer, x inner). Missing chunks are passed as `None`;
    /// the world-gen loop generates on `None`, the tick loop skips.
    pub fn for_each_nearby(
        &self,
        world_x: f32,
        world_z: f32,
        radius: i32,
        mut callback: impl FnMut(Option<&Chunk>, ChunkPos),
    ) {
        let center = self.chunk_pos_at(world_x, world_z);
        for local_z in -radius..=radius {
            for local_x in -radius..=radius {
                let pos = ChunkPos::new(center.x + local_x, center.z + local_z);
                callback(self.chunks.get(&pos), pos);
            }
        }
    }

    /// Terrain mesh vertex at the grid point below the world position,
    /// shifted by `offset` grid cells. Zero when the chunk is missing.
    fn vertex_at(&self, world_x: f32, world_z: f32, offset: (i32, i32)) -> Vec3 {
        let world_x = world_x + offset.0 as f32 * self.chunk_scale;
        let world_z = world_z + offset.1 as f32 * self.chunk_scale;

        let Some(chunk) = self.chunks.get(&self.chunk_pos_at(world_x, world_z)) else {
            return Vec3::ZERO;
        };

        let (local_x, local_z) = self.local_coords(world_x, world_z);
        Vec3::new(
            (world_x / self.chunk_scale).floor() * self.chunk_scale,
            chunk.height_at(local_x, local_z),
            (world_z / self.chunk_scale).floor() * self.chunk_scale,
        )
    }

    /// The two mesh triangles of the grid cell below the world position,
    /// shifted by `offset` grid cells.
    fn cell_rect(&self, world_x: f32, world_z: f32, offset: (i32, i32)) -> CellRect {
        let world_x = world_x + offset.0 as f32 * self.chunk_scale;
        let world_z = world_z + offset.1 as f32 * self.chunk_scale;

        let a = self.vertex_at(world_x, world_z, (0, 0));
        let b = self.vertex_at(world_x, world_z, (1, 0));
        let c = self.vertex_at(world_x, world_z, (1, 1));
        let d = self.vertex_at(world_x, world_z, (0, 1));

        CellRect {
            ta: Triangle::new(a, b, c),
            tb: Triangle::new(d, a, c),
        }
    }

    /// Terrain surface height below a world position.
    ///
    /// Casts a downward ray from above the point, testing the cell directly
    /// below first and falling back to a 3x3 cell sweep. Returns 0 when
    /// nothing is hit (no generated chunk below the point).
    pub fn surface_level(&self, world_pos: Vec3) -> f32 {
        let ray = Ray::new(
            world_pos + Vec3::new(0.0, SURFACE_RAY_HEIGHT, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
        );

        let rect = self.cell_rect(world_pos.x, world_pos.z, (0, 0));
        let mut hit = ray.cell_intersection(&rect);

        if !hit.hit {
            'sweep: for offset_z in -1..=1 {
                for offset_x in -1..=1 {
                    let rect = self.cell_rect(world_pos.x, world_pos.z, (offset_x, offset_z));
                    hit = ray.cell_intersection(&rect);
                    if hit.hit {
                        break 'sweep;
                    }
                }
            }
        }

        hit.point.y
    }
}

/// The chunk store: one lock shared with all readers, plus the immutable
/// noise field chunks are generated from.
pub struct ChunkStore {
    noise: NoiseField,
    chunk_size: u8,
    map: Mutex<ChunkMap>,
}

impl ChunkStore {
    pub fn new(cfg: &ServerConfig) -> Self {
        Self {
            noise: NoiseField::new(cfg.world_seed, cfg.noise.clone()),
            chunk_size: cfg.chunk_size,
            map: Mutex::new(ChunkMap::new(cfg)),
        }
    }

    /// Acquires the chunk-map lock. Hold the guard for the whole
    /// read-modify sequence.
    pub fn lock(&self) -> MutexGuard<'_, ChunkMap> {
        self.map.lock().unwrap()
    }

    pub fn noise(&self) -> &NoiseField {
        &self.noise
    }

    /// Generates the chunk at `pos` from the store's noise field.
    pub fn generate_chunk(&self, pos: ChunkPos) -> Chunk {
        Chunk::generate(&self.noise, pos, self.chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(chunk_size: u8, chunk_scale: f32) -> ChunkStore {
        let cfg = ServerConfig {
            chunk_size,
            chunk_scale,
            world_seed: 42,
            ..Default::default()
        };
        ChunkStore::new(&cfg)
    }

    #[test]
    fn chunk_pos_floor_division() {
        let store = store(16, 1.0);
        let map = store.lock();
        assert_eq!(map.chunk_pos_at(0.0, 0.0), ChunkPos::new(0, 0));
        assert_eq!(map.chunk_pos_at(15.9, 15.9), ChunkPos::new(0, 0));
        assert_eq!(map.chunk_pos_at(16.0, 0.0), ChunkPos::new(1, 0));
        assert_eq!(map.chunk_pos_at(-0.1, -16.1), ChunkPos::new(-1, -2));
    }

    #[test]
    fn nearby_visits_square_in_row_major_order() {
        let store = store(16, 1.0);
        let map = store.lock();

        let mut visited = Vec::new();
        map.for_each_nearby(8.0, 8.0, 2, |chunk, pos| {
            assert!(chunk.is_none());
            visited.push(pos);
        });

        assert_eq!(visited.len(), 25);
        // Distinct positions.
        let unique: std::collections::HashSet<_> = visited.iter().copied().collect();
        assert_eq!(unique.len(), 25);
        // Row-major: z outer, x inner.
        assert_eq!(visited[0], ChunkPos::new(-2, -2));
        assert_eq!(visited[1], ChunkPos::new(-1, -2));
        assert_eq!(visited[5], ChunkPos::new(-2, -1));
        assert_eq!(visited[24], ChunkPos::new(2, 2));
    }

    #[test]
    fn nearby_passes_existing_chunks() {
        let store = store(8, 1.0);
        let mut map = store.lock();
        map.insert(store.generate_chunk(ChunkPos::new(0, 0)));

        let mut found = 0;
        let mut missing = 0;
        map.for_each_nearby(1.0, 1.0, 1, |chunk, _| match chunk {
            Some(_) => found += 1,
            None => missing += 1,
        });
        assert_eq!(found, 1);
        assert_eq!(missing, 8);
    }

    #[test]
    fn surface_level_stays_within_cell_bounds() {
        let store = store(8, 1.0);
        {
            let mut map = store.lock();
            for z in -1..=1 {
                for x in -1..=1 {
                    map.insert(store.generate_chunk(ChunkPos::new(x, z)));
                }
            }
        }

        let map = store.lock();
        let chunk = map.get(&ChunkPos::new(0, 0)).unwrap();
        // Query in the middle of cell (3,3): the surface must lie between
        // the cell's corner heights.
        let corners = [
            chunk.height_at(3, 3),
            chunk.height_at(4, 3),
            chunk.height_at(4, 4),
            chunk.height_at(3, 4),
        ];
        let lo = corners.iter().cloned().fold(f32::INFINITY, f32::min);
        let hi = corners.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

        let y = map.surface_level(Vec3::new(3.5, 5.0 + hi, 3.5));
        assert!(
            y >= lo - 1e-3 && y <= hi + 1e-3,
            "surface {y} outside corner range [{lo}, {hi}]"
        );
    }

    #[test]
    fn surface_level_zero_without_chunks() {
        let store = store(8, 1.0);
        let map = store.lock();
        assert_eq!(map.surface_level(Vec3::new(100.0, 50.0, 100.0)), 0.0);
    }

    #[test]
    fn release_all_unloads_everything() {
        let store = store(8, 1.0);
        let mut map = store.lock();
        map.insert(store.generate_chunk(ChunkPos::new(0, 0)));
        map.insert(store.generate_chunk(ChunkPos::new(1, 0)));
        assert_eq!(map.release_all(), 2);
        assert!(map.is_empty());
    }
}
