//! Layered coherent-noise terrain synthesis.
//!
//! Heights are a pure function of (world coordinates, seed, config): the
//! same inputs produce bit-identical output on every call, which is what the
//! chunk pipeline and its tests rely on. The gradient-noise core is ordinary
//! 2D Perlin noise over a seeded permutation table.

use serde::{Deserialize, Serialize};

/// Terrain synthesis tunables.
///
/// "Alternation" is a second, lower-frequency noise signal that modulates a
/// layer's amplitude, so the amount of detail itself varies across the
/// world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseConfig {
    pub base_frq: f32,
    pub base_amp: f32,
    pub base_detail_frq: f32,
    pub base_detail_amp: f32,
    pub base_detail_alt: f32,
    pub mountain_frq: f32,
    pub mountain_amp: f32,
    pub mountain_alt: f32,
    pub mountain_iterations: i32,
    pub mountain_iteration_frq_add: f32,
    pub mountain_iteration_amp_add: f32,
    pub mountain_iteration_alt_add: f32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            base_frq: 0.1,
            base_amp: 8.0,
            base_detail_frq: 0.8,
            base_detail_amp: 0.5,
            base_detail_alt: 0.05,
            mountain_frq: 0.02,
            mountain_amp: 14.0,
            mountain_alt: 0.015,
            mountain_iterations: 3,
            mountain_iteration_frq_add: 0.01,
            mountain_iteration_amp_add: -3.0,
            mountain_iteration_alt_add: 0.005,
        }
    }
}

/// Seeded noise field evaluating the layered height function.
#[derive(Debug, Clone)]
pub struct NoiseField {
    cfg: NoiseConfig,
    perm: [u8; 512],
}

impl NoiseField {
    pub fn new(seed: u64, cfg: NoiseConfig) -> Self {
        Self {
            cfg,
            perm: build_permutation(seed),
        }
    }

    pub fn config(&self) -> &NoiseConfig {
        &self.cfg
    }

    /// Height at world-space (x, z).
    pub fn height(&self, x: f32, z: f32) -> f32 {
        let cfg = &self.cfg;

        // Broad low-frequency base layer.
        let mut base = self.perlin(x * cfg.base_frq, z * cfg.base_frq) * cfg.base_amp;

        // High-frequency detail, amplitude modulated by a slower signal.
        let detail_alt = 2.0 * self.perlin(x * cfg.base_detail_alt, z * cfg.base_detail_alt);
        base += self.perlin(x * cfg.base_detail_frq, z * cfg.base_detail_frq)
            * (cfg.base_detail_amp * detail_alt);

        // Iterative mountain accumulation with fixed per-iteration deltas.
        let mut mountains = 0.0;
        let mut frq = cfg.mountain_frq;
        let mut amp = cfg.mountain_amp;
        let mut alt = cfg.mountain_alt;
        for _ in 0..cfg.mountain_iterations {
            mountains +=
                self.perlin(x * frq, z * frq) * amp * (2.0 * self.perlin(x * alt, z * alt));
            frq += cfg.mountain_iteration_frq_add;
            amp += cfg.mountain_iteration_amp_add;
            alt += cfg.mountain_iteration_alt_add;
        }

        base + mountains
    }

    /// 2D Perlin noise in roughly [-1, 1].
    fn perlin(&self, x: f32, z: f32) -> f32 {
        let xi = x.floor() as i32;
        let zi = z.floor() as i32;
        let xf = x - xi as f32;
        let zf = z - zi as f32;

        let u = fade(xf);
        let v = fade(zf);

        let xi = (xi & 255) as usize;
        let zi = (zi & 255) as usize;

        let aa = self.perm[self.perm[xi] as usize + zi];
        let ab = self.perm[self.perm[xi] as usize + zi + 1];
        let ba = self.perm[self.perm[xi + 1] as usize + zi];
        let bb = self.perm[self.perm[xi + 1] as usize + zi + 1];

        let x1 = lerp(grad(aa, xf, zf), grad(ba, xf - 1.0, zf), u);
        let x2 = lerp(grad(ab, xf, zf - 1.0), grad(bb, xf - 1.0, zf - 1.0), u);
        lerp(x1, x2, v)
    }
}

fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + t * (b - a)
}

fn grad(hash: u8, x: f32, z: f32) -> f32 {
    match hash & 7 {
        0 => x + z,
        1 => x - z,
        2 => -x + z,
        3 => -x - z,
        4 => x,
        5 => -x,
        6 => z,
        _ => -z,
    }
}

/// Permutation table from a Fisher-Yates shuffle driven by an LCG.
fn build_permutation(seed: u64) -> [u8; 512] {
    let mut p: [u8; 256] = [0; 256];
    for (i, val) in p.iter_mut().enumerate() {
        *val = i as u8;
    }

    let mut rng = seed;
    for i in (1..256).rev() {
        rng = rng
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let j = (rng >> 33) as usize % (i + 1);
        p.swap(i, j);
    }

    let mut perm = [0u8; 512];
    for (i, val) in perm.iter_mut().enumerate() {
        *val = p[i & 255];
    }
    perm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_is_deterministic() {
        let a = NoiseField::new(42, NoiseConfig::default());
        let b = NoiseField::new(42, NoiseConfig::default());
        for i in 0..64 {
            let x = i as f32 * 1.37 - 20.0;
            let z = i as f32 * -0.73 + 5.0;
            assert_eq!(a.height(x, z).to_bits(), b.height(x, z).to_bits());
        }
    }

    #[test]
    fn different_seeds_differ() {
        let a = NoiseField::new(1, NoiseConfig::default());
        let b = NoiseField::new(2, NoiseConfig::default());
        let differs = (0..32).any(|i| {
            let x = i as f32 * 0.9;
            a.height(x, x) != b.height(x, x)
        });
        assert!(differs, "seed must influence the field");
    }

    #[test]
    fn perlin_stays_bounded() {
        let field = NoiseField::new(7, NoiseConfig::default());
        for i in 0..256 {
            let v = field.perlin(i as f32 * 0.31, i as f32 * 0.17);
            assert!(v.abs() <= 1.5, "perlin out of expected range: {v}");
        }
    }
}
