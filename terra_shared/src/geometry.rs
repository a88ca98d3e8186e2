//! Ray and triangle primitives for terrain surface queries.

use crate::math::Vec3;

const EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, Default)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

impl Triangle {
    pub const fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { a, b, c }
    }
}

/// One terrain cell: two triangles sharing an edge.
#[derive(Debug, Clone, Copy, Default)]
pub struct CellRect {
    pub ta: Triangle,
    pub tb: Triangle,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RayHit {
    pub hit: bool,
    pub distance: f32,
    pub point: Vec3,
    pub normal: Vec3,
}

#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub const fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Moller-Trumbore ray/triangle intersection with an epsilon guard
    /// against near-parallel rays.
    pub fn triangle_intersection(&self, tri: &Triangle) -> RayHit {
        let mut result = RayHit::default();

        let edge1 = tri.b - tri.a;
        let edge2 = tri.c - tri.a;

        let p = self.direction.cross(edge2);
        let det = edge1.dot(p);
        if det > -EPSILON && det < EPSILON {
            return result; // Ray parallel to the triangle plane.
        }
        let inv_det = 1.0 / det;

        let to_origin = self.origin - tri.a;
        let u = to_origin.dot(p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return result;
        }

        let q = to_origin.cross(edge1);
        let v = self.direction.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return result;
        }

        let t = edge2.dot(q) * inv_det;
        if t > EPSILON {
            result.hit = true;
            result.distance = t;
            result.normal = edge1.cross(edge2).normalized();
            result.point = self.origin + self.direction * t;
        }
        result
    }

    /// Tests both triangles of a cell, first one first.
    pub fn cell_intersection(&self, rect: &CellRect) -> RayHit {
        let hit = self.triangle_intersection(&rect.ta);
        if hit.hit {
            return hit;
        }
        self.triangle_intersection(&rect.tb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn down_ray(x: f32, z: f32) -> Ray {
        Ray::new(Vec3::new(x, 10.0, z), Vec3::new(0.0, -1.0, 0.0))
    }

    #[test]
    fn vertical_ray_hits_flat_triangle() {
        // Unit triangle in the y=2 plane; hit point is analytic.
        let tri = Triangle::new(
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(4.0, 2.0, 0.0),
            Vec3::new(0.0, 2.0, 4.0),
        );
        let hit = down_ray(1.0, 1.0).triangle_intersection(&tri);
        assert!(hit.hit);
        assert!((hit.point.y - 2.0).abs() < 1e-4);
        assert!((hit.distance - 8.0).abs() < 1e-4);
    }

    #[test]
    fn miss_outside_second_edge() {
        // Point (3, 3) has u + v > 1 for this triangle: a correct
        // implementation must miss even though u alone is within bounds.
        let tri = Triangle::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(4.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 4.0),
        );
        let hit = down_ray(3.0, 3.0).triangle_intersection(&tri);
        assert!(!hit.hit);
    }

    #[test]
    fn parallel_ray_misses() {
        let tri = Triangle::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        );
        let ray = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        assert!(!ray.triangle_intersection(&tri).hit);
    }

    #[test]
    fn cell_falls_back_to_second_triangle() {
        let rect = CellRect {
            ta: Triangle::new(
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(1.0, 1.0, 1.0),
            ),
            tb: Triangle::new(
                Vec3::new(0.0, 1.0, 1.0),
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(1.0, 1.0, 1.0),
            ),
        };
        // (0.2, 0.8) lies in the second triangle of the split.
        let hit = down_ray(0.2, 0.8).cell_intersection(&rect);
        assert!(hit.hit);
        assert!((hit.point.y - 1.0).abs() < 1e-4);
    }
}
