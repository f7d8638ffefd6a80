// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometric predicates shared by the repair, splitting and triangulation
//! code. Everything here is pure and works on plain `glam` vectors.

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Newell's method. Works for concave and slightly non-planar polygons and
/// returns the (unnormalized) area-weighted normal, whose length is twice the
/// area of the polygon.
pub fn newell_normal(points: impl Iterator<Item = Vec3> + Clone) -> Vec3 {
    let mut normal = Vec3::ZERO;
    let mut it = points.clone();
    let first = match it.next() {
        Some(p) => p,
        None => return Vec3::ZERO,
    };
    let mut prev = first;
    for p in it.chain(std::iter::once(first)) {
        normal.x += (prev.y - p.y) * (prev.z + p.z);
        normal.y += (prev.z - p.z) * (prev.x + p.x);
        normal.z += (prev.x - p.x) * (prev.y + p.y);
        prev = p;
    }
    normal
}

/// Unit normal of the polygon, or zero for degenerate polygons.
pub fn polygon_normal(points: impl Iterator<Item = Vec3> + Clone) -> Vec3 {
    newell_normal(points).normalize_or_zero()
}

pub fn polygon_centroid(points: impl Iterator<Item = Vec3>) -> Vec3 {
    let mut sum = Vec3::ZERO;
    let mut count = 0;
    for p in points {
        sum += p;
        count += 1;
    }
    if count == 0 {
        Vec3::ZERO
    } else {
        sum / count as f32
    }
}

/// Twice the signed area of the triangle `abc`. Positive when counter-clockwise.
#[inline]
pub fn cross2(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b - a).perp_dot(c - a)
}

/// Signed area of a closed 2D polygon. Positive when counter-clockwise.
pub fn signed_area_2d(points: &[Vec2]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        area += a.perp_dot(b);
    }
    area * 0.5
}

/// Inclusive point in triangle test. Points on the boundary (within
/// `epsilon`) count as inside. Works for both windings.
pub fn point_in_triangle_2d(p: Vec2, a: Vec2, b: Vec2, c: Vec2, epsilon: f32) -> bool {
    let d1 = cross2(a, b, p);
    let d2 = cross2(b, c, p);
    let d3 = cross2(c, a, p);
    let has_neg = d1 < -epsilon || d2 < -epsilon || d3 < -epsilon;
    let has_pos = d1 > epsilon || d2 > epsilon || d3 > epsilon;
    !(has_neg && has_pos)
}

/// Inclusive point in triangle test for a point lying (approximately) on the
/// plane of the triangle. Uses barycentric coordinates.
pub fn point_in_triangle_3d(p: Vec3, a: Vec3, b: Vec3, c: Vec3, epsilon: f32) -> bool {
    let v0 = c - a;
    let v1 = b - a;
    let v2 = p - a;
    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() <= f32::EPSILON {
        return point_on_segment_3d(p, a, b, epsilon)
            || point_on_segment_3d(p, b, c, epsilon)
            || point_on_segment_3d(p, c, a, epsilon);
    }
    let u = (d11 * d20 - d01 * d21) / denom;
    let v = (d00 * d21 - d01 * d20) / denom;
    u >= -epsilon && v >= -epsilon && u + v <= 1.0 + epsilon
}

/// Whether `p` lies on the closed segment `ab`, within `epsilon`.
pub fn point_on_segment_2d(p: Vec2, a: Vec2, b: Vec2, epsilon: f32) -> bool {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return p.distance(a) <= epsilon;
    }
    if cross2(a, b, p).abs() > epsilon * len_sq.sqrt() {
        return false;
    }
    let t = (p - a).dot(ab) / len_sq;
    (0.0..=1.0).contains(&t)
}

/// Whether `p` lies on the closed segment `ab`, within `epsilon`.
pub fn point_on_segment_3d(p: Vec3, a: Vec3, b: Vec3, epsilon: f32) -> bool {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return p.distance(a) <= epsilon;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (a + ab * t).distance(p) <= epsilon
}

/// True when the open segments `ab` and `cd` cross at a single interior
/// point. Touching endpoints and collinear overlaps do not count.
pub fn segments_intersect_properly_2d(a: Vec2, b: Vec2, c: Vec2, d: Vec2, epsilon: f32) -> bool {
    let straddles = |o1: f32, o2: f32| (o1 > epsilon && o2 < -epsilon) || (o1 < -epsilon && o2 > epsilon);
    straddles(cross2(a, b, c), cross2(a, b, d)) && straddles(cross2(c, d, a), cross2(c, d, b))
}

/// Signed distance from `point` to the plane through `plane_point` with unit
/// normal `normal`.
#[inline]
pub fn distance_to_plane(point: Vec3, plane_point: Vec3, normal: Vec3) -> f32 {
    (point - plane_point).dot(normal)
}

/// Whether all points lie within `epsilon` of a common plane. Sets of three
/// points or less are always coplanar.
pub fn are_coplanar(points: &[Vec3], epsilon: f32) -> bool {
    if points.len() <= 3 {
        return true;
    }
    let normal = polygon_normal(points.iter().copied());
    if normal == Vec3::ZERO {
        // Degenerate polygon. Treat as coplanar if all points are collinear.
        return true;
    }
    let centroid = polygon_centroid(points.iter().copied());
    points
        .iter()
        .all(|p| distance_to_plane(*p, centroid, normal).abs() <= epsilon)
}

/// An orthonormal frame on a plane, used to flatten polygons into 2D.
#[derive(Debug, Clone, Copy)]
pub struct PlaneBasis {
    pub origin: Vec3,
    pub tangent: Vec3,
    pub bitangent: Vec3,
    pub normal: Vec3,
}

impl PlaneBasis {
    /// `normal` must be normalized. The resulting basis is right-handed, so
    /// polygons that wind counter-clockwise around `normal` project to
    /// counter-clockwise 2D polygons.
    pub fn from_normal(origin: Vec3, normal: Vec3) -> Self {
        let tangent = Self::compute_tangent(normal);
        let bitangent = normal.cross(tangent);
        Self {
            origin,
            tangent,
            bitangent,
            normal,
        }
    }

    fn compute_tangent(normal: Vec3) -> Vec3 {
        // Choose minimum axis
        let mut tangent = Vec3::ZERO;
        if normal.x.abs() < normal.y.abs() && normal.x.abs() < normal.z.abs() {
            tangent.x = 1.0;
        } else if normal.y.abs() < normal.z.abs() {
            tangent.y = 1.0;
        } else {
            tangent.z = 1.0;
        }
        tangent -= normal * normal.dot(tangent);
        tangent.normalize_or_zero()
    }

    pub fn project(&self, point: Vec3) -> Vec2 {
        let local = point - self.origin;
        Vec2::new(self.tangent.dot(local), self.bitangent.dot(local))
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Bounds {
    fn default() -> Self {
        Self::empty()
    }
}

impl Bounds {
    /// The empty box. Extending it with any point yields that point.
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    /// A box spanning `extents` (half sizes) on each side of `center`.
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        let extents = extents.abs();
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut bounds = Self::empty();
        for p in points {
            bounds.extend(p);
        }
        bounds
    }

    pub fn extend(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Whether `other` lies entirely inside this box, boundary included.
    pub fn contains_bounds(&self, other: &Bounds) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && other.min.cmpge(self.min).all()
            && other.max.cmple(self.max).all()
    }

    /// Whether the two boxes overlap. Touching faces count as overlapping.
    pub fn intersects(&self, other: &Bounds) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.min.cmple(other.max).all()
            && other.min.cmple(self.max).all()
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Bounds of this box after rotating then translating it. The result is
    /// axis-aligned again, so it may be larger than the original.
    pub fn transformed(&self, offset: Vec3, rotation: Quat) -> Bounds {
        if self.is_empty() {
            return *self;
        }
        let (min, max) = (self.min, self.max);
        Bounds::from_points((0..8).map(|corner| {
            let p = Vec3::new(
                if corner & 1 == 0 { min.x } else { max.x },
                if corner & 2 == 0 { min.y } else { max.y },
                if corner & 4 == 0 { min.z } else { max.z },
            );
            rotation * p + offset
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_newell_normal_of_square() {
        let square = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        assert_eq!(polygon_normal(square.iter().copied()), Vec3::Z);
        assert_eq!(polygon_normal(square.iter().rev().copied()), -Vec3::Z);
        // Length is twice the area
        assert!((newell_normal(square.iter().copied()).length() - 2.0).abs() < 1e-6);

        let collinear = [Vec3::ZERO, Vec3::X, Vec3::X * 2.0];
        assert_eq!(polygon_normal(collinear.iter().copied()), Vec3::ZERO);
    }

    #[test]
    fn test_signed_area_and_orientation() {
        let ccw = [Vec2::new(0.0, 0.0), Vec2::new(2.0, 0.0), Vec2::new(0.0, 2.0)];
        assert_eq!(signed_area_2d(&ccw), 2.0);
        assert!(cross2(ccw[0], ccw[1], ccw[2]) > 0.0);
        let cw = [ccw[0], ccw[2], ccw[1]];
        assert_eq!(signed_area_2d(&cw), -2.0);
    }

    #[test]
    fn test_point_in_triangle() {
        let (a, b, c) = (Vec2::new(0.0, 0.0), Vec2::new(4.0, 0.0), Vec2::new(0.0, 4.0));
        assert!(point_in_triangle_2d(Vec2::new(1.0, 1.0), a, b, c, 1e-6));
        // Boundary points are inside
        assert!(point_in_triangle_2d(Vec2::new(2.0, 0.0), a, b, c, 1e-6));
        assert!(point_in_triangle_2d(a, a, b, c, 1e-6));
        assert!(!point_in_triangle_2d(Vec2::new(3.0, 3.0), a, b, c, 1e-6));
        // Clockwise triangles work too
        assert!(point_in_triangle_2d(Vec2::new(1.0, 1.0), a, c, b, 1e-6));

        let (a3, b3, c3) = (Vec3::ZERO, Vec3::X * 4.0, Vec3::Z * 4.0);
        assert!(point_in_triangle_3d(Vec3::new(1.0, 0.0, 1.0), a3, b3, c3, 1e-6));
        assert!(!point_in_triangle_3d(Vec3::new(3.0, 0.0, 3.0), a3, b3, c3, 1e-6));
    }

    #[test]
    fn test_segments() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(2.0, 2.0);
        assert!(segments_intersect_properly_2d(
            a,
            b,
            Vec2::new(0.0, 2.0),
            Vec2::new(2.0, 0.0),
            1e-6
        ));
        // Sharing an endpoint is not a proper intersection
        assert!(!segments_intersect_properly_2d(a, b, b, Vec2::new(3.0, 0.0), 1e-6));
        // Collinear overlap is not a proper intersection either
        assert!(!segments_intersect_properly_2d(
            a,
            b,
            Vec2::new(1.0, 1.0),
            Vec2::new(3.0, 3.0),
            1e-6
        ));

        assert!(point_on_segment_2d(Vec2::new(1.0, 1.0), a, b, 1e-6));
        assert!(!point_on_segment_2d(Vec2::new(3.0, 3.0), a, b, 1e-6));
        assert!(point_on_segment_3d(Vec3::new(0.5, 0.0, 0.0), Vec3::ZERO, Vec3::X, 1e-6));
        assert!(!point_on_segment_3d(Vec3::new(0.5, 0.1, 0.0), Vec3::ZERO, Vec3::X, 1e-6));
    }

    #[test]
    fn test_coplanarity() {
        let mut points = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        assert!(are_coplanar(&points, 1e-4));
        points[2].z = 0.5;
        assert!(!are_coplanar(&points, 1e-4));
        assert!(are_coplanar(&points[..3], 1e-4));
        assert_eq!(distance_to_plane(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::Z), 3.0);
    }

    #[test]
    fn test_plane_basis_keeps_orientation() {
        let normal = Vec3::new(1.0, 1.0, 0.0).normalize();
        let basis = PlaneBasis::from_normal(Vec3::ZERO, normal);
        assert!(basis.tangent.dot(normal).abs() < 1e-6);
        assert!(basis.bitangent.dot(normal).abs() < 1e-6);
        assert!((basis.tangent.cross(basis.bitangent) - normal).length() < 1e-5);

        let square = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let basis = PlaneBasis::from_normal(Vec3::ZERO, Vec3::Z);
        let flat: Vec<Vec2> = square.iter().map(|p| basis.project(*p)).collect();
        assert!(signed_area_2d(&flat) > 0.0);
    }

    #[test]
    fn test_bounds() {
        let mut bounds = Bounds::empty();
        assert!(bounds.is_empty());
        assert_eq!(bounds.size(), Vec3::ZERO);
        bounds.extend(Vec3::new(1.0, 2.0, 3.0));
        bounds.extend(Vec3::new(-1.0, 0.0, 5.0));
        assert_eq!(bounds.min, Vec3::new(-1.0, 0.0, 3.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 2.0, 5.0));
        assert!(bounds.contains(Vec3::new(0.0, 1.0, 4.0)));

        let moved = bounds.transformed(Vec3::X * 10.0, Quat::IDENTITY);
        assert_eq!(moved.min, Vec3::new(9.0, 0.0, 3.0));
    }

    #[test]
    fn test_bounds_overlap() {
        let unit = Bounds::from_center_extents(Vec3::ZERO, Vec3::ONE);
        let inner = Bounds::from_center_extents(Vec3::splat(0.5), Vec3::splat(0.5));
        let touching = Bounds::from_center_extents(Vec3::new(2.0, 0.0, 0.0), Vec3::ONE);
        let apart = Bounds::from_center_extents(Vec3::new(5.0, 0.0, 0.0), Vec3::ONE);

        assert!(unit.contains_bounds(&inner));
        assert!(!inner.contains_bounds(&unit));
        assert!(unit.contains_bounds(&unit));
        assert!(unit.intersects(&touching));
        assert!(!unit.contains_bounds(&touching));
        assert!(!unit.intersects(&apart));
        assert!(!unit.intersects(&Bounds::empty()));
        assert!(!unit.contains_bounds(&Bounds::empty()));
    }
}
