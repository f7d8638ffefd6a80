// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ear clipping triangulation of planar polygons with holes.
//!
//! The polygon is flattened onto its own plane and stored as a doubly linked
//! ring. Holes are merged into the outer ring through bridge edges, which
//! turns the polygon into a single weakly simple loop that can be clipped
//! ear by ear. Output triangles keep the winding of the input border.

use float_ord::FloatOrd;
use log::{debug, warn};
use slotmap::SlotMap;

use crate::prelude::*;

use super::geometry::{self, cross2, PlaneBasis};

/// A render triangle, referencing vertices of the triangulated polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Triangle {
    pub a: VertexId,
    pub b: VertexId,
    pub c: VertexId,
}

impl Triangle {
    pub fn new(a: VertexId, b: VertexId, c: VertexId) -> Self {
        Self { a, b, c }
    }

    pub fn vertex_ids(&self) -> [VertexId; 3] {
        [self.a, self.b, self.c]
    }

    pub fn contains_vertex(&self, v: VertexId) -> bool {
        self.a == v || self.b == v || self.c == v
    }
}

slotmap::new_key_type! { struct NodeKey; }

#[derive(Debug, Clone, Copy)]
struct RingNode {
    vertex: VertexId,
    pos: Vec2,
    prev: NodeKey,
    next: NodeKey,
}

/// Storage for the outer ring and every hole loop. Bridging splices loops
/// together, so they all live in the same arena.
struct Rings {
    nodes: SlotMap<NodeKey, RingNode>,
    epsilon: f32,
}

impl Rings {
    fn new(epsilon: f32) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            epsilon,
        }
    }

    /// Inserts a closed loop and returns the key of its first node.
    fn insert_loop(&mut self, points: &[(VertexId, Vec2)]) -> NodeKey {
        let keys = points
            .iter()
            .map(|(vertex, pos)| {
                self.nodes.insert(RingNode {
                    vertex: *vertex,
                    pos: *pos,
                    prev: NodeKey::default(),
                    next: NodeKey::default(),
                })
            })
            .collect_vec();
        for (&a, &b) in keys.iter().circular_tuple_windows() {
            self.nodes[a].next = b;
            self.nodes[b].prev = a;
        }
        keys[0]
    }

    /// Keys of the loop containing `start`, in order.
    fn walk(&self, start: NodeKey) -> Vec<NodeKey> {
        let mut keys = vec![start];
        let mut it = self.nodes[start].next;
        while it != start && keys.len() <= self.nodes.len() {
            keys.push(it);
            it = self.nodes[it].next;
        }
        keys
    }

    fn pos(&self, k: NodeKey) -> Vec2 {
        self.nodes[k].pos
    }

    fn coincident(&self, a: Vec2, b: Vec2) -> bool {
        a.distance_squared(b) <= self.epsilon * self.epsilon
    }

    fn remove(&mut self, k: NodeKey) {
        if let Some(node) = self.nodes.remove(k) {
            self.nodes[node.prev].next = node.next;
            self.nodes[node.next].prev = node.prev;
        }
    }

    /// Links the loop containing `a` with the loop containing `b` through
    /// the edge `a -> b`. Both endpoints are duplicated so the ring can
    /// travel back along the bridge: `a -> b ... b' -> a' -> a.next`.
    fn splice_bridge(&mut self, a: NodeKey, b: NodeKey) {
        let node_a = self.nodes[a];
        let node_b = self.nodes[b];
        let a2 = self.nodes.insert(node_a);
        let b2 = self.nodes.insert(node_b);
        let an = node_a.next;
        let bp = node_b.prev;

        self.nodes[a].next = b;
        self.nodes[b].prev = a;

        self.nodes[a2].next = an;
        self.nodes[an].prev = a2;

        self.nodes[b2].next = a2;
        self.nodes[a2].prev = b2;

        self.nodes[bp].next = b2;
        self.nodes[b2].prev = bp;
    }

    /// Whether the direction from `k` towards `target` leaves the node into
    /// the interior of the polygon, which lies to the left of every edge.
    fn is_locally_inside(&self, k: NodeKey, target: Vec2) -> bool {
        let node = &self.nodes[k];
        let (p, c, n) = (self.pos(node.prev), node.pos, self.pos(node.next));
        let eps = self.epsilon;
        if cross2(p, c, n) > 0.0 {
            cross2(p, c, target) > eps && cross2(c, n, target) > eps
        } else {
            cross2(p, c, target) > eps || cross2(c, n, target) > eps
        }
    }

    /// Whether the segment `a`-`b` crosses an edge of the loop, or passes
    /// through one of its vertices.
    fn obstructs_segment(&self, loop_start: NodeKey, a: Vec2, b: Vec2) -> bool {
        let eps = self.epsilon;
        self.walk(loop_start).into_iter().any(|k| {
            let q = self.pos(k);
            let q_next = self.pos(self.nodes[k].next);
            if geometry::segments_intersect_properly_2d(a, b, q, q_next, eps) {
                return true;
            }
            !self.coincident(q, a)
                && !self.coincident(q, b)
                && geometry::point_on_segment_2d(q, a, b, eps)
        })
    }

    fn is_visible_bridge(
        &self,
        ring_start: NodeKey,
        unmerged_holes: &[NodeKey],
        outer: NodeKey,
        hole: NodeKey,
    ) -> bool {
        let (a, b) = (self.pos(outer), self.pos(hole));
        if self.coincident(a, b) {
            return false;
        }
        if !self.is_locally_inside(outer, b) || !self.is_locally_inside(hole, a) {
            return false;
        }
        !std::iter::once(&ring_start)
            .chain(unmerged_holes)
            .any(|start| self.obstructs_segment(*start, a, b))
    }

    /// Finds a bridge between the ring and the hole loop starting at
    /// `hole_start`. The hole's vertices are tried from the most extreme one
    /// in the +x direction, and for each of them, ring vertices are tried
    /// from nearest to farthest.
    fn find_bridge(
        &self,
        ring_start: NodeKey,
        hole_start: NodeKey,
        unmerged_holes: &[NodeKey],
    ) -> Option<(NodeKey, NodeKey)> {
        let ring = self.walk(ring_start);
        let hole_nodes = self
            .walk(hole_start)
            .into_iter()
            .sorted_by_key(|k| std::cmp::Reverse(FloatOrd(self.pos(*k).x)))
            .collect_vec();

        for h in hole_nodes {
            let h_pos = self.pos(h);
            let candidates = ring
                .iter()
                .copied()
                .sorted_by_key(|o| FloatOrd(self.pos(*o).distance_squared(h_pos)));
            for o in candidates {
                if self.is_visible_bridge(ring_start, unmerged_holes, o, h) {
                    return Some((o, h));
                }
            }
        }
        None
    }

    fn corner(&self, k: NodeKey) -> (Vec2, Vec2, Vec2) {
        let node = &self.nodes[k];
        (self.pos(node.prev), node.pos, self.pos(node.next))
    }

    /// A convex corner with no other ring vertex inside or on its triangle,
    /// and whose closing diagonal crosses no edge.
    fn is_strict_ear(&self, k: NodeKey, ring: &[NodeKey]) -> bool {
        let eps = self.epsilon;
        let (p, c, n) = self.corner(k);
        if cross2(p, c, n) <= eps {
            return false;
        }
        let node = &self.nodes[k];
        for &q in ring {
            let q_pos = self.pos(q);
            let q_next = self.pos(self.nodes[q].next);
            if geometry::segments_intersect_properly_2d(p, n, q_pos, q_next, eps) {
                return false;
            }
            if q == k || q == node.prev || q == node.next {
                continue;
            }
            // Bridge copies of the corner's own vertices
            if self.coincident(q_pos, p) || self.coincident(q_pos, c) || self.coincident(q_pos, n)
            {
                continue;
            }
            if geometry::point_in_triangle_2d(q_pos, p, c, n, eps) {
                return false;
            }
        }
        true
    }

    /// Accepts flat corners too, and only rejects vertices strictly inside.
    fn is_relaxed_ear(&self, k: NodeKey, ring: &[NodeKey]) -> bool {
        let eps = self.epsilon;
        let (p, c, n) = self.corner(k);
        if cross2(p, c, n) < -eps {
            return false;
        }
        let node = &self.nodes[k];
        ring.iter().all(|&q| {
            q == k
                || q == node.prev
                || q == node.next
                || !geometry::point_in_triangle_2d(self.pos(q), p, c, n, -eps)
        })
    }

    fn triangle_at(&self, k: NodeKey) -> Triangle {
        let node = &self.nodes[k];
        Triangle::new(
            self.nodes[node.prev].vertex,
            node.vertex,
            self.nodes[node.next].vertex,
        )
    }

    /// Clips ears off the loop containing `start` until one triangle is left.
    fn clip_ears(&mut self, start: NodeKey) -> Vec<Triangle> {
        let mut ring = self.walk(start);
        let mut triangles = Vec::with_capacity(ring.len().saturating_sub(2));

        while ring.len() > 3 {
            let ear = match ring.iter().copied().find(|k| self.is_strict_ear(*k, &ring)) {
                Some(ear) => ear,
                None => match ring.iter().copied().find(|k| self.is_relaxed_ear(*k, &ring)) {
                    Some(ear) => {
                        debug!("Clipping a flat ear with {} vertices left", ring.len());
                        ear
                    }
                    None => {
                        warn!(
                            "No valid ear found among {} vertices, clipping the most convex corner",
                            ring.len()
                        );
                        ring.iter()
                            .copied()
                            .max_by_key(|k| {
                                let (p, c, n) = self.corner(*k);
                                FloatOrd(cross2(p, c, n))
                            })
                            .unwrap_or(ring[0])
                    }
                },
            };

            triangles.push(self.triangle_at(ear));
            let next = self.nodes[ear].next;
            self.remove(ear);
            // Keep scanning from where the ear was, so clipping sweeps around
            // the ring instead of eating the same corner over and over.
            ring = self.walk(next);
        }

        if ring.len() == 3 {
            triangles.push(self.triangle_at(ring[1]));
        }
        triangles
    }
}

fn fan(border: &[Vertex]) -> Vec<Triangle> {
    (1..border.len() - 1)
        .map(|i| Triangle::new(border[0].id, border[i].id, border[i + 1].id))
        .collect()
}

/// Triangulates a polygon with optional holes, using the default tolerance.
pub fn triangulate(border: &[Vertex], holes: &[Vec<Vertex>]) -> Vec<Triangle> {
    triangulate_with_epsilon(border, holes, KernelConfig::default().triangulation_epsilon)
}

/// Triangulates the polygon `border`, cutting out every loop in `holes`.
///
/// A simple polygon of N vertices yields N-2 triangles, and each hole adds as
/// many triangles as it has vertices, plus two. A triangle with no holes is
/// returned unchanged. Degenerate input never fails: collinear borders are
/// fanned, and corners with no valid ear are clipped anyway with a warning.
///
/// `epsilon` is relative to the size of the polygon.
#[profiling::function]
pub fn triangulate_with_epsilon(
    border: &[Vertex],
    holes: &[Vec<Vertex>],
    epsilon: f32,
) -> Vec<Triangle> {
    if border.len() < 3 {
        debug!("Cannot triangulate a border with {} vertices", border.len());
        return Vec::new();
    }
    if border.len() == 3 && holes.is_empty() {
        return vec![Triangle::new(border[0].id, border[1].id, border[2].id)];
    }

    let normal = geometry::polygon_normal(border.iter().map(|v| v.loc));
    if normal == Vec3::ZERO {
        warn!(
            "Polygon with {} vertices has no area, falling back to a fan",
            border.len()
        );
        return fan(border);
    }

    // Flatten onto the polygon's plane, scaled so the border spans one unit.
    let basis = PlaneBasis::from_normal(border[0].loc, normal);
    let extent = geometry::Bounds::from_points(
        border.iter().map(|v| basis.project(v.loc).extend(0.0)),
    )
    .size();
    let scale = extent.x.max(extent.y);
    if scale <= f32::EPSILON {
        warn!("Polygon with {} vertices is too small, falling back to a fan", border.len());
        return fan(border);
    }
    let flatten = |vertices: &[Vertex]| -> Vec<(VertexId, Vec2)> {
        vertices
            .iter()
            .map(|v| (v.id, basis.project(v.loc) / scale))
            .collect()
    };

    let mut rings = Rings::new(epsilon);
    let outer = flatten(border);
    let ring_start = rings.insert_loop(&outer);

    let mut hole_starts = Vec::with_capacity(holes.len());
    for hole in holes {
        let mut points = flatten(hole);
        let area = geometry::signed_area_2d(&points.iter().map(|(_, p)| *p).collect_vec());
        if points.len() < 3 || area.abs() <= epsilon {
            debug!("Skipping degenerate hole with {} vertices", points.len());
            continue;
        }
        // Holes go clockwise, so the polygon interior stays on the left.
        if area > 0.0 {
            points.reverse();
        }
        let start = rings.insert_loop(&points);
        let max_x = points
            .iter()
            .map(|(_, p)| FloatOrd(p.x))
            .max()
            .map(|x| x.0)
            .unwrap_or(f32::NEG_INFINITY);
        hole_starts.push((start, max_x));
    }
    hole_starts.sort_by_key(|(_, max_x)| std::cmp::Reverse(FloatOrd(*max_x)));
    let hole_starts = hole_starts.into_iter().map(|(start, _)| start).collect_vec();

    for (i, hole_start) in hole_starts.iter().copied().enumerate() {
        match rings.find_bridge(ring_start, hole_start, &hole_starts[i..]) {
            Some((o, h)) => rings.splice_bridge(o, h),
            None => {
                warn!("No unobstructed bridge found for a hole, bridging to the nearest vertex");
                let h = rings
                    .walk(hole_start)
                    .into_iter()
                    .max_by_key(|k| FloatOrd(rings.pos(*k).x))
                    .unwrap_or(hole_start);
                let h_pos = rings.pos(h);
                let o = rings
                    .walk(ring_start)
                    .into_iter()
                    .min_by_key(|k| FloatOrd(rings.pos(*k).distance_squared(h_pos)))
                    .unwrap_or(ring_start);
                rings.splice_bridge(o, h);
            }
        }
    }

    rings.clip_ears(ring_start)
}

/// Triangulates a committed face of `mesh`.
pub fn triangulate_face(mesh: &MMesh, face_id: FaceId) -> Result<Vec<Triangle>> {
    triangulate_face_with_config(mesh, face_id, &KernelConfig::default())
}

pub fn triangulate_face_with_config(
    mesh: &MMesh,
    face_id: FaceId,
    config: &KernelConfig,
) -> Result<Vec<Triangle>> {
    let face = mesh
        .face(face_id)
        .ok_or_else(|| anyhow!("Face {face_id} does not exist in mesh {}", mesh.id()))?;
    let border = face
        .vertex_ids()
        .iter()
        .map(|v| {
            mesh.vertex(*v)
                .cloned()
                .ok_or_else(|| anyhow!("Face {face_id} references missing vertex {v}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(triangulate_with_epsilon(
        &border,
        &[],
        config.triangulation_epsilon,
    ))
}
