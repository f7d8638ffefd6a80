// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topological repair after vertex moves.
//!
//! Moving vertices onto each other leaves faces with repeated vertices,
//! spikes and collapsed edges. The pipeline in
//! [`move_vertices_and_mutate_mesh_and_fix`] welds the coincident vertices and
//! then cleans up every face touching them, so the committed mesh passes
//! [`mmesh::validation::validate_topology`] in strict mode.

use log::debug;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::prelude::*;

use super::mesh_util;

/// Collapses runs of the same id, including the run that wraps around from
/// the end of the winding to its start. The first occurrence is kept.
pub fn collapse_zero_length_segments<T: PartialEq + Copy>(winding: &[T]) -> SVec<T> {
    let mut result: SVec<T> = winding.iter_cpy().dedup().collect();
    while result.len() > 1 && result.first() == result.last() {
        result.pop();
    }
    result
}

/// Removes spikes from a winding. A spike is a vertex whose two neighbours
/// are the same vertex, `a b a`: the walk goes out to `b` and straight back,
/// enclosing no area. The tip `b` and the second `a` are removed, and the
/// scan starts over until no spike is left or the winding has two ids or
/// less. The tip at the first position of the winding is checked last.
pub fn collapse_zero_area_segments<T: PartialEq + Copy>(winding: &[T]) -> SVec<T> {
    let mut result: SVec<T> = winding.iter_cpy().collect();
    loop {
        let n = result.len();
        if n <= 2 {
            break;
        }
        let spike = (1..n).chain(std::iter::once(0)).find(|&i| {
            result[result.cyclic_prev_index(i)] == result[result.cyclic_next_index(i)]
        });
        let i = match spike {
            Some(i) => i,
            None => break,
        };
        let next = result.cyclic_next_index(i);
        if next > i {
            result.remove(next);
            result.remove(i);
        } else {
            result.remove(i);
            result.remove(next);
        }
    }
    result
}

/// Splits a winding that visits the same vertex twice into two loops that
/// meet at that vertex. `[1 2 3 1 2 7]` becomes `[1 2 3]` and `[1 2 7]`.
pub fn split_at_repeated_vertex<T: PartialEq + Copy>(
    winding: &[T],
) -> Option<(SVec<T>, SVec<T>)> {
    for j in 1..winding.len() {
        if let Some(i) = winding[..j].iter().position(|x| *x == winding[j]) {
            let inner = winding[i..j].iter_cpy().collect_svec();
            let outer = winding[j..].iter_cpy().chain(winding[..i].iter_cpy()).collect_svec();
            return Some((inner, outer));
        }
    }
    None
}

/// Breaks a winding into loops that never repeat a vertex, cleaning up each
/// of them. Loops that end up with less than three ids are dropped.
pub fn decompose_winding<T: PartialEq + Copy>(winding: &[T]) -> Vec<SVec<T>> {
    let mut pending = vec![collapse_zero_area_segments(&collapse_zero_length_segments(winding))];
    let mut loops = Vec::new();
    while let Some(w) = pending.pop() {
        match split_at_repeated_vertex(&w) {
            Some((a, b)) => {
                for part in [a, b] {
                    pending.push(collapse_zero_area_segments(&collapse_zero_length_segments(
                        &part,
                    )));
                }
            }
            None if w.len() >= 3 => loops.push(w),
            None => {}
        }
    }
    loops.reverse();
    loops
}

fn existing_faces(op: &GeometryOperation, faces: &BTreeSet<FaceId>) -> Vec<FaceId> {
    faces.iter().copied().filter(|f| op.has_face(*f)).collect()
}

/// Rewrites the candidate faces with [`collapse_zero_length_segments`].
pub fn remove_zero_length_segments(
    op: &mut GeometryOperation,
    faces: &BTreeSet<FaceId>,
) -> Result<()> {
    for f in existing_faces(op, faces) {
        let winding = op[f].vertex_ids();
        let collapsed = collapse_zero_length_segments(winding);
        if collapsed.len() != winding.len() {
            op.modify_face_vertices(f, collapsed)?;
        }
    }
    Ok(())
}

/// Rewrites the candidate faces with [`collapse_zero_area_segments`].
pub fn remove_zero_area_segments(
    op: &mut GeometryOperation,
    faces: &BTreeSet<FaceId>,
) -> Result<()> {
    for f in existing_faces(op, faces) {
        let winding = op[f].vertex_ids();
        let collapsed = collapse_zero_area_segments(winding);
        if collapsed.len() != winding.len() {
            op.modify_face_vertices(f, collapsed)?;
        }
    }
    Ok(())
}

/// Candidate faces that still visit some vertex twice are split into
/// separate faces, one per loop. The first loop keeps the face id. Returns
/// the ids of the new faces.
pub fn split_pinched_faces(
    op: &mut GeometryOperation,
    faces: &BTreeSet<FaceId>,
) -> Result<Vec<FaceId>> {
    let mut new_faces = Vec::new();
    for f in existing_faces(op, faces) {
        let face = &op[f];
        if face.vertex_ids().iter().all_unique() {
            continue;
        }
        let properties = face.properties;
        let loops = decompose_winding(face.vertex_ids());
        debug!("Face {f} is pinched, splitting it into {} faces", loops.len());
        let mut loops = loops.into_iter();
        match loops.next() {
            Some(first) => op.modify_face_vertices(f, first)?,
            // Nothing usable left. Leave it degenerate for invalid face removal.
            None => op.modify_face_vertices(f, std::iter::empty())?,
        }
        for l in loops {
            new_faces.push(op.add_face(l, properties)?);
        }
    }
    Ok(new_faces)
}

/// Deletes candidate faces with less than three vertices. Returns the
/// deleted ids.
pub fn remove_invalid_faces_and_holes(
    op: &mut GeometryOperation,
    faces: &BTreeSet<FaceId>,
) -> Result<Vec<FaceId>> {
    let invalid = existing_faces(op, faces)
        .into_iter()
        .filter(|f| op[*f].num_vertices() < 3)
        .collect_vec();
    for f in invalid.iter() {
        op.delete_face(*f)?;
    }
    if !invalid.is_empty() {
        debug!("Removed {} degenerate faces from mesh {}", invalid.len(), op.mesh_id());
    }
    Ok(invalid)
}

/// Deletes every vertex no face references. Returns the deleted ids.
pub fn remove_unreferenced_vertices(op: &mut GeometryOperation) -> Result<Vec<VertexId>> {
    let unreferenced = op
        .vertex_ids()
        .into_iter()
        .filter(|v| op.faces_touching(*v).is_empty())
        .collect_vec();
    for v in unreferenced.iter() {
        op.delete_vertex(*v)?;
    }
    Ok(unreferenced)
}

struct VertexPos {
    vertex: VertexId,
    pos: Vec3,
}

impl RTreeObject for VertexPos {
    type Envelope = AABB<[f32; 3]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.pos.to_array())
    }
}

impl PointDistance for VertexPos {
    fn distance_2(
        &self,
        point: &<Self::Envelope as rstar::Envelope>::Point,
    ) -> <<Self::Envelope as rstar::Envelope>::Point as rstar::Point>::Scalar {
        self.pos.distance_squared(Vec3::from_slice(point))
    }
}

/// Welds every vertex in `moved` with the vertices lying within `epsilon` of
/// it. Clusters are formed transitively through the moved vertices.
///
/// In each cluster, the lowest id among the vertices that did not move
/// survives, so a vertex dropped onto a stationary one takes its identity.
/// When every vertex in the cluster moved, the lowest id survives. Faces are
/// rewritten to use the survivor and the other vertices are deleted.
///
/// Returns a map from each deleted vertex to its survivor.
pub fn join_duplicate_vertices(
    op: &mut GeometryOperation,
    moved: &BTreeSet<VertexId>,
    epsilon: f32,
) -> Result<BTreeMap<VertexId, VertexId>> {
    // Build a spatial index for the staged vertices, so each moved vertex
    // finds its neighbours without scanning the whole mesh.
    let tree_index = RTree::bulk_load(
        op.vertex_ids()
            .into_iter()
            .map(|v| VertexPos {
                vertex: v,
                pos: op[v].loc,
            })
            .collect_vec(),
    );

    let mut clusters = DisjointSet::new();
    for m in moved.iter().copied() {
        let pos = op
            .vertex(m)
            .map(|v| v.loc)
            .ok_or_else(|| anyhow!("Moved vertex {m} is not in mesh {}", op.mesh_id()))?;
        clusters.add(m);
        for near in tree_index.locate_within_distance(pos.to_array(), epsilon * epsilon) {
            if near.vertex != m {
                clusters.join(m, near.vertex);
            }
        }
    }

    let mut joined = BTreeMap::new();
    for cluster in clusters.sets_with_min_size(2) {
        let survivor = cluster
            .iter()
            .copied()
            .filter(|v| !moved.contains(v))
            .min()
            .or_else(|| cluster.iter().copied().min());
        if let Some(survivor) = survivor {
            for v in cluster {
                if v != survivor {
                    joined.insert(v, survivor);
                }
            }
        }
    }

    let affected_faces: BTreeSet<FaceId> = joined
        .keys()
        .flat_map(|v| op.faces_touching(*v))
        .collect();
    for f in affected_faces {
        let winding = op[f]
            .vertex_ids()
            .iter()
            .map(|v| *joined.get(v).unwrap_or(v))
            .collect_svec();
        op.modify_face_vertices(f, winding)?;
    }
    for v in joined.keys() {
        op.delete_vertex(*v)?;
    }

    if !joined.is_empty() {
        debug!("Joined vertices in mesh {}: {joined:?}", op.mesh_id());
    }
    Ok(joined)
}

/// What the repair pipeline changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixSummary {
    /// Deleted vertex -> the vertex it was welded into.
    pub joined_vertices: BTreeMap<VertexId, VertexId>,
    pub deleted_faces: Vec<FaceId>,
    /// Triangles split off faces that stopped being planar.
    pub split_faces: Vec<FaceId>,
    pub deleted_vertices: Vec<VertexId>,
}

/// Same as [`move_vertices_and_mutate_mesh_and_fix_with_config`], with the
/// default tolerances.
pub fn move_vertices_and_mutate_mesh_and_fix(
    source: &MMesh,
    dest: &mut MMesh,
    moves: &[(VertexId, Vec3)],
    for_preview: bool,
) -> Result<FixSummary> {
    move_vertices_and_mutate_mesh_and_fix_with_config(
        source,
        dest,
        moves,
        for_preview,
        &KernelConfig::default(),
    )
}

/// Moves vertices of `dest` to new mesh-space positions and repairs the
/// result, all in a single operation.
///
/// `dest` is usually a clone of `source`. A vertex counts as moved when its
/// new position differs from its position in `source`. The repair welds
/// coincident vertices, collapses zero-length and zero-area segments, splits
/// pinched faces, drops faces left with less than three vertices and prunes
/// unused vertices. Unless `for_preview` is set, faces that became
/// non-planar around a moved vertex are also split.
#[profiling::function]
pub fn move_vertices_and_mutate_mesh_and_fix_with_config(
    source: &MMesh,
    dest: &mut MMesh,
    moves: &[(VertexId, Vec3)],
    for_preview: bool,
    config: &KernelConfig,
) -> Result<FixSummary> {
    let mesh_id = dest.id();
    let mut op = dest.start_operation();
    let mut summary = FixSummary::default();

    let mut moved = BTreeSet::new();
    for (v, pos) in moves.iter().copied() {
        op.modify_vertex_mesh_space(v, pos)
            .with_context(|| format!("Cannot move vertex {v}"))?;
        if source.vertex(v).map(|old| old.loc != pos).unwrap_or(true) {
            moved.insert(v);
        }
    }

    summary.joined_vertices = join_duplicate_vertices(&mut op, &moved, config.vertex_merge_epsilon)?;
    let moved: BTreeSet<VertexId> = moved
        .iter()
        .map(|v| *summary.joined_vertices.get(v).unwrap_or(v))
        .collect();

    let mut candidates: BTreeSet<FaceId> =
        moved.iter().flat_map(|v| op.faces_touching(*v)).collect();

    remove_zero_length_segments(&mut op, &candidates)?;
    remove_zero_area_segments(&mut op, &candidates)?;
    candidates.extend(split_pinched_faces(&mut op, &candidates)?);
    summary.deleted_faces = remove_invalid_faces_and_holes(&mut op, &candidates)?;

    if !for_preview {
        for v in moved.iter().copied() {
            for f in op.faces_touching(v) {
                if let Some(triangle) = mesh_util::split_face_if_needed(&mut op, f, v, config)? {
                    summary.split_faces.push(triangle);
                }
            }
        }
    }

    summary.deleted_vertices = remove_unreferenced_vertices(&mut op)?;
    op.commit()
        .with_context(|| format!("Mesh {mesh_id} could not be repaired"))?;

    Ok(summary)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::mmesh::primitives::Cube;
    use crate::mesh::mmesh::validation;

    fn svec(ids: &[u32]) -> SVec<u32> {
        ids.iter_cpy().collect()
    }

    fn cube() -> MMesh {
        Cube::build(MeshId(0), Vec3::ZERO, Vec3::ONE, MaterialId(0))
    }

    #[test]
    fn test_zero_length_segments() {
        let cases: &[(&[u32], &[u32])] = &[
            (&[1, 2, 3, 4], &[1, 2, 3, 4]),
            (&[1, 1, 3, 4], &[1, 3, 4]),
            (&[1, 1, 1, 4], &[1, 4]),
            (&[4, 2, 3, 4], &[4, 2, 3]),
            (&[1, 2, 2, 4, 5, 6, 6, 6, 9, 1], &[1, 2, 4, 5, 6, 9]),
        ];
        for (input, expected) in cases {
            assert_eq!(collapse_zero_length_segments(*input), svec(expected), "{input:?}");
        }
    }

    #[test]
    fn test_zero_area_segments() {
        let cases: &[(&[u32], &[u32])] = &[
            (&[1, 2, 3, 4], &[1, 2, 3, 4]),
            (&[1, 2, 3, 2, 5, 6, 5], &[1, 2, 5]),
            (&[1, 2, 3, 1, 7], &[2, 3, 1]),
            (&[1, 2, 3, 1, 2, 7], &[1, 2, 3, 1, 2, 7]),
            (&[1, 2, 3, 2], &[1, 2]),
        ];
        for (input, expected) in cases {
            assert_eq!(collapse_zero_area_segments(*input), svec(expected), "{input:?}");
        }
    }

    #[test]
    fn test_decompose_pinched_winding() {
        assert_eq!(
            decompose_winding(&[1u32, 2, 3, 1, 2, 7]),
            vec![svec(&[1, 2, 3]), svec(&[1, 2, 7])]
        );
        assert_eq!(decompose_winding(&[1u32, 2, 3]), vec![svec(&[1, 2, 3])]);
        assert!(decompose_winding(&[1u32, 2, 1]).is_empty());
    }

    #[test]
    fn test_remove_invalid_faces() {
        let mut mesh = cube();
        let mut op = mesh.start_operation();
        op.modify_face_vertices(FaceId(0), Vec::new()).unwrap();
        op.modify_face_vertices(FaceId(1), [VertexId(4)]).unwrap();
        op.modify_face_vertices(FaceId(2), [VertexId(4), VertexId(7)])
            .unwrap();
        let candidates = (0..6).map(FaceId).collect();
        let removed = remove_invalid_faces_and_holes(&mut op, &candidates).unwrap();
        assert_eq!(removed, vec![FaceId(0), FaceId(1), FaceId(2)]);
        assert_eq!(op.face_ids(), vec![FaceId(3), FaceId(4), FaceId(5)]);
        op.commit().unwrap();
        assert_eq!(mesh.face_count(), 3);
    }

    #[test]
    fn test_join_two_vertices() {
        let mut mesh = cube();
        let mut op = mesh.start_operation();
        let target = op[VertexId(2)].loc;
        op.modify_vertex_mesh_space(VertexId(0), target).unwrap();
        let joined =
            join_duplicate_vertices(&mut op, &[VertexId(0)].into_iter().collect(), 1e-4).unwrap();
        assert_eq!(
            joined,
            [(VertexId(0), VertexId(2))].into_iter().collect::<BTreeMap<_, _>>()
        );
        // Commit would reject the degenerate faces, so check the staged state.
        assert_eq!(op.vertex_ids().len(), 7);
        for f in op.face_ids() {
            assert!(!op[f].contains_vertex(VertexId(0)));
        }
        assert_eq!(op[FaceId(0)].vertex_ids(), &[VertexId(2), VertexId(1), VertexId(2), VertexId(3)]);
    }

    #[test]
    fn test_join_with_no_neighbour_is_noop() {
        let mut mesh = cube();
        let mut op = mesh.start_operation();
        op.modify_vertex_mesh_space(VertexId(0), Vec3::splat(-2.0)).unwrap();
        let joined =
            join_duplicate_vertices(&mut op, &[VertexId(0)].into_iter().collect(), 1e-4).unwrap();
        assert!(joined.is_empty());
        assert_eq!(op.vertex_ids().len(), 8);
    }

    #[test]
    fn test_split_face_pinched_by_join() {
        let positions = (0..8)
            .map(|i| {
                let angle = i as f32 * std::f32::consts::TAU / 8.0;
                Vec3::new(angle.cos(), angle.sin(), 0.0)
            })
            .collect_vec();
        let mut mesh = MMesh::build_from_polygons(
            MeshId(0),
            &positions,
            &[[1u32, 2, 3, 4, 5, 7]],
            MaterialId(4),
        )
        .unwrap();

        let mut op = mesh.start_operation();
        op.modify_vertex_mesh_space(VertexId(4), positions[1]).unwrap();
        op.modify_vertex_mesh_space(VertexId(5), positions[2]).unwrap();
        let moved = [VertexId(4), VertexId(5)].into_iter().collect();
        join_duplicate_vertices(&mut op, &moved, 1e-4).unwrap();
        let ids = |raw: &[u32]| raw.iter().map(|v| VertexId(*v)).collect_vec();
        assert_eq!(op[FaceId(0)].vertex_ids(), ids(&[1, 2, 3, 1, 2, 7]).as_slice());

        let candidates = [FaceId(0)].into_iter().collect();
        let new_faces = split_pinched_faces(&mut op, &candidates).unwrap();
        assert_eq!(new_faces, vec![FaceId(1)]);
        assert_eq!(op[FaceId(0)].vertex_ids(), ids(&[1, 2, 3]).as_slice());
        assert_eq!(op[FaceId(1)].vertex_ids(), ids(&[1, 2, 7]).as_slice());
        assert_eq!(op[FaceId(1)].material_id(), MaterialId(4));
        op.commit().unwrap();

        assert_eq!(mesh.face_count(), 2);
        assert_eq!(mesh.vertex_count(), 4);
        assert!(validation::has_valid_topology(&mesh, true));
    }

    #[test]
    fn test_corner_join() {
        let source = cube();
        let mut dest = source.clone();
        let summary = move_vertices_and_mutate_mesh_and_fix(
            &source,
            &mut dest,
            &[(VertexId(0), source[VertexId(2)].loc)],
            false,
        )
        .unwrap();
        assert_eq!(summary.joined_vertices.get(&VertexId(0)), Some(&VertexId(2)));
        assert_eq!(dest.vertex_count(), 7);
        assert_eq!(dest.face_count(), 7);
        assert!(validation::has_valid_topology(&dest, true));
        // The source is left alone
        assert_eq!(source.vertex_count(), 8);
    }

    #[test]
    fn test_corner_join_preview_skips_splitting() {
        let source = cube();
        let mut dest = source.clone();
        let summary = move_vertices_and_mutate_mesh_and_fix(
            &source,
            &mut dest,
            &[(VertexId(0), source[VertexId(2)].loc)],
            true,
        )
        .unwrap();
        assert!(summary.split_faces.is_empty());
        assert_eq!(dest.vertex_count(), 7);
        assert_eq!(dest.face_count(), 5);
        assert!(validation::has_valid_topology(&dest, true));
    }

    #[test]
    fn test_edge_join() {
        let source = cube();
        let mut dest = source.clone();
        move_vertices_and_mutate_mesh_and_fix(
            &source,
            &mut dest,
            &[
                (VertexId(0), source[VertexId(3)].loc),
                (VertexId(1), source[VertexId(2)].loc),
            ],
            false,
        )
        .unwrap();
        assert_eq!(dest.vertex_count(), 6);
        assert_eq!(dest.face_count(), 5);
        assert!(validation::has_valid_topology(&dest, true));
    }

    #[test]
    fn test_face_join() {
        let source = cube();
        let mut dest = source.clone();
        let moves = [(0, 4), (1, 7), (2, 6), (3, 5)]
            .into_iter()
            .map(|(from, to)| (VertexId(from), source[VertexId(to)].loc))
            .collect_vec();
        move_vertices_and_mutate_mesh_and_fix(&source, &mut dest, &moves, false).unwrap();
        assert_eq!(dest.vertex_count(), 4);
        assert_eq!(dest.face_count(), 2);
        assert!(validation::has_valid_topology(&dest, true));
    }

    #[test]
    fn test_plain_move_splits_non_planar_faces() {
        let source = cube();
        let mut dest = source.clone();
        let summary = move_vertices_and_mutate_mesh_and_fix(
            &source,
            &mut dest,
            &[(VertexId(6), Vec3::splat(0.9))],
            false,
        )
        .unwrap();
        // Top, front and right quads all lose planarity
        assert_eq!(summary.split_faces.len(), 3);
        assert!(summary.joined_vertices.is_empty());
        assert_eq!(dest.vertex_count(), 8);
        assert_eq!(dest.face_count(), 9);
        assert!(validation::has_valid_topology(&dest, true));
    }

    #[test]
    fn test_unchanged_positions_are_not_moves() {
        let source = cube();
        let mut dest = source.clone();
        let summary = move_vertices_and_mutate_mesh_and_fix(
            &source,
            &mut dest,
            &[(VertexId(6), source[VertexId(6)].loc)],
            false,
        )
        .unwrap();
        assert_eq!(summary, FixSummary::default());
        assert_eq!(dest.face_count(), 6);
    }

    #[test]
    fn test_moving_missing_vertex_fails() {
        let source = cube();
        let mut dest = source.clone();
        assert!(move_vertices_and_mutate_mesh_and_fix(
            &source,
            &mut dest,
            &[(VertexId(99), Vec3::ZERO)],
            false
        )
        .is_err());
        assert_eq!(dest.vertex_count(), 8);
    }
}
