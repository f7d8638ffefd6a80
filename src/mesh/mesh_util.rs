// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use log::debug;

use crate::prelude::*;

use super::geometry;

/// Splits `face_id` in two when `moved` has left the plane of the rest of the
/// face.
///
/// The moved vertex and its two neighbours become a new triangle, and the
/// original face keeps every other vertex. Triangles, faces not containing
/// `moved`, and faces where the vertex is still within
/// `config.planarity_epsilon` of the plane are left alone.
///
/// Returns the id of the new triangle, if a split happened.
pub fn split_face_if_needed(
    op: &mut GeometryOperation,
    face_id: FaceId,
    moved: VertexId,
    config: &KernelConfig,
) -> Result<Option<FaceId>> {
    let face = op
        .face(face_id)
        .cloned()
        .ok_or_else(|| anyhow!("Cannot split face {face_id}: not in mesh {}", op.mesh_id()))?;
    let ids = face.vertex_ids();
    if ids.len() <= 3 {
        return Ok(None);
    }
    let i = match ids.iter().position(|v| *v == moved) {
        Some(i) => i,
        None => return Ok(None),
    };

    let rest = rotate_iter(ids.iter_cpy(), i + 1, ids.len() - 1).collect_svec();
    let rest_positions = rest
        .iter()
        .map(|v| {
            op.vertex(*v)
                .map(|v| v.loc)
                .ok_or_else(|| anyhow!("Face {face_id} references missing vertex {v}"))
        })
        .collect::<Result<SVec<Vec3>>>()?;
    let moved_pos = op
        .vertex(moved)
        .map(|v| v.loc)
        .ok_or_else(|| anyhow!("Vertex {moved} does not exist"))?;

    let normal = geometry::polygon_normal(rest_positions.iter_cpy());
    if normal == Vec3::ZERO {
        debug!("Rest of face {face_id} is degenerate, not splitting");
        return Ok(None);
    }
    let centroid = geometry::polygon_centroid(rest_positions.iter_cpy());
    let distance = geometry::distance_to_plane(moved_pos, centroid, normal).abs();
    if distance <= config.planarity_epsilon {
        return Ok(None);
    }

    let prev = ids[ids.cyclic_prev_index(i)];
    let next = ids[ids.cyclic_next_index(i)];
    let properties = face.properties;
    op.modify_face_vertices(face_id, rest)?;
    let triangle = op.add_face([prev, moved, next], properties)?;
    debug!(
        "Split face {face_id} of mesh {}: vertex {moved} is {distance} away from its plane",
        op.mesh_id()
    );
    Ok(Some(triangle))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::mmesh::primitives::{Cube, Quad};

    fn quad() -> MMesh {
        Quad::build(MeshId(0), Vec3::ZERO, Vec3::Y, Vec3::X, Vec2::splat(2.0), MaterialId(0))
    }

    #[test]
    fn test_triangles_never_split() {
        let mut mesh = MMesh::build_from_polygons(
            MeshId(0),
            &[Vec3::ZERO, Vec3::X, Vec3::Z],
            &[[0u32, 1, 2]],
            MaterialId(0),
        )
        .unwrap();
        let mut op = mesh.start_operation();
        op.modify_vertex_mesh_space(VertexId(1), Vec3::new(1.0, 5.0, 0.0))
            .unwrap();
        let split = split_face_if_needed(&mut op, FaceId(0), VertexId(1), &KernelConfig::default());
        assert_eq!(split.unwrap(), None);
    }

    #[test]
    fn test_in_plane_move_does_not_split() {
        let mut mesh = quad();
        let mut op = mesh.start_operation();
        op.modify_vertex_mesh_space(VertexId(0), Vec3::new(3.0, 0.0, -2.0))
            .unwrap();
        let split = split_face_if_needed(&mut op, FaceId(0), VertexId(0), &KernelConfig::default());
        assert_eq!(split.unwrap(), None);
        assert_eq!(op[FaceId(0)].num_vertices(), 4);
    }

    #[test]
    fn test_out_of_plane_move_splits() {
        let mut mesh = quad();
        let original = mesh[FaceId(0)].vertex_ids().to_vec();
        let mut op = mesh.start_operation();
        op.modify_vertex_mesh_space(VertexId(2), Vec3::new(-1.0, 0.5, 1.0))
            .unwrap();
        let triangle = split_face_if_needed(&mut op, FaceId(0), VertexId(2), &KernelConfig::default())
            .unwrap()
            .unwrap();
        op.commit().unwrap();

        assert_eq!(
            mesh[triangle].vertex_ids(),
            &[VertexId(1), VertexId(2), VertexId(3)]
        );
        let remainder = mesh[FaceId(0)].vertex_ids();
        assert_eq!(remainder, &[VertexId(3), VertexId(0), VertexId(1)]);
        assert!(!remainder.contains(&VertexId(2)));

        let union: BTreeSet<VertexId> = remainder
            .iter()
            .chain(mesh[triangle].vertex_ids())
            .copied()
            .collect();
        assert_eq!(union, original.into_iter().collect::<BTreeSet<_>>());
        assert!(mmesh::validation::has_valid_topology(&mesh, true));
    }

    #[test]
    fn test_tolerance_comes_from_config() {
        let mut mesh = quad();
        let mut op = mesh.start_operation();
        op.modify_vertex_mesh_space(VertexId(2), Vec3::new(-1.0, 0.01, 1.0))
            .unwrap();
        let lenient = KernelConfig {
            planarity_epsilon: 0.1,
            ..Default::default()
        };
        assert_eq!(
            split_face_if_needed(&mut op, FaceId(0), VertexId(2), &lenient).unwrap(),
            None
        );
        assert!(
            split_face_if_needed(&mut op, FaceId(0), VertexId(2), &KernelConfig::default())
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_face_without_vertex_is_untouched() {
        let mut mesh = Cube::build(MeshId(0), Vec3::ZERO, Vec3::ONE, MaterialId(0));
        let mut op = mesh.start_operation();
        op.modify_vertex_mesh_space(VertexId(6), Vec3::splat(3.0)).unwrap();
        let split = split_face_if_needed(&mut op, FaceId(0), VertexId(6), &KernelConfig::default());
        assert_eq!(split.unwrap(), None);
        assert!(split_face_if_needed(&mut op, FaceId(50), VertexId(6), &KernelConfig::default()).is_err());
    }
}
