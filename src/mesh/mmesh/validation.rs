// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::*;

/// Checks a single winding: at least three vertices, none repeated.
pub fn validate_face_winding(face: &Face) -> Result<()> {
    let ids = face.vertex_ids();
    if ids.len() < 3 {
        bail!("Face {} has only {} vertices", face.id, ids.len());
    }
    for (a, b) in ids.iter().circular_tuple_windows() {
        if a == b {
            bail!("Face {} has a zero-length edge at vertex {a}", face.id);
        }
    }
    if let Some(v) = ids.iter().duplicates().next() {
        bail!("Face {} visits vertex {v} more than once", face.id);
    }
    Ok(())
}

/// Checks the mesh is topologically sound, returning an error describing
/// the first problem found.
///
/// The relaxed check only requires faces to have at least three vertices, all
/// of which exist, and the vertex to face table to be in sync. The `strict`
/// check also requires windings without repeated vertices and every vertex to
/// be used by some face.
pub fn validate_topology(mesh: &MMesh, strict: bool) -> Result<()> {
    for (id, vertex) in mesh.vertices.iter() {
        if *id != vertex.id {
            bail!("Vertex stored under id {id} says its id is {}", vertex.id);
        }
    }

    for (id, face) in mesh.faces.iter() {
        if *id != face.id {
            bail!("Face stored under id {id} says its id is {}", face.id);
        }
        if face.num_vertices() < 3 {
            bail!("Face {id} has only {} vertices", face.num_vertices());
        }
        for v in face.vertex_ids() {
            if !mesh.has_vertex(*v) {
                bail!("Face {id} references missing vertex {v}");
            }
            if !mesh
                .reverse_table
                .get(v)
                .map(|faces| faces.contains(id))
                .unwrap_or(false)
            {
                bail!("Vertex to face table is missing face {id} for vertex {v}");
            }
        }
        if strict {
            validate_face_winding(face)?;
        }
    }

    for (v, faces) in mesh.reverse_table.iter() {
        for f in faces {
            let references = mesh.face(*f).map(|face| face.contains_vertex(*v));
            if references != Some(true) {
                bail!("Vertex to face table lists face {f} for vertex {v}, which is stale");
            }
        }
    }

    if strict {
        for v in mesh.vertex_ids() {
            if mesh.faces_for_vertex(v).next().is_none() {
                bail!("Vertex {v} is not used by any face");
            }
        }
    }

    Ok(())
}

/// Same as [`validate_topology`], but logs the problem and returns a bool.
pub fn has_valid_topology(mesh: &MMesh, strict: bool) -> bool {
    match validate_topology(mesh, strict) {
        Ok(()) => true,
        Err(err) => {
            log::debug!("Mesh {} has invalid topology: {err:?}", mesh.id());
            false
        }
    }
}

#[cfg(test)]
mod test {
    use super::primitives::Cube;
    use super::*;

    fn face(ids: &[u32]) -> Face {
        Face::new(
            FaceId(0),
            ids.iter().map(|i| VertexId(*i)),
            FaceProperties::default(),
        )
    }

    #[test]
    fn test_face_winding() {
        assert!(validate_face_winding(&face(&[1, 2, 3])).is_ok());
        assert!(validate_face_winding(&face(&[1, 2])).is_err());
        assert!(validate_face_winding(&face(&[1, 2, 2, 3])).is_err());
        assert!(validate_face_winding(&face(&[1, 2, 3, 1])).is_err());
        assert!(validate_face_winding(&face(&[1, 2, 3, 1, 4, 5])).is_err());
    }

    #[test]
    fn test_orphan_vertices_fail_strict_check_only() {
        let mut mesh = Cube::build(MeshId(0), Vec3::ZERO, Vec3::ONE, MaterialId(0));
        let mut op = mesh.start_operation();
        op.add_vertex(Vec3::splat(4.0)).unwrap();
        op.commit().unwrap();
        assert!(has_valid_topology(&mesh, false));
        assert!(!has_valid_topology(&mesh, true));
    }
}
