// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::*;

/// A batch of edits against a single [`MMesh`].
///
/// Edits are buffered as a diff on top of the mesh's committed state. The
/// read methods (`vertex`, `face`, `faces_touching`...) see the staged state,
/// while readers of the mesh itself keep seeing the committed state until
/// [`GeometryOperation::commit`] applies the whole diff at once. Dropping the
/// operation without committing discards every staged change.
pub struct GeometryOperation<'a> {
    mesh: &'a mut MMesh,
    /// Added or modified vertices.
    staged_vertices: BTreeMap<VertexId, Vertex>,
    deleted_vertices: BTreeSet<VertexId>,
    /// Added or modified faces.
    staged_faces: BTreeMap<FaceId, Face>,
    deleted_faces: BTreeSet<FaceId>,
    /// `None` when the id space is exhausted.
    next_vertex_id: Option<VertexId>,
    next_face_id: Option<FaceId>,
}

impl<'a> GeometryOperation<'a> {
    pub(super) fn new(mesh: &'a mut MMesh) -> Self {
        Self {
            next_vertex_id: mesh.next_vertex_id(),
            next_face_id: mesh.next_face_id(),
            mesh,
            staged_vertices: BTreeMap::new(),
            deleted_vertices: BTreeSet::new(),
            staged_faces: BTreeMap::new(),
            deleted_faces: BTreeSet::new(),
        }
    }

    /// The committed state of the mesh being edited.
    pub fn mesh(&self) -> &MMesh {
        &*self.mesh
    }

    pub fn mesh_id(&self) -> MeshId {
        self.mesh.id
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        if let Some(v) = self.staged_vertices.get(&id) {
            Some(v)
        } else if self.deleted_vertices.contains(&id) {
            None
        } else {
            self.mesh.vertex(id)
        }
    }

    pub fn face(&self, id: FaceId) -> Option<&Face> {
        if let Some(f) = self.staged_faces.get(&id) {
            Some(f)
        } else if self.deleted_faces.contains(&id) {
            None
        } else {
            self.mesh.face(id)
        }
    }

    pub fn has_vertex(&self, id: VertexId) -> bool {
        self.vertex(id).is_some()
    }

    pub fn has_face(&self, id: FaceId) -> bool {
        self.face(id).is_some()
    }

    /// Ids of all the vertices in the staged state, in increasing order.
    pub fn vertex_ids(&self) -> Vec<VertexId> {
        self.mesh
            .vertex_ids()
            .filter(|v| !self.deleted_vertices.contains(v) && !self.staged_vertices.contains_key(v))
            .merge(self.staged_vertices.keys().copied())
            .collect()
    }

    /// Ids of all the faces in the staged state, in increasing order.
    pub fn face_ids(&self) -> Vec<FaceId> {
        self.mesh
            .face_ids()
            .filter(|f| !self.deleted_faces.contains(f) && !self.staged_faces.contains_key(f))
            .merge(self.staged_faces.keys().copied())
            .collect()
    }

    /// Faces in the staged state whose winding references `v`.
    pub fn faces_touching(&self, v: VertexId) -> BTreeSet<FaceId> {
        let mut result: BTreeSet<FaceId> = self
            .mesh
            .faces_for_vertex(v)
            .filter(|f| !self.deleted_faces.contains(f) && !self.staged_faces.contains_key(f))
            .collect();
        result.extend(
            self.staged_faces
                .values()
                .filter(|f| f.contains_vertex(v))
                .map(|f| f.id),
        );
        result
    }

    /// Staged mesh-space positions of the face's vertices, in winding order.
    pub fn face_positions(&self, face_id: FaceId) -> Result<SVec<Vec3>> {
        let face = self
            .face(face_id)
            .ok_or_else(|| anyhow!("Face {face_id} does not exist"))?;
        face.vertex_ids()
            .iter()
            .map(|v| {
                self.vertex(*v)
                    .map(|v| v.loc)
                    .ok_or_else(|| anyhow!("Face {face_id} references missing vertex {v}"))
            })
            .collect()
    }

    /// Returns an id greater than any vertex id in the mesh or in this
    /// operation. Fails once `u32::MAX` has been used.
    pub fn allocate_vertex_id(&mut self) -> Result<VertexId> {
        let id = self
            .next_vertex_id
            .ok_or_else(|| anyhow!("Mesh {} ran out of vertex ids", self.mesh.id))?;
        self.next_vertex_id = id.checked_next();
        Ok(id)
    }

    /// Returns an id greater than any face id in the mesh or in this
    /// operation. Fails once `u32::MAX` has been used.
    pub fn allocate_face_id(&mut self) -> Result<FaceId> {
        let id = self
            .next_face_id
            .ok_or_else(|| anyhow!("Mesh {} ran out of face ids", self.mesh.id))?;
        self.next_face_id = id.checked_next();
        Ok(id)
    }

    /// Adds a new vertex at the given mesh-space position.
    pub fn add_vertex(&mut self, loc: Vec3) -> Result<VertexId> {
        let id = self.allocate_vertex_id()?;
        self.staged_vertices.insert(id, Vertex::new(id, loc));
        Ok(id)
    }

    pub fn add_vertex_with_id(&mut self, id: VertexId, loc: Vec3) -> Result<()> {
        if self.has_vertex(id) {
            bail!("Vertex {id} already exists in mesh {}", self.mesh.id);
        }
        if self.next_vertex_id.map(|next| id >= next).unwrap_or(false) {
            self.next_vertex_id = id.checked_next();
        }
        self.deleted_vertices.remove(&id);
        self.staged_vertices.insert(id, Vertex::new(id, loc));
        Ok(())
    }

    pub fn modify_vertex(&mut self, vertex: Vertex) -> Result<()> {
        if !self.has_vertex(vertex.id) {
            bail!("Cannot modify vertex {}: not in mesh {}", vertex.id, self.mesh.id);
        }
        self.staged_vertices.insert(vertex.id, vertex);
        Ok(())
    }

    pub fn modify_vertex_mesh_space(&mut self, id: VertexId, loc: Vec3) -> Result<()> {
        self.modify_vertex(Vertex::new(id, loc))
    }

    pub fn modify_vertex_model_space(&mut self, id: VertexId, loc: Vec3) -> Result<()> {
        let loc = self.mesh.model_to_mesh(loc);
        self.modify_vertex(Vertex::new(id, loc))
    }

    /// Removes a vertex. Faces still referencing it at commit time make the
    /// commit fail.
    pub fn delete_vertex(&mut self, id: VertexId) -> Result<()> {
        if !self.has_vertex(id) {
            bail!("Cannot delete vertex {id}: not in mesh {}", self.mesh.id);
        }
        self.staged_vertices.remove(&id);
        if self.mesh.has_vertex(id) {
            self.deleted_vertices.insert(id);
        }
        Ok(())
    }

    /// Adds a face with a freshly allocated id.
    pub fn add_face(
        &mut self,
        vertex_ids: impl IntoIterator<Item = VertexId>,
        properties: FaceProperties,
    ) -> Result<FaceId> {
        let id = self.allocate_face_id()?;
        self.add_face_with_id(id, vertex_ids, properties)?;
        Ok(id)
    }

    pub fn add_face_with_id(
        &mut self,
        id: FaceId,
        vertex_ids: impl IntoIterator<Item = VertexId>,
        properties: FaceProperties,
    ) -> Result<()> {
        if self.has_face(id) {
            bail!("Face {id} already exists in mesh {}", self.mesh.id);
        }
        let face = Face::new(id, vertex_ids, properties);
        self.check_vertices_exist(&face)?;
        if self.next_face_id.map(|next| id >= next).unwrap_or(false) {
            self.next_face_id = id.checked_next();
        }
        self.deleted_faces.remove(&id);
        self.staged_faces.insert(id, face);
        Ok(())
    }

    /// Replaces a face. The winding is allowed to become degenerate while the
    /// operation is open, but it must be valid again by commit time.
    pub fn modify_face(&mut self, face: Face) -> Result<()> {
        if !self.has_face(face.id) {
            bail!("Cannot modify face {}: not in mesh {}", face.id, self.mesh.id);
        }
        self.check_vertices_exist(&face)?;
        self.staged_faces.insert(face.id, face);
        Ok(())
    }

    pub fn modify_face_vertices(
        &mut self,
        id: FaceId,
        vertex_ids: impl IntoIterator<Item = VertexId>,
    ) -> Result<()> {
        let mut face = self
            .face(id)
            .cloned()
            .ok_or_else(|| anyhow!("Cannot modify face {id}: not in mesh {}", self.mesh.id))?;
        face.set_vertex_ids(vertex_ids);
        self.modify_face(face)
    }

    pub fn delete_face(&mut self, id: FaceId) -> Result<()> {
        if !self.has_face(id) {
            bail!("Cannot delete face {id}: not in mesh {}", self.mesh.id);
        }
        self.staged_faces.remove(&id);
        if self.mesh.has_face(id) {
            self.deleted_faces.insert(id);
        }
        Ok(())
    }

    /// True when nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.staged_vertices.is_empty()
            && self.deleted_vertices.is_empty()
            && self.staged_faces.is_empty()
            && self.deleted_faces.is_empty()
    }

    fn check_vertices_exist(&self, face: &Face) -> Result<()> {
        for v in face.vertex_ids() {
            if !self.has_vertex(*v) {
                bail!("Face {} references vertex {v}, which is not in mesh {}", face.id, self.mesh.id);
            }
        }
        Ok(())
    }

    /// Checks that the staged state is a valid mesh, without touching the
    /// committed one.
    fn validate_staged(&self) -> Result<()> {
        for face in self.staged_faces.values() {
            validation::validate_face_winding(face)?;
            self.check_vertices_exist(face)?;
        }
        // Untouched faces only need a check when one of their vertices went away.
        for v in &self.deleted_vertices {
            for f in self.mesh.faces_for_vertex(*v) {
                if !self.deleted_faces.contains(&f) && !self.staged_faces.contains_key(&f) {
                    bail!("Vertex {v} was deleted but face {f} still references it");
                }
            }
        }
        Ok(())
    }

    /// Applies every staged change to the mesh and refreshes the cached
    /// normals, the vertex to face table and the bounds.
    ///
    /// Consumes the operation. If the staged state is not a valid mesh, an
    /// error is returned and the mesh is left untouched.
    pub fn commit(self) -> Result<()> {
        self.validate_staged()
            .with_context(|| format!("Cannot commit operation on mesh {}", self.mesh.id))?;

        let GeometryOperation {
            mesh,
            staged_vertices,
            deleted_vertices,
            staged_faces,
            deleted_faces,
            ..
        } = self;

        let mut dirty_normals = BTreeSet::<FaceId>::new();

        let replaced_faces = deleted_faces
            .iter()
            .chain(staged_faces.keys())
            .copied()
            .collect_vec();
        for f in replaced_faces {
            if let Some(old) = mesh.faces.remove(&f) {
                for v in old.vertex_ids() {
                    if let Some(faces) = mesh.reverse_table.get_mut(v) {
                        faces.remove(&f);
                        if faces.is_empty() {
                            mesh.reverse_table.remove(v);
                        }
                    }
                }
            }
        }

        for v in &deleted_vertices {
            mesh.vertices.remove(v);
            mesh.reverse_table.remove(v);
        }

        for (id, vertex) in staged_vertices {
            dirty_normals.extend(mesh.faces_for_vertex(id));
            mesh.vertices.insert(id, vertex);
        }

        for (id, face) in staged_faces {
            for v in face.vertex_ids() {
                mesh.reverse_table.entry(*v).or_default().insert(id);
            }
            dirty_normals.insert(id);
            mesh.faces.insert(id, face);
        }

        let vertices = &mesh.vertices;
        for f in dirty_normals {
            if let Some(face) = mesh.faces.get_mut(&f) {
                face.recompute_normal(|v| vertices.get(&v).map(|v| v.loc));
            }
        }
        mesh.recompute_bounds();

        Ok(())
    }
}
