// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};

use crate::prelude::*;

use super::geometry::{self, Bounds};

pub mod id_types;
pub use id_types::*;

/// Panicking `Index` impls for code that already knows an id is valid.
pub mod mesh_index_impls;

/// Staged, atomically committed edits to a mesh.
pub mod geometry_operation;
pub use geometry_operation::GeometryOperation;

/// Simple shapes, mostly useful for tests and tools that spawn new meshes.
pub mod primitives;

/// Topology checks used as a post-condition by the repair code.
pub mod validation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: VertexId,
    /// Position in mesh-local space.
    pub loc: Vec3,
}

impl Vertex {
    pub fn new(id: VertexId, loc: Vec3) -> Self {
        Self { id, loc }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceProperties {
    pub material_id: MaterialId,
}

impl FaceProperties {
    pub fn with_material(material_id: MaterialId) -> Self {
        Self { material_id }
    }
}

/// A closed polygon. The winding of `vertex_ids` determines the outward
/// normal: counter-clockwise when looking at the face from the outside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub id: FaceId,
    vertex_ids: SVec<VertexId>,
    /// Cached unit normal. Only kept up to date for faces owned by a mesh.
    normal: Vec3,
    pub properties: FaceProperties,
}

impl Face {
    pub fn new(
        id: FaceId,
        vertex_ids: impl IntoIterator<Item = VertexId>,
        properties: FaceProperties,
    ) -> Self {
        Self {
            id,
            vertex_ids: vertex_ids.into_iter().collect(),
            normal: Vec3::ZERO,
            properties,
        }
    }

    pub fn vertex_ids(&self) -> &[VertexId] {
        &self.vertex_ids
    }

    pub fn set_vertex_ids(&mut self, vertex_ids: impl IntoIterator<Item = VertexId>) {
        self.vertex_ids = vertex_ids.into_iter().collect();
    }

    pub fn num_vertices(&self) -> usize {
        self.vertex_ids.len()
    }

    pub fn contains_vertex(&self, v: VertexId) -> bool {
        self.vertex_ids.contains(&v)
    }

    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    pub fn material_id(&self) -> MaterialId {
        self.properties.material_id
    }

    /// Recomputes the cached normal from vertex positions. Vertices that can't
    /// be found are skipped.
    pub(crate) fn recompute_normal(&mut self, positions: impl Fn(VertexId) -> Option<Vec3>) {
        let points = self.vertex_ids.iter().filter_map(|v| positions(*v)).collect_svec();
        self.normal = geometry::polygon_normal(points.iter_cpy());
    }
}

/// A single polygon mesh. Owns its vertices and faces, keyed by id, plus the
/// rigid transform that places it in model space.
///
/// The mesh can only be mutated through a [`GeometryOperation`], obtained
/// with [`MMesh::start_operation`]. Readers never observe a partially applied
/// edit.
#[derive(Debug, Clone)]
pub struct MMesh {
    id: MeshId,
    offset: Vec3,
    rotation: Quat,
    vertices: BTreeMap<VertexId, Vertex>,
    faces: BTreeMap<FaceId, Face>,
    /// Maps every vertex to the faces that reference it.
    reverse_table: BTreeMap<VertexId, BTreeSet<FaceId>>,
    /// Mesh-space bounds of all the vertices.
    bounds: Bounds,
    remix_ids: Option<BTreeSet<String>>,
}

impl MMesh {
    /// Builds a mesh from already allocated vertices and faces. Fails when ids
    /// are repeated or faces reference missing vertices.
    pub fn new(
        id: MeshId,
        offset: Vec3,
        rotation: Quat,
        vertices: impl IntoIterator<Item = Vertex>,
        faces: impl IntoIterator<Item = Face>,
    ) -> Result<Self> {
        let mut mesh = Self::empty(id);
        mesh.offset = offset;
        mesh.rotation = rotation;
        for vertex in vertices {
            if mesh.vertices.contains_key(&vertex.id) {
                bail!("Duplicate vertex id {} in mesh {}", vertex.id, id);
            }
            mesh.vertices.insert(vertex.id, vertex);
        }
        for face in faces {
            if mesh.faces.contains_key(&face.id) {
                bail!("Duplicate face id {} in mesh {}", face.id, id);
            }
            mesh.faces.insert(face.id, face);
        }
        mesh.rebuild_derived_data();
        validation::validate_topology(&mesh, false)
            .with_context(|| format!("Invalid topology when building mesh {id}"))?;
        Ok(mesh)
    }

    /// A mesh with no vertices or faces and an identity transform.
    pub fn empty(id: MeshId) -> Self {
        Self {
            id,
            offset: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            vertices: BTreeMap::new(),
            faces: BTreeMap::new(),
            reverse_table: BTreeMap::new(),
            bounds: Bounds::empty(),
            remix_ids: None,
        }
    }

    /// Builds a mesh from an indexed polygon soup. Vertex ids are the indices
    /// into `positions`, and face ids follow the order of `polygons`.
    /// Positions no polygon references are not added to the mesh.
    pub fn build_from_polygons<Index, Polygon>(
        id: MeshId,
        positions: &[Vec3],
        polygons: &[Polygon],
        material_id: MaterialId,
    ) -> Result<Self>
    where
        Index: num_traits::AsPrimitive<usize> + 'static + Eq + PartialEq + core::hash::Hash + Copy,
        Polygon: AsRef<[Index]>,
    {
        let mut vertices = BTreeMap::<VertexId, Vertex>::new();
        let mut faces = Vec::with_capacity(polygons.len());

        for (face_idx, polygon) in polygons.iter().map(|p| p.as_ref()).enumerate() {
            if polygon.len() < 3 {
                bail!("Cannot build meshes where polygons have less than three vertices.")
            }
            if polygon.iter().duplicates().next().is_some() {
                bail!("Cannot build meshes where a polygon has duplicate vertices")
            }

            let mut vertex_ids = SVec::new();
            for index in polygon {
                let index: usize = index.as_();
                let position = positions.get(index).ok_or_else(|| {
                    anyhow!("Out-of-bounds index in the polygon array {}", index)
                })?;
                let v_id = VertexId(u32::try_from(index)?);
                vertices
                    .entry(v_id)
                    .or_insert_with(|| Vertex::new(v_id, *position));
                vertex_ids.push(v_id);
            }

            faces.push(Face::new(
                FaceId(u32::try_from(face_idx)?),
                vertex_ids,
                FaceProperties::with_material(material_id),
            ));
        }

        Self::new(id, Vec3::ZERO, Quat::IDENTITY, vertices.into_values(), faces)
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    /// Deep copy of this mesh under a different id.
    pub fn clone_with_id(&self, id: MeshId) -> Self {
        let mut mesh = self.clone();
        mesh.id = id;
        mesh
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(&id)
    }

    pub fn face(&self, id: FaceId) -> Option<&Face> {
        self.faces.get(&id)
    }

    pub fn has_vertex(&self, id: VertexId) -> bool {
        self.vertices.contains_key(&id)
    }

    pub fn has_face(&self, id: FaceId) -> bool {
        self.faces.contains_key(&id)
    }

    /// All vertices, in increasing id order.
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> + '_ {
        self.vertices.values()
    }

    /// All faces, in increasing id order.
    pub fn faces(&self) -> impl Iterator<Item = &Face> + '_ {
        self.faces.values()
    }

    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices.keys().copied()
    }

    pub fn face_ids(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.faces.keys().copied()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Faces whose winding references `v`. Empty for unknown vertices.
    pub fn faces_for_vertex(&self, v: VertexId) -> impl Iterator<Item = FaceId> + '_ {
        self.reverse_table.get(&v).into_iter().flatten().copied()
    }

    /// Mesh-space positions of the face's vertices, in winding order.
    pub fn face_positions(&self, face: &Face) -> SVec<Vec3> {
        face.vertex_ids
            .iter()
            .filter_map(|v| self.vertex(*v).map(|v| v.loc))
            .collect()
    }

    /// Bounding box in mesh-local space.
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Bounding box in model space. Rotated meshes get the axis-aligned box
    /// around the rotated mesh-space bounds.
    pub fn model_bounds(&self) -> Bounds {
        self.bounds.transformed(self.offset, self.rotation)
    }

    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn set_offset(&mut self, offset: Vec3) {
        self.offset = offset;
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation.normalize();
    }

    pub fn mesh_to_model(&self, point: Vec3) -> Vec3 {
        self.rotation * point + self.offset
    }

    pub fn model_to_mesh(&self, point: Vec3) -> Vec3 {
        self.rotation.inverse() * (point - self.offset)
    }

    /// Identifiers of the remixed creations this mesh was derived from.
    pub fn remix_ids(&self) -> Option<&BTreeSet<String>> {
        self.remix_ids.as_ref()
    }

    pub fn set_remix_ids(&mut self, remix_ids: Option<BTreeSet<String>>) {
        self.remix_ids = remix_ids;
    }

    /// Starts a transaction on this mesh. The mesh stays borrowed until the
    /// operation is committed or dropped, so there can only be one at a time.
    pub fn start_operation(&mut self) -> GeometryOperation<'_> {
        GeometryOperation::new(self)
    }

    /// The id after the highest vertex id in use. `None` once `u32::MAX` is
    /// taken.
    pub(crate) fn next_vertex_id(&self) -> Option<VertexId> {
        match self.vertices.keys().next_back() {
            Some(v) => v.checked_next(),
            None => Some(VertexId::default()),
        }
    }

    pub(crate) fn next_face_id(&self) -> Option<FaceId> {
        match self.faces.keys().next_back() {
            Some(f) => f.checked_next(),
            None => Some(FaceId::default()),
        }
    }

    fn rebuild_derived_data(&mut self) {
        self.reverse_table.clear();
        for face in self.faces.values() {
            for v in face.vertex_ids.iter() {
                self.reverse_table.entry(*v).or_default().insert(face.id);
            }
        }
        let vertices = &self.vertices;
        for face in self.faces.values_mut() {
            face.recompute_normal(|v| vertices.get(&v).map(|v| v.loc));
        }
        self.recompute_bounds();
    }

    fn recompute_bounds(&mut self) {
        self.bounds = Bounds::from_points(self.vertices.values().map(|v| v.loc));
    }
}

#[cfg(test)]
mod test {
    use super::primitives::Cube;
    use super::*;

    #[test]
    fn test_build_from_polygons() {
        let positions = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(9.0, 9.0, 9.0),
        ];
        let mesh =
            MMesh::build_from_polygons(MeshId(3), &positions, &[[0u32, 1, 2, 3]], MaterialId(2))
                .unwrap();
        assert_eq!(mesh.id(), MeshId(3));
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 1);
        assert!(!mesh.has_vertex(VertexId(4)));
        let face = &mesh[FaceId(0)];
        assert_eq!(face.normal(), Vec3::Z);
        assert_eq!(face.material_id(), MaterialId(2));
        assert_eq!(mesh.bounds().max, Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(mesh.faces_for_vertex(VertexId(2)).collect_vec(), vec![FaceId(0)]);

        assert!(MMesh::build_from_polygons(MeshId(0), &positions, &[[0u32, 1]], MaterialId(0)).is_err());
        assert!(
            MMesh::build_from_polygons(MeshId(0), &positions, &[[0u32, 1, 1]], MaterialId(0))
                .is_err()
        );
        assert!(
            MMesh::build_from_polygons(MeshId(0), &positions, &[[0u32, 1, 7]], MaterialId(0))
                .is_err()
        );
    }

    #[test]
    fn test_new_rejects_bad_input() {
        let vertices = vec![
            Vertex::new(VertexId(0), Vec3::ZERO),
            Vertex::new(VertexId(1), Vec3::X),
            Vertex::new(VertexId(2), Vec3::Y),
        ];
        let face = Face::new(
            FaceId(0),
            [VertexId(0), VertexId(1), VertexId(2)],
            FaceProperties::default(),
        );
        assert!(MMesh::new(
            MeshId(0),
            Vec3::ZERO,
            Quat::IDENTITY,
            vertices.clone(),
            vec![face.clone()]
        )
        .is_ok());

        let mut repeated = vertices.clone();
        repeated.push(Vertex::new(VertexId(1), Vec3::Z));
        assert!(MMesh::new(MeshId(0), Vec3::ZERO, Quat::IDENTITY, repeated, vec![face]).is_err());

        let dangling = Face::new(
            FaceId(0),
            [VertexId(0), VertexId(1), VertexId(5)],
            FaceProperties::default(),
        );
        assert!(
            MMesh::new(MeshId(0), Vec3::ZERO, Quat::IDENTITY, vertices, vec![dangling]).is_err()
        );
    }

    #[test]
    fn test_clone_is_independent() {
        let mut mesh = Cube::build(MeshId(1), Vec3::ZERO, Vec3::ONE, MaterialId(0));
        let original = mesh.clone();
        let mut op = mesh.start_operation();
        op.modify_vertex_mesh_space(VertexId(0), Vec3::splat(-2.0))
            .unwrap();
        op.commit().unwrap();

        assert_eq!(original[VertexId(0)].loc, Vec3::splat(-0.5));
        assert_eq!(mesh[VertexId(0)].loc, Vec3::splat(-2.0));
        assert_eq!(original.vertex_ids().collect_vec(), mesh.vertex_ids().collect_vec());
    }

    #[test]
    fn test_clone_with_id_keeps_provenance() {
        let mut mesh = Cube::build(MeshId(1), Vec3::ZERO, Vec3::ONE, MaterialId(0));
        assert!(mesh.remix_ids().is_none());
        let remixes: BTreeSet<String> = ["castle".to_string()].into_iter().collect();
        mesh.set_remix_ids(Some(remixes.clone()));

        let mut copy = mesh.clone_with_id(MeshId(7));
        assert_eq!(copy.id(), MeshId(7));
        assert_eq!(copy.remix_ids(), Some(&remixes));
        assert_eq!(copy.vertex_count(), 8);

        let mut op = copy.start_operation();
        assert_eq!(op.mesh_id(), MeshId(7));
        op.delete_face(FaceId(0)).unwrap();
        op.commit().unwrap();
        assert_eq!(copy.face_count(), 5);
        assert_eq!(mesh.face_count(), 6);

        copy.set_remix_ids(None);
        assert!(copy.remix_ids().is_none());
    }

    #[test]
    fn test_transforms() {
        let mut mesh = Cube::build(MeshId(1), Vec3::ZERO, Vec3::ONE, MaterialId(0));
        mesh.set_offset(Vec3::new(10.0, 0.0, 0.0));
        mesh.set_rotation(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));

        let p = Vec3::new(1.0, 2.0, 3.0);
        let model = mesh.mesh_to_model(p);
        assert!((mesh.model_to_mesh(model) - p).length() < 1e-5);

        let bounds = mesh.model_bounds();
        assert!((bounds.center() - Vec3::new(10.0, 0.0, 0.0)).length() < 1e-5);
        assert!((bounds.size() - Vec3::ONE).length() < 1e-5);
    }
}
