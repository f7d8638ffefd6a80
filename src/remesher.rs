// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Render buffers for a whole model, batched by material.

use log::debug;

use crate::mesh::triangulator;
use crate::prelude::*;

/// Triangles ready to be uploaded to the GPU as a triangle list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexIndexBuffers {
    /// Vertex positions in model space, one per vertex.
    pub positions: Vec<Vec3>,
    /// Vertex normals, one per vertex.
    pub normals: Vec<Vec3>,
    /// Indices: 3*N where N is the number of triangles. Indices point to
    /// elements of `positions` and `normals`.
    pub indices: Vec<u32>,
}

impl VertexIndexBuffers {
    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn positions_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn normals_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.normals)
    }

    pub fn indices_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Appends `other`, shifting its indices past the vertices already here.
    fn append(&mut self, other: &VertexIndexBuffers) -> Result<()> {
        let base = u32::try_from(self.positions.len())?;
        self.positions.extend_from_slice(&other.positions);
        self.normals.extend_from_slice(&other.normals);
        self.indices.extend(other.indices.iter().map(|i| base + i));
        Ok(())
    }
}

/// Generates flat shaded buffers for every material used by `mesh`. Faces
/// are triangulated with the ear clipper, and every triangle gets its own
/// three vertices carrying the face normal.
#[profiling::function]
pub fn generate_mesh_buffers(
    mesh: &MMesh,
    config: &KernelConfig,
) -> Result<BTreeMap<MaterialId, VertexIndexBuffers>> {
    let mut buffers = BTreeMap::<MaterialId, VertexIndexBuffers>::new();
    for face in mesh.faces() {
        let normal = mesh.rotation() * face.normal();
        let triangles = triangulator::triangulate_face_with_config(mesh, face.id, config)?;
        let buffer = buffers.entry(face.material_id()).or_default();
        for triangle in triangles {
            for v in triangle.vertex_ids() {
                buffer.indices.push(u32::try_from(buffer.positions.len())?);
                buffer.positions.push(mesh.mesh_to_model(mesh[v].loc));
                buffer.normals.push(normal);
            }
        }
    }
    Ok(buffers)
}

/// Keeps the render buffers of a set of meshes up to date.
///
/// Each mesh's buffers are generated when the mesh is added or updated. The
/// per-material batches are only rebuilt, lazily, for materials whose
/// contributing meshes changed since the last call to [`Remesher::buffers`].
#[derive(Debug, Default)]
pub struct Remesher {
    config: KernelConfig,
    meshes: BTreeMap<MeshId, BTreeMap<MaterialId, VertexIndexBuffers>>,
    batches: BTreeMap<MaterialId, VertexIndexBuffers>,
    dirty_materials: BTreeSet<MaterialId>,
}

impl Remesher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: KernelConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn contains(&self, id: MeshId) -> bool {
        self.meshes.contains_key(&id)
    }

    pub fn add(&mut self, mesh: &MMesh) -> Result<()> {
        if self.contains(mesh.id()) {
            bail!("Mesh {} is already in the remesher", mesh.id());
        }
        self.insert(mesh)
    }

    /// Regenerates the buffers of a mesh that was already added.
    pub fn update(&mut self, mesh: &MMesh) -> Result<()> {
        if !self.contains(mesh.id()) {
            bail!("Cannot update mesh {}: not in the remesher", mesh.id());
        }
        self.insert(mesh)
    }

    pub fn remove(&mut self, id: MeshId) -> Result<()> {
        let old = self
            .meshes
            .remove(&id)
            .ok_or_else(|| anyhow!("Cannot remove mesh {id}: not in the remesher"))?;
        self.dirty_materials.extend(old.into_keys());
        Ok(())
    }

    fn insert(&mut self, mesh: &MMesh) -> Result<()> {
        let buffers = generate_mesh_buffers(mesh, &self.config)
            .with_context(|| format!("Generating buffers for mesh {}", mesh.id()))?;
        self.dirty_materials.extend(buffers.keys().copied());
        if let Some(old) = self.meshes.insert(mesh.id(), buffers) {
            self.dirty_materials.extend(old.into_keys());
        }
        Ok(())
    }

    /// The buffers for every material in use, rebuilding stale ones first.
    #[profiling::function]
    pub fn buffers(&mut self) -> Result<&BTreeMap<MaterialId, VertexIndexBuffers>> {
        for material in std::mem::take(&mut self.dirty_materials) {
            let mut batch = VertexIndexBuffers::default();
            for mesh_buffers in self.meshes.values() {
                if let Some(buffer) = mesh_buffers.get(&material) {
                    batch.append(buffer)?;
                }
            }
            debug!(
                "Rebuilt batch for material {material}: {} triangles",
                batch.num_triangles()
            );
            if batch.is_empty() {
                self.batches.remove(&material);
            } else {
                self.batches.insert(material, batch);
            }
        }
        Ok(&self.batches)
    }

    /// Materials whose batch will be rebuilt on the next call to
    /// [`Remesher::buffers`].
    pub fn dirty_materials(&self) -> impl Iterator<Item = MaterialId> + '_ {
        self.dirty_materials.iter().copied()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::mmesh::primitives::{Cube, Quad};

    #[test]
    fn test_cube_buffers() {
        let mut cube = Cube::build(MeshId(0), Vec3::ZERO, Vec3::ONE, MaterialId(3));
        cube.set_offset(Vec3::new(10.0, 0.0, 0.0));
        let buffers = generate_mesh_buffers(&cube, &KernelConfig::default()).unwrap();
        assert_eq!(buffers.len(), 1);
        let buffer = &buffers[&MaterialId(3)];
        assert_eq!(buffer.num_triangles(), 12);
        assert_eq!(buffer.positions.len(), 36);
        assert_eq!(buffer.normals.len(), 36);
        assert!(buffer.positions.iter().all(|p| p.x >= 9.5 && p.x <= 10.5));
        assert_eq!(buffer.positions_bytes().len(), 36 * 12);
        assert_eq!(buffer.indices_bytes().len(), 36 * 4);
    }

    #[test]
    fn test_batches_follow_mesh_changes() {
        let cube = Cube::build(MeshId(0), Vec3::ZERO, Vec3::ONE, MaterialId(0));
        let quad = Quad::build(MeshId(1), Vec3::ZERO, Vec3::Y, Vec3::X, Vec2::ONE, MaterialId(0));
        let other = Quad::build(MeshId(2), Vec3::ZERO, Vec3::Y, Vec3::X, Vec2::ONE, MaterialId(1));

        let mut remesher = Remesher::new();
        remesher.add(&cube).unwrap();
        remesher.add(&quad).unwrap();
        remesher.add(&other).unwrap();
        assert!(remesher.add(&quad).is_err());

        let buffers = remesher.buffers().unwrap();
        assert_eq!(buffers[&MaterialId(0)].num_triangles(), 12 + 2);
        assert_eq!(buffers[&MaterialId(1)].num_triangles(), 2);
        // Indices of the second mesh were shifted past the first one
        assert_eq!(*buffers[&MaterialId(0)].indices.iter().max().unwrap(), 14 * 3 - 1);
        assert_eq!(remesher.dirty_materials().count(), 0);

        remesher.remove(MeshId(2)).unwrap();
        assert_eq!(remesher.dirty_materials().collect_vec(), vec![MaterialId(1)]);
        let buffers = remesher.buffers().unwrap();
        assert!(!buffers.contains_key(&MaterialId(1)));
        assert!(buffers.contains_key(&MaterialId(0)));

        assert!(remesher.remove(MeshId(2)).is_err());
        assert!(remesher.update(&other).is_err());
    }

    #[test]
    fn test_update_only_dirties_touched_materials() {
        let cube = Cube::build(MeshId(0), Vec3::ZERO, Vec3::ONE, MaterialId(0));
        let quad = Quad::build(MeshId(1), Vec3::ZERO, Vec3::Y, Vec3::X, Vec2::ONE, MaterialId(1));
        let mut remesher = Remesher::new();
        remesher.add(&cube).unwrap();
        remesher.add(&quad).unwrap();
        remesher.buffers().unwrap();

        let mut moved = quad.clone();
        moved.set_offset(Vec3::Y);
        remesher.update(&moved).unwrap();
        assert_eq!(remesher.dirty_materials().collect_vec(), vec![MaterialId(1)]);
        let buffers = remesher.buffers().unwrap();
        assert!(buffers[&MaterialId(1)].positions.iter().all(|p| p.y == 1.0));
    }
}
