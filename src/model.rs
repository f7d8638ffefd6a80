// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::mesh::geometry::Bounds;
use crate::prelude::*;
use crate::spatial_index::SpatialIndex;

/// Owns every mesh of a scene, keyed by id. A mesh lives in at most one
/// model, and edits replace it wholesale through [`Model::apply_mesh_update`].
///
/// Operations on ids that are not (or are already) in the model return an
/// error. Those indicate a bug in the caller rather than a recoverable
/// condition.
///
/// The model-space bounds of every mesh are kept in a [`SpatialIndex`], so
/// tools can find the meshes inside or touching a region.
#[derive(Debug, Clone, Default)]
pub struct Model {
    meshes: BTreeMap<MeshId, MMesh>,
    index: SpatialIndex<MeshId>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, mesh: MMesh) -> Result<()> {
        let id = mesh.id();
        if self.meshes.contains_key(&id) {
            bail!("Mesh {id} is already in the model");
        }
        self.index.add_item(id, mesh.model_bounds())?;
        self.meshes.insert(id, mesh);
        Ok(())
    }

    pub fn get_mesh(&self, id: MeshId) -> Result<&MMesh> {
        self.meshes
            .get(&id)
            .ok_or_else(|| anyhow!("Mesh {id} is not in the model"))
    }

    /// Runs `edit` on a mesh in place, then refreshes its indexed bounds.
    /// The mesh must keep its id.
    pub fn edit_mesh<R>(
        &mut self,
        id: MeshId,
        edit: impl FnOnce(&mut MMesh) -> R,
    ) -> Result<R> {
        let mesh = self
            .meshes
            .get_mut(&id)
            .ok_or_else(|| anyhow!("Cannot edit mesh {id}: not in the model"))?;
        let result = edit(mesh);
        if mesh.id() != id {
            bail!("Edited mesh {id} changed its id to {}", mesh.id());
        }
        self.index.update_item(id, mesh.model_bounds())?;
        Ok(result)
    }

    /// Removes the mesh from the model and hands it back to the caller.
    pub fn delete_mesh(&mut self, id: MeshId) -> Result<MMesh> {
        let mesh = self
            .meshes
            .remove(&id)
            .ok_or_else(|| anyhow!("Cannot delete mesh {id}: not in the model"))?;
        self.index.remove_item(id)?;
        Ok(mesh)
    }

    /// Replaces a mesh with an edited copy carrying the same id. Returns the
    /// previous version.
    pub fn apply_mesh_update(&mut self, mesh: MMesh) -> Result<MMesh> {
        let slot = self
            .meshes
            .get_mut(&mesh.id())
            .ok_or_else(|| anyhow!("Cannot update mesh {}: not in the model", mesh.id()))?;
        self.index.update_item(mesh.id(), mesh.model_bounds())?;
        Ok(std::mem::replace(slot, mesh))
    }

    pub fn has_mesh(&self, id: MeshId) -> bool {
        self.meshes.contains_key(&id)
    }

    pub fn mesh_ids(&self) -> impl Iterator<Item = MeshId> + '_ {
        self.meshes.keys().copied()
    }

    pub fn meshes(&self) -> impl Iterator<Item = &MMesh> + '_ {
        self.meshes.values()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// An id greater than every mesh id in the model.
    pub fn next_mesh_id(&self) -> Result<MeshId> {
        match self.meshes.keys().next_back() {
            Some(id) => id
                .checked_next()
                .ok_or_else(|| anyhow!("The model ran out of mesh ids")),
            None => Ok(MeshId::default()),
        }
    }

    /// Meshes whose model-space bounds lie entirely inside `region`.
    pub fn meshes_contained_by(&self, region: &Bounds) -> Vec<MeshId> {
        self.index.contained_by(region)
    }

    /// Meshes whose model-space bounds overlap `region`.
    pub fn meshes_intersected_by(&self, region: &Bounds) -> Vec<MeshId> {
        self.index.intersected_by(region)
    }

    pub fn spatial_index(&self) -> &SpatialIndex<MeshId> {
        &self.index
    }

    /// Model-space bounds of every mesh.
    pub fn bounds(&self) -> Bounds {
        self.meshes
            .values()
            .fold(Bounds::empty(), |acc, mesh| acc.union(&mesh.model_bounds()))
    }
}
