// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value identifiers for mesh elements across a whole model, used by
//! selection and highlighting code.

use serde::{Deserialize, Serialize};

use crate::prelude::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexKey {
    pub mesh_id: MeshId,
    pub vertex_id: VertexId,
}

impl VertexKey {
    pub fn new(mesh_id: MeshId, vertex_id: VertexId) -> Self {
        Self { mesh_id, vertex_id }
    }
}

/// An undirected edge. `vertex_id_1` is never greater than `vertex_id_2`, so
/// both directions of an edge produce the same key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    mesh_id: MeshId,
    vertex_id_1: VertexId,
    vertex_id_2: VertexId,
}

impl EdgeKey {
    pub fn new(mesh_id: MeshId, a: VertexId, b: VertexId) -> Self {
        let (vertex_id_1, vertex_id_2) = if a <= b { (a, b) } else { (b, a) };
        Self {
            mesh_id,
            vertex_id_1,
            vertex_id_2,
        }
    }

    pub fn mesh_id(&self) -> MeshId {
        self.mesh_id
    }

    pub fn vertex_id_1(&self) -> VertexId {
        self.vertex_id_1
    }

    pub fn vertex_id_2(&self) -> VertexId {
        self.vertex_id_2
    }

    pub fn contains(&self, v: VertexId) -> bool {
        self.vertex_id_1 == v || self.vertex_id_2 == v
    }

    /// Keys for every edge of a face, following its winding.
    pub fn edges_of_face(mesh_id: MeshId, face: &Face) -> impl Iterator<Item = EdgeKey> + '_ {
        face.vertex_ids()
            .iter()
            .circular_tuple_windows()
            .map(move |(a, b)| EdgeKey::new(mesh_id, *a, *b))
    }
}
