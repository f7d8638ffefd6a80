// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::*;

pub struct Cube;

/// Corner directions of a cube, indexed by vertex id. The bottom ring comes
/// first, then the top ring.
const CUBE_CORNERS: [[f32; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, -1.0, 1.0],
    [-1.0, -1.0, 1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, 1.0, 1.0],
    [1.0, 1.0, 1.0],
    [1.0, 1.0, -1.0],
];

/// Bottom, top, back (-z), front (+z), left, right. Wound counter-clockwise
/// seen from outside.
const CUBE_FACES: [[u32; 4]; 6] = [
    [0, 1, 2, 3],
    [4, 5, 6, 7],
    [4, 7, 1, 0],
    [3, 2, 6, 5],
    [5, 4, 0, 3],
    [6, 2, 1, 7],
];

impl Cube {
    /// An axis-aligned box with 8 vertices and 6 quads, wound so the normals
    /// point outwards.
    pub fn build(id: MeshId, center: Vec3, size: Vec3, material_id: MaterialId) -> MMesh {
        let positions = CUBE_CORNERS.map(|dir| center + Vec3::from(dir) * size * 0.5);
        MMesh::build_from_polygons(id, &positions, &CUBE_FACES, material_id)
            .expect("Cube construction should not fail")
    }
}

pub struct Quad;

impl Quad {
    /// A single quad facing `normal`. `right` gives the direction of the
    /// quad's width.
    pub fn build(
        id: MeshId,
        center: Vec3,
        normal: Vec3,
        right: Vec3,
        size: Vec2,
        material_id: MaterialId,
    ) -> MMesh {
        let normal = normal.normalize();
        let right = right.normalize();
        let forward = normal.cross(right);

        let hsize = size * 0.5;

        let v1 = center + hsize.x * right + hsize.y * forward;
        let v2 = center - hsize.x * right + hsize.y * forward;
        let v3 = center - hsize.x * right - hsize.y * forward;
        let v4 = center + hsize.x * right - hsize.y * forward;

        MMesh::build_from_polygons(id, &[v1, v2, v3, v4], &[[0u32, 1, 2, 3]], material_id)
            .expect("Quad construction should not fail")
    }
}
