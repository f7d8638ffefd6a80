// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// The MMesh polygon mesh: vertices, faces and transactional geometry
/// operations.
pub mod mmesh;

/// Geometric predicates over points, segments, triangles and polygons.
pub mod geometry;

/// Value identifiers for vertices and edges, used by selection and highlight
/// code.
pub mod keys;

/// Turns planar polygons, possibly concave and possibly with holes, into
/// triangles for rendering.
pub mod triangulator;

/// Topological repair after vertex moves: welding, degenerate segment
/// removal and invalid face removal.
pub mod fixer;

/// Planarity-driven face splitting.
pub mod mesh_util;
