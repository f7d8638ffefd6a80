// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Some useful re-exports
pub mod prelude;

/// Tolerances shared by the repair and triangulation algorithms
pub mod config;

/// The polygon mesh data model, its geometry operations and the repair kernel
pub mod mesh;

/// A model owns the meshes that make it up, addressed by mesh id.
pub mod model;

/// An R-tree over item bounds, answering containment and overlap queries.
pub mod spatial_index;

/// Aggregates committed meshes into render buffers batched by material.
pub mod remesher;

/// A blocking producer/consumer queue used to hand results from worker
/// threads back to the main thread.
pub mod work_queue;
