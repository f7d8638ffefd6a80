// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounding-box index over the items of a scene, answering which items lie
//! inside, or overlap, a query box.

use std::fmt::Display;

use rstar::{RTree, RTreeObject, AABB};

use crate::mesh::geometry::Bounds;
use crate::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct IndexedItem<Id> {
    id: Id,
    bounds: Bounds,
}

impl<Id> RTreeObject for IndexedItem<Id> {
    type Envelope = AABB<[f32; 3]>;
    fn envelope(&self) -> Self::Envelope {
        to_envelope(&self.bounds)
    }
}

fn to_envelope(bounds: &Bounds) -> AABB<[f32; 3]> {
    AABB::from_corners(bounds.min.to_array(), bounds.max.to_array())
}

/// Items with axis-aligned bounds, keyed by id and stored in an R-tree.
///
/// Items with empty bounds are tracked, so `has_item` reports them, but no
/// query ever returns them.
pub struct SpatialIndex<Id> {
    tree: RTree<IndexedItem<Id>>,
    items: BTreeMap<Id, Bounds>,
}

impl<Id: Ord + Copy + Display> SpatialIndex<Id> {
    pub fn new() -> Self {
        Self {
            tree: RTree::new(),
            items: BTreeMap::new(),
        }
    }

    pub fn add_item(&mut self, id: Id, bounds: Bounds) -> Result<()> {
        if self.items.contains_key(&id) {
            bail!("Item {id} is already in the spatial index");
        }
        self.items.insert(id, bounds);
        self.insert_into_tree(id, bounds);
        Ok(())
    }

    pub fn update_item(&mut self, id: Id, bounds: Bounds) -> Result<()> {
        let old = self
            .items
            .get_mut(&id)
            .ok_or_else(|| anyhow!("Cannot update item {id}: not in the spatial index"))?;
        let old = std::mem::replace(old, bounds);
        self.remove_from_tree(id, old);
        self.insert_into_tree(id, bounds);
        Ok(())
    }

    /// Removes an item, returning its last bounds.
    pub fn remove_item(&mut self, id: Id) -> Result<Bounds> {
        let bounds = self
            .items
            .remove(&id)
            .ok_or_else(|| anyhow!("Cannot remove item {id}: not in the spatial index"))?;
        self.remove_from_tree(id, bounds);
        Ok(bounds)
    }

    pub fn has_item(&self, id: Id) -> bool {
        self.items.contains_key(&id)
    }

    pub fn item_bounds(&self, id: Id) -> Option<Bounds> {
        self.items.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ids of the items whose bounds lie entirely inside `query`, boundary
    /// included. Sorted by id.
    pub fn contained_by(&self, query: &Bounds) -> Vec<Id> {
        if query.is_empty() {
            return Vec::new();
        }
        self.tree
            .locate_in_envelope(&to_envelope(query))
            .map(|item| item.id)
            .sorted()
            .collect()
    }

    /// Ids of the items whose bounds overlap `query`. Boxes that only touch
    /// count as overlapping. Sorted by id.
    pub fn intersected_by(&self, query: &Bounds) -> Vec<Id> {
        if query.is_empty() {
            return Vec::new();
        }
        self.tree
            .locate_in_envelope_intersecting(&to_envelope(query))
            .map(|item| item.id)
            .sorted()
            .collect()
    }

    fn insert_into_tree(&mut self, id: Id, bounds: Bounds) {
        if !bounds.is_empty() {
            self.tree.insert(IndexedItem { id, bounds });
        }
    }

    fn remove_from_tree(&mut self, id: Id, bounds: Bounds) {
        if !bounds.is_empty() {
            self.tree.remove(&IndexedItem { id, bounds });
        }
    }
}

impl<Id: Ord + Copy + Display> Default for SpatialIndex<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: Clone> Clone for SpatialIndex<Id> {
    fn clone(&self) -> Self {
        Self {
            tree: RTree::bulk_load(self.tree.iter().cloned().collect()),
            items: self.items.clone(),
        }
    }
}

impl<Id: std::fmt::Debug> std::fmt::Debug for SpatialIndex<Id> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("items", &self.items)
            .finish()
    }
}
