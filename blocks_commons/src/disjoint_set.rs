// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::hash::Hash;

/// A union-find forest over elements of any hashable type.
///
/// Elements are mapped to slots in a parent-pointer arena, so callers don't
/// need dense integer keys. Every added element starts in its own set.
/// Queries about elements that were never added are not errors: they simply
/// report that the element is not part of any set.
#[derive(Debug, Clone)]
pub struct DisjointSet<T> {
    slots: HashMap<T, usize>,
    elements: Vec<T>,
    parents: Vec<usize>,
    ranks: Vec<u8>,
}

impl<T> Default for DisjointSet<T> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            elements: Vec::new(),
            parents: Vec::new(),
            ranks: Vec::new(),
        }
    }
}

impl<T: Hash + Eq + Clone> DisjointSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `t` as a singleton set. Adding an element twice is a no-op.
    pub fn add(&mut self, t: T) {
        if self.slots.contains_key(&t) {
            return;
        }
        let slot = self.parents.len();
        self.slots.insert(t.clone(), slot);
        self.elements.push(t);
        self.parents.push(slot);
        self.ranks.push(0);
    }

    pub fn contains(&self, t: &T) -> bool {
        self.slots.contains_key(t)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn find_root(&mut self, slot: usize) -> usize {
        let mut root = slot;
        while self.parents[root] != root {
            root = self.parents[root];
        }
        // Path compression
        let mut it = slot;
        while self.parents[it] != root {
            let next = self.parents[it];
            self.parents[it] = root;
            it = next;
        }
        root
    }

    /// Merges the sets containing `a` and `b`. Elements that were not yet in
    /// the structure are added first.
    pub fn join(&mut self, a: T, b: T) {
        self.add(a.clone());
        self.add(b.clone());
        let root_a = self.find_root(self.slots[&a]);
        let root_b = self.find_root(self.slots[&b]);
        if root_a == root_b {
            return;
        }

        match self.ranks[root_a].cmp(&self.ranks[root_b]) {
            std::cmp::Ordering::Less => self.parents[root_a] = root_b,
            std::cmp::Ordering::Greater => self.parents[root_b] = root_a,
            std::cmp::Ordering::Equal => {
                self.parents[root_b] = root_a;
                self.ranks[root_a] = self.ranks[root_a].saturating_add(1);
            }
        }
    }

    /// Returns true when both elements are present and belong to the same
    /// set. An element that was never added is not even in the same set as
    /// itself.
    pub fn are_in_same_set(&mut self, a: &T, b: &T) -> bool {
        match (self.slots.get(a).copied(), self.slots.get(b).copied()) {
            (Some(slot_a), Some(slot_b)) => self.find_root(slot_a) == self.find_root(slot_b),
            _ => false,
        }
    }

    /// Returns every set with more than `min_size - 1` elements. Sets are
    /// listed in the order their first element was added, and the members
    /// of each set keep insertion order too.
    pub fn sets_with_min_size(&mut self, min_size: usize) -> Vec<Vec<T>> {
        let mut root_to_set = HashMap::<usize, usize>::new();
        let mut sets: Vec<Vec<T>> = Vec::new();
        for slot in 0..self.elements.len() {
            let root = self.find_root(slot);
            let set_idx = *root_to_set.entry(root).or_insert_with(|| {
                sets.push(Vec::new());
                sets.len() - 1
            });
            sets[set_idx].push(self.elements[slot].clone());
        }
        sets.retain(|s| s.len() >= min_size);
        sets
    }

    /// Returns all the sets in the forest.
    pub fn sets(&mut self) -> Vec<Vec<T>> {
        self.sets_with_min_size(1)
    }
}
