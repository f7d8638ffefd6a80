// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use itertools::Itertools;
use smallvec::SmallVec;

/// Most faces are triangles or quads, so four inline slots avoid allocating
/// for the common case.
pub type SVec<T> = SmallVec<[T; 4]>;

pub trait IteratorUtils: Iterator {
    fn collect_svec(self) -> SVec<Self::Item>
    where
        Self: Sized,
    {
        self.collect()
    }
}

impl<T: ?Sized> IteratorUtils for T where T: Iterator {}

/// Rotates the given iterator by shifting all elements `shift` positions
/// forward. Any elements that would be out of bounds are instead put at the
/// beginning.
///
/// This method requires passing the `len` as a separate parameter. This is
/// often known beforehand or can be found by calling .size_hint() for an
/// ExactSizeIterator.
pub fn rotate_iter<T>(
    it: impl Iterator<Item = T> + Clone,
    shift: usize,
    len: usize,
) -> impl Iterator<Item = T> {
    it.cycle().dropping(shift).take(len)
}

/// Helpers to treat a slice as a closed loop, the way polygon windings are
/// stored.
pub trait SliceUtils<T> {
    /// Same as .iter().copied(), but doesn't trigger rustfmt line breaks
    fn iter_cpy(&self) -> std::iter::Copied<std::slice::Iter<'_, T>>;

    /// Index of the element before `i`, wrapping around to the last element.
    fn cyclic_prev_index(&self, i: usize) -> usize;

    /// Index of the element after `i`, wrapping around to the first element.
    fn cyclic_next_index(&self, i: usize) -> usize;
}

impl<T: Copy> SliceUtils<T> for [T] {
    fn iter_cpy(&self) -> std::iter::Copied<std::slice::Iter<'_, T>> {
        self.iter().copied()
    }

    fn cyclic_prev_index(&self, i: usize) -> usize {
        debug_assert!(!self.is_empty());
        (i + self.len() - 1) % self.len()
    }

    fn cyclic_next_index(&self, i: usize) -> usize {
        debug_assert!(!self.is_empty());
        (i + 1) % self.len()
    }
}
