// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::*;

macro_rules! impl_index_traits {
    ($container:ty, $id_type:ty, $output_type:ty, $getter:ident) => {
        impl std::ops::Index<$id_type> for $container {
            type Output = $output_type;

            fn index(&self, index: $id_type) -> &Self::Output {
                self.$getter(index).unwrap_or_else(|| {
                    panic!(
                        "{} index error for {:?}. Has the value been deleted?",
                        stringify!($id_type),
                        index
                    )
                })
            }
        }
    };
}

impl_index_traits!(MMesh, VertexId, Vertex, vertex);
impl_index_traits!(MMesh, FaceId, Face, face);
impl_index_traits!(GeometryOperation<'_>, VertexId, Vertex, vertex);
impl_index_traits!(GeometryOperation<'_>, FaceId, Face, face);
