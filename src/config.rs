// Copyright (C) 2023 setzer22 and contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// Tolerances used by the mesh kernel. All distances are in mesh-local units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Two vertices closer than this are considered to be at the same
    /// position and get welded by the fixer.
    pub vertex_merge_epsilon: f32,
    /// How far a moved vertex may stray from the plane of the rest of its
    /// face before the face gets split.
    pub planarity_epsilon: f32,
    /// Orientation / area threshold used by the 2D predicates of the
    /// triangulator.
    pub triangulation_epsilon: f32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            vertex_merge_epsilon: 1e-4,
            planarity_epsilon: 1e-3,
            triangulation_epsilon: 1e-6,
        }
    }
}

impl KernelConfig {
    /// Parses a config from its RON representation. Missing fields take
    /// their default value.
    pub fn from_ron(source: &str) -> Result<Self> {
        let config: KernelConfig =
            ron::from_str(source).context("Could not parse kernel config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_ron(&self) -> Result<String> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("vertex_merge_epsilon", self.vertex_merge_epsilon),
            ("planarity_epsilon", self.planarity_epsilon),
            ("triangulation_epsilon", self.triangulation_epsilon),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                bail!("Config value {name} must be a non-negative number, got {value}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config = KernelConfig::from_ron("(planarity_epsilon: 0.5)").unwrap();
        assert_eq!(config.planarity_epsilon, 0.5);
        assert_eq!(
            config.vertex_merge_epsilon,
            KernelConfig::default().vertex_merge_epsilon
        );
    }

    #[test]
    fn test_ron_roundtrip_and_rejection() {
        let config = KernelConfig {
            vertex_merge_epsilon: 0.01,
            ..Default::default()
        };
        let text = config.to_ron().unwrap();
        assert_eq!(KernelConfig::from_ron(&text).unwrap(), config);
        assert!(KernelConfig::from_ron("(vertex_merge_epsilon: -1.0)").is_err());
        assert!(KernelConfig::from_ron("not ron at all").is_err());
    }
}
