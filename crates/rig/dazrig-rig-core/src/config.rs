//! Build configuration passed explicitly into every solver and evaluator call.

use serde::{Deserialize, Serialize};

/// DAZ figure generation; selects roll tables and bone naming.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RigGeneration {
    Genesis,
    Genesis2,
    Genesis3,
    Genesis8,
}

impl RigGeneration {
    /// Detect the generation from a figure name or rig label.
    pub fn detect(label: &str) -> Option<Self> {
        let lower = label.to_ascii_lowercase().replace([' ', '_'], "");
        if !lower.starts_with("genesis") {
            return None;
        }
        let rest = &lower["genesis".len()..];
        Some(if rest.starts_with('8') || rest.starts_with('9') {
            RigGeneration::Genesis8
        } else if rest.starts_with('3') {
            RigGeneration::Genesis3
        } else if rest.starts_with('2') {
            RigGeneration::Genesis2
        } else {
            RigGeneration::Genesis
        })
    }

    /// Genesis 3 and later split limbs into bend/twist bones.
    pub fn is_bend_twist(&self) -> bool {
        matches!(self, RigGeneration::Genesis3 | RigGeneration::Genesis8)
    }
}

/// Settings for one build. Loadable from JSON; missing keys take defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildContext {
    /// Engine units per DAZ centimetre.
    pub scale: f64,
    /// Rotate DAZ's Y-up frame to the engine's Z-up frame.
    pub zup: bool,
    /// Prefer reference planes over the roll table when available.
    pub use_planes: bool,
    /// Bones shorter than this get a nominal tail offset.
    pub min_bone_length: f64,
    /// Maximum driver expression length accepted by the host.
    pub expression_budget: usize,
    /// 0 quiet, 1 normal, 2 and up report every skipped reference at info level.
    pub verbosity: u8,
    pub create_drivers: bool,
    /// Overrides generation detection for every figure.
    pub rig_generation: Option<RigGeneration>,
}

impl Default for BuildContext {
    fn default() -> Self {
        Self {
            scale: 0.1,
            zup: true,
            use_planes: true,
            min_bone_length: 1e-4,
            expression_budget: 255,
            verbosity: 1,
            create_drivers: true,
            rig_generation: None,
        }
    }
}

impl BuildContext {
    /// Log level for non-fatal skips (missing optional bones, unresolved urls).
    pub fn skip_level(&self) -> log::Level {
        if self.verbosity >= 2 {
            log::Level::Info
        } else {
            log::Level::Debug
        }
    }

    pub fn generation_for(&self, name: &str, rig: Option<&str>) -> Option<RigGeneration> {
        self.rig_generation
            .or_else(|| rig.and_then(RigGeneration::detect))
            .or_else(|| RigGeneration::detect(name))
    }
}
