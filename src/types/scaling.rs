//! Post-scaling rules attached to descriptors

use serde::{Deserialize, Serialize};

use super::SampleType;

/// Kind of post-scaling applied to raw samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalingKind {
    /// `value = raw * scale + offset`
    Linear { scale: f64, offset: f64 },
}

/// Rule converting a raw on-wire sample type to a logical value type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Scaling {
    /// Raw sample type stored in packet buffers
    pub input_type: SampleType,
    /// Logical value type produced by the rule
    pub output_type: SampleType,
    /// Scaling rule and parameters
    pub kind: ScalingKind,
}

impl Scaling {
    /// Linear scaling `raw * scale + offset`.
    pub fn linear(
        input_type: SampleType,
        output_type: SampleType,
        scale: f64,
        offset: f64,
    ) -> Self {
        Self { input_type, output_type, kind: ScalingKind::Linear { scale, offset } }
    }

    /// Apply the rule to one raw value.
    pub fn apply(&self, raw: f64) -> f64 {
        match self.kind {
            ScalingKind::Linear { scale, offset } => raw * scale + offset,
        }
    }
}
