//! Data descriptors describing the binary layout of a sample stream

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Ratio, SampleType, Scaling};
use crate::{Result, StreamError};

/// How sample values are produced for a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataRule {
    /// Every sample is stored in the packet buffer
    #[default]
    Explicit,
    /// Samples are implicit: `value[i] = packet_offset + start + i * delta`
    Linear { delta: i64, start: i64 },
}

impl DataRule {
    pub fn is_explicit(&self) -> bool {
        matches!(self, DataRule::Explicit)
    }
}

/// One axis of a block or matrix sample layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Dimension {
    pub name: String,
    pub size: usize,
}

/// Immutable description of a sample stream.
///
/// Descriptors are compared by value; a change of any field is announced to
/// readers through a descriptor-changed event packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct DataDescriptor {
    /// Human-readable stream name
    #[serde(default)]
    pub name: String,
    /// Raw sample type stored in packet buffers
    pub sample_type: SampleType,
    /// Optional rule mapping raw samples to logical values
    #[serde(default)]
    pub post_scaling: Option<Scaling>,
    /// Explicit or implicit (linear) value rule
    #[serde(default)]
    pub rule: DataRule,
    /// Seconds per tick, for domain streams
    #[serde(default)]
    pub tick_resolution: Option<Ratio>,
    /// ISO-8601 timestamp that tick zero corresponds to
    #[serde(default)]
    pub origin: Option<String>,
    /// Unit symbol, e.g. "V" or "s"
    #[serde(default)]
    pub unit: Option<String>,
    /// Block/matrix dimensions; empty for scalar samples
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
}

impl DataDescriptor {
    /// Start building a descriptor for the given raw sample type.
    pub fn builder(sample_type: SampleType) -> DataDescriptorBuilder {
        DataDescriptorBuilder::new(sample_type)
    }

    /// Check the descriptor's invariants.
    pub fn validate(&self) -> Result<()> {
        if let Some(scaling) = &self.post_scaling {
            if scaling.input_type != self.sample_type {
                return Err(StreamError::invalid_descriptor(format!(
                    "post-scaling input type {} does not match sample type {}",
                    scaling.input_type, self.sample_type
                )));
            }
            if !scaling.input_type.is_real() || !scaling.output_type.is_real() {
                return Err(StreamError::invalid_descriptor(format!(
                    "post-scaling requires real numeric types, got {} -> {}",
                    scaling.input_type, scaling.output_type
                )));
            }
        }

        if let Some(resolution) = &self.tick_resolution {
            if !resolution.is_positive() {
                return Err(StreamError::invalid_descriptor(format!(
                    "tick resolution must be positive, got {}",
                    resolution
                )));
            }
        }

        if let DataRule::Linear { delta, .. } = self.rule {
            if delta == 0 {
                return Err(StreamError::invalid_descriptor("linear rule delta must not be zero"));
            }
            if !self.sample_type.is_real() {
                return Err(StreamError::invalid_descriptor(format!(
                    "linear rule requires a real sample type, got {}",
                    self.sample_type
                )));
            }
        }

        if let Some(dim) = self.dimensions.iter().find(|d| d.size == 0) {
            return Err(StreamError::invalid_descriptor(format!(
                "dimension '{}' has size 0",
                dim.name
            )));
        }

        if let Some(origin) = &self.origin {
            if DateTime::parse_from_rfc3339(origin).is_err() {
                return Err(StreamError::invalid_descriptor(format!(
                    "origin '{}' is not an ISO-8601 timestamp",
                    origin
                )));
            }
        }

        Ok(())
    }

    /// Number of scalar elements per sample (product of dimension sizes).
    pub fn elements_per_sample(&self) -> usize {
        self.dimensions.iter().map(|d| d.size).product::<usize>().max(1)
    }

    /// Size in bytes of one raw sample, or `None` for variable-size types.
    pub fn raw_sample_size(&self) -> Option<usize> {
        self.sample_type.size().map(|s| s * self.elements_per_sample())
    }

    /// Logical value type: the post-scaling output type if present.
    pub fn value_type(&self) -> SampleType {
        self.post_scaling.map(|s| s.output_type).unwrap_or(self.sample_type)
    }

    /// Parsed origin timestamp, if any.
    pub fn origin_epoch(&self) -> Option<DateTime<Utc>> {
        self.origin
            .as_deref()
            .and_then(|o| DateTime::parse_from_rfc3339(o).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    /// Samples per second for a linear-rule domain stream.
    pub fn sample_rate(&self) -> Option<f64> {
        match (self.rule, self.tick_resolution) {
            (DataRule::Linear { delta, .. }, Some(res)) => Some(1.0 / (delta as f64 * res.as_f64())),
            _ => None,
        }
    }
}

/// Builder for [`DataDescriptor`].
#[derive(Debug, Clone)]
pub struct DataDescriptorBuilder {
    descriptor: DataDescriptor,
}

impl DataDescriptorBuilder {
    pub fn new(sample_type: SampleType) -> Self {
        Self {
            descriptor: DataDescriptor {
                name: String::new(),
                sample_type,
                post_scaling: None,
                rule: DataRule::Explicit,
                tick_resolution: None,
                origin: None,
                unit: None,
                dimensions: Vec::new(),
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.descriptor.name = name.into();
        self
    }

    pub fn post_scaling(mut self, scaling: Scaling) -> Self {
        self.descriptor.post_scaling = Some(scaling);
        self
    }

    pub fn rule(mut self, rule: DataRule) -> Self {
        self.descriptor.rule = rule;
        self
    }

    /// Shorthand for an implicit linear rule.
    pub fn linear_rule(self, delta: i64, start: i64) -> Self {
        self.rule(DataRule::Linear { delta, start })
    }

    pub fn tick_resolution(mut self, resolution: Ratio) -> Self {
        self.descriptor.tick_resolution = Some(resolution);
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.descriptor.origin = Some(origin.into());
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.descriptor.unit = Some(unit.into());
        self
    }

    pub fn dimension(mut self, name: impl Into<String>, size: usize) -> Self {
        self.descriptor.dimensions.push(Dimension { name: name.into(), size });
        self
    }

    /// Validate and produce the descriptor.
    pub fn build(self) -> Result<DataDescriptor> {
        self.descriptor.validate()?;
        Ok(self.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_scaling_input_must_match_sample_type() {
        let err = DataDescriptor::builder(SampleType::Int32)
            .post_scaling(Scaling::linear(SampleType::Int16, SampleType::Float64, 0.5, 0.0))
            .build()
            .unwrap_err();
        assert!(matches!(err, StreamError::InvalidDescriptor { .. }));

        let ok = DataDescriptor::builder(SampleType::Int16)
            .post_scaling(Scaling::linear(SampleType::Int16, SampleType::Float64, 0.5, 0.0))
            .build()
            .unwrap();
        assert_eq!(ok.value_type(), SampleType::Float64);
    }

    #[test]
    fn descriptors_compare_by_value() {
        let a = DataDescriptor::builder(SampleType::Float64).name("ai0").unit("V").build().unwrap();
        let b = DataDescriptor::builder(SampleType::Float64).name("ai0").unit("V").build().unwrap();
        let c = DataDescriptor::builder(SampleType::Float32).name("ai0").unit("V").build().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn linear_domain_sample_rate() {
        let domain = DataDescriptor::builder(SampleType::Int64)
            .linear_rule(1, 0)
            .tick_resolution(Ratio::per(1000).unwrap())
            .origin("1970-01-01T00:00:00Z")
            .build()
            .unwrap();
        assert_eq!(domain.sample_rate(), Some(1000.0));
        assert!(domain.origin_epoch().is_some());
    }

    #[test]
    fn rejects_bad_origin_and_zero_dimension() {
        assert!(DataDescriptor::builder(SampleType::Int64).origin("yesterday").build().is_err());
        assert!(DataDescriptor::builder(SampleType::Float64).dimension("x", 0).build().is_err());
    }

    #[test]
    fn dimensioned_raw_size() {
        let desc = DataDescriptor::builder(SampleType::Float32)
            .dimension("x", 4)
            .dimension("y", 2)
            .build()
            .unwrap();
        assert_eq!(desc.raw_sample_size(), Some(32));
    }

    #[test]
    fn yaml_roundtrip_keeps_rule() {
        let desc = DataDescriptor::builder(SampleType::Int64)
            .linear_rule(10, 5)
            .tick_resolution(Ratio::per(1_000_000).unwrap())
            .build()
            .unwrap();
        let yaml = serde_yaml_ng::to_string(&desc).unwrap();
        let back: DataDescriptor = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(desc, back);
    }
}
