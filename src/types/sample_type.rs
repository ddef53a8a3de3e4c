//! Sample type definitions

use serde::{Deserialize, Serialize};

/// Binary sample type of a signal stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum SampleType {
    /// 8-bit signed integer
    Int8,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 8-bit unsigned integer
    UInt8,
    /// 16-bit unsigned integer
    UInt16,
    /// 32-bit unsigned integer
    UInt32,
    /// 64-bit unsigned integer
    UInt64,
    /// 32-bit IEEE float
    Float32,
    /// 64-bit IEEE float
    Float64,
    /// Pair of 32-bit floats (real, imaginary)
    ComplexFloat32,
    /// Pair of 64-bit floats (real, imaginary)
    ComplexFloat64,
    /// Variable-length text
    String,
    /// Opaque binary blob
    Binary,
    /// Composite of named fields
    Struct,
}

impl SampleType {
    /// All sample types, in declaration order.
    pub const ALL: [SampleType; 15] = [
        SampleType::Int8,
        SampleType::Int16,
        SampleType::Int32,
        SampleType::Int64,
        SampleType::UInt8,
        SampleType::UInt16,
        SampleType::UInt32,
        SampleType::UInt64,
        SampleType::Float32,
        SampleType::Float64,
        SampleType::ComplexFloat32,
        SampleType::ComplexFloat64,
        SampleType::String,
        SampleType::Binary,
        SampleType::Struct,
    ];

    /// Returns the size in bytes of one sample, or `None` for variable-size types.
    pub const fn size(&self) -> Option<usize> {
        match self {
            SampleType::Int8 | SampleType::UInt8 => Some(1),
            SampleType::Int16 | SampleType::UInt16 => Some(2),
            SampleType::Int32 | SampleType::UInt32 | SampleType::Float32 => Some(4),
            SampleType::Int64 | SampleType::UInt64 | SampleType::Float64 => Some(8),
            SampleType::ComplexFloat32 => Some(8),
            SampleType::ComplexFloat64 => Some(16),
            SampleType::String | SampleType::Binary | SampleType::Struct => None,
        }
    }

    /// Real-valued integer or float type.
    pub const fn is_real(&self) -> bool {
        matches!(
            self,
            SampleType::Int8
                | SampleType::Int16
                | SampleType::Int32
                | SampleType::Int64
                | SampleType::UInt8
                | SampleType::UInt16
                | SampleType::UInt32
                | SampleType::UInt64
                | SampleType::Float32
                | SampleType::Float64
        )
    }

    pub const fn is_complex(&self) -> bool {
        matches!(self, SampleType::ComplexFloat32 | SampleType::ComplexFloat64)
    }

    /// Types the typed reader can convert element-wise.
    pub const fn is_numeric(&self) -> bool {
        self.is_real() || self.is_complex()
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, SampleType::Float32 | SampleType::Float64)
    }
}

impl std::fmt::Display for SampleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
