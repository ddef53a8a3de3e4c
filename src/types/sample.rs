//! Typed sample encoding and the numeric value used for conversions

use num_complex::{Complex32, Complex64};

use super::SampleType;

/// Intermediate value every numeric sample decodes into before being
/// re-encoded as another sample type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int(i64),
    UInt(u64),
    Float(f64),
    Complex(Complex64),
}

impl Scalar {
    /// Real part as `f64`.
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Int(v) => v as f64,
            Scalar::UInt(v) => v as f64,
            Scalar::Float(v) => v,
            Scalar::Complex(c) => c.re,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Scalar::Int(v) => v,
            Scalar::UInt(v) => v as i64,
            Scalar::Float(v) => v as i64,
            Scalar::Complex(c) => c.re as i64,
        }
    }

    pub fn as_u64(self) -> u64 {
        match self {
            Scalar::Int(v) => v as u64,
            Scalar::UInt(v) => v,
            Scalar::Float(v) => v as u64,
            Scalar::Complex(c) => c.re as u64,
        }
    }

    pub fn as_complex(self) -> Complex64 {
        match self {
            Scalar::Complex(c) => c,
            other => Complex64::new(other.as_f64(), 0.0),
        }
    }
}

/// Trait for Rust types that can be stored in and read from sample buffers.
///
/// Buffers are little-endian and unaligned; implementations encode and decode
/// a single element from the start of the given slice.
pub trait Sample: Copy + Default + Send + Sync + 'static {
    /// Matching runtime sample type.
    const SAMPLE_TYPE: SampleType;

    /// Size in bytes of one encoded element.
    const SIZE: usize;

    /// Decode one element. `bytes` must hold at least [`Self::SIZE`] bytes.
    fn read_le(bytes: &[u8]) -> Self;

    /// Encode one element. `out` must hold at least [`Self::SIZE`] bytes.
    fn write_le(self, out: &mut [u8]);

    fn to_scalar(self) -> Scalar;

    fn from_scalar(value: Scalar) -> Self;
}

macro_rules! impl_int_sample {
    ($ty:ty, $variant:ident, $scalar:ident, $conv:ident) => {
        impl Sample for $ty {
            const SAMPLE_TYPE: SampleType = SampleType::$variant;
            const SIZE: usize = std::mem::size_of::<$ty>();

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..Self::SIZE]);
                <$ty>::from_le_bytes(raw)
            }

            fn write_le(self, out: &mut [u8]) {
                out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
            }

            fn to_scalar(self) -> Scalar {
                Scalar::$scalar(self as _)
            }

            fn from_scalar(value: Scalar) -> Self {
                value.$conv() as $ty
            }
        }
    };
}

impl_int_sample!(i8, Int8, Int, as_i64);
impl_int_sample!(i16, Int16, Int, as_i64);
impl_int_sample!(i32, Int32, Int, as_i64);
impl_int_sample!(i64, Int64, Int, as_i64);
impl_int_sample!(u8, UInt8, UInt, as_u64);
impl_int_sample!(u16, UInt16, UInt, as_u64);
impl_int_sample!(u32, UInt32, UInt, as_u64);
impl_int_sample!(u64, UInt64, UInt, as_u64);

impl Sample for f32 {
    const SAMPLE_TYPE: SampleType = SampleType::Float32;
    const SIZE: usize = 4;

    fn read_le(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn write_le(self, out: &mut [u8]) {
        out[..4].copy_from_slice(&self.to_le_bytes());
    }

    fn to_scalar(self) -> Scalar {
        Scalar::Float(self as f64)
    }

    fn from_scalar(value: Scalar) -> Self {
        value.as_f64() as f32
    }
}

impl Sample for f64 {
    const SAMPLE_TYPE: SampleType = SampleType::Float64;
    const SIZE: usize = 8;

    fn read_le(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        f64::from_le_bytes(raw)
    }

    fn write_le(self, out: &mut [u8]) {
        out[..8].copy_from_slice(&self.to_le_bytes());
    }

    fn to_scalar(self) -> Scalar {
        Scalar::Float(self)
    }

    fn from_scalar(value: Scalar) -> Self {
        value.as_f64()
    }
}

impl Sample for Complex32 {
    const SAMPLE_TYPE: SampleType = SampleType::ComplexFloat32;
    const SIZE: usize = 8;

    fn read_le(bytes: &[u8]) -> Self {
        Complex32::new(f32::read_le(&bytes[..4]), f32::read_le(&bytes[4..8]))
    }

    fn write_le(self, out: &mut [u8]) {
        self.re.write_le(&mut out[..4]);
        self.im.write_le(&mut out[4..8]);
    }

    fn to_scalar(self) -> Scalar {
        Scalar::Complex(Complex64::new(self.re as f64, self.im as f64))
    }

    fn from_scalar(value: Scalar) -> Self {
        let c = value.as_complex();
        Complex32::new(c.re as f32, c.im as f32)
    }
}

impl Sample for Complex64 {
    const SAMPLE_TYPE: SampleType = SampleType::ComplexFloat64;
    const SIZE: usize = 16;

    fn read_le(bytes: &[u8]) -> Self {
        Complex64::new(f64::read_le(&bytes[..8]), f64::read_le(&bytes[8..16]))
    }

    fn write_le(self, out: &mut [u8]) {
        self.re.write_le(&mut out[..8]);
        self.im.write_le(&mut out[8..16]);
    }

    fn to_scalar(self) -> Scalar {
        Scalar::Complex(self)
    }

    fn from_scalar(value: Scalar) -> Self {
        value.as_complex()
    }
}

/// Encode a slice of samples into a freshly allocated little-endian buffer.
pub fn encode_samples<T: Sample>(samples: &[T]) -> Vec<u8> {
    let mut out = vec![0u8; samples.len() * T::SIZE];
    for (value, chunk) in samples.iter().zip(out.chunks_exact_mut(T::SIZE)) {
        value.write_le(chunk);
    }
    out
}

/// Decode `dest.len()` samples from a little-endian buffer.
pub fn decode_samples<T: Sample>(bytes: &[u8], dest: &mut [T]) {
    for (slot, chunk) in dest.iter_mut().zip(bytes.chunks_exact(T::SIZE)) {
        *slot = T::read_le(chunk);
    }
}

/// Mutable, type-tagged view over converted sample bytes, handed to
/// reader transform hooks.
pub struct SampleSliceMut<'a> {
    bytes: &'a mut [u8],
    sample_type: SampleType,
    element_size: usize,
}

impl<'a> SampleSliceMut<'a> {
    pub(crate) fn new(bytes: &'a mut [u8], sample_type: SampleType, element_size: usize) -> Self {
        Self { bytes, sample_type, element_size }
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / self.element_size.max(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read element `index` as `T`. Returns `None` if `T` does not match the
    /// slice's sample type or the index is out of range.
    pub fn get<T: Sample>(&self, index: usize) -> Option<T> {
        if T::SAMPLE_TYPE != self.sample_type || index >= self.len() {
            return None;
        }
        let start = index * T::SIZE;
        Some(T::read_le(&self.bytes[start..start + T::SIZE]))
    }

    /// Overwrite element `index`. Returns `false` on type or range mismatch.
    pub fn set<T: Sample>(&mut self, index: usize, value: T) -> bool {
        if T::SAMPLE_TYPE != self.sample_type || index >= self.len() {
            return false;
        }
        let start = index * T::SIZE;
        value.write_le(&mut self.bytes[start..start + T::SIZE]);
        true
    }

    /// Apply `f` to every element of type `T` in place.
    pub fn map_in_place<T: Sample>(&mut self, mut f: impl FnMut(T) -> T) -> bool {
        if T::SAMPLE_TYPE != self.sample_type {
            return false;
        }
        for chunk in self.bytes.chunks_exact_mut(T::SIZE) {
            f(T::read_le(chunk)).write_le(chunk);
        }
        true
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }
}
