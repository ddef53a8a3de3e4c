//! Sample conversion lookup tables
//!
//! Conversion functions are selected once per descriptor by the
//! `(source, destination)` sample type pair and then called per packet with
//! plain byte slices.

use num_complex::{Complex32, Complex64};

use crate::types::{Sample, SampleType, Scalar, Scaling};

/// Convert `count` elements from `src` into `dst`.
pub(crate) type ConvertFn = fn(src: &[u8], dst: &mut [u8], count: usize);

/// Apply post-scaling to `count` raw elements from `src`, writing into `dst`.
pub(crate) type ScaleFn = fn(src: &[u8], dst: &mut [u8], count: usize, scaling: &Scaling);

fn copy<T: Sample>(src: &[u8], dst: &mut [u8], count: usize) {
    let len = count * T::SIZE;
    dst[..len].copy_from_slice(&src[..len]);
}

fn convert<S: Sample, D: Sample>(src: &[u8], dst: &mut [u8], count: usize) {
    for (s, d) in src.chunks_exact(S::SIZE).zip(dst.chunks_exact_mut(D::SIZE)).take(count) {
        D::from_scalar(S::read_le(s).to_scalar()).write_le(d);
    }
}

fn scale<S: Sample, D: Sample>(src: &[u8], dst: &mut [u8], count: usize, scaling: &Scaling) {
    for (s, d) in src.chunks_exact(S::SIZE).zip(dst.chunks_exact_mut(D::SIZE)).take(count) {
        let value = scaling.apply(S::read_le(s).to_scalar().as_f64());
        D::from_scalar(Scalar::Float(value)).write_le(d);
    }
}

macro_rules! select_dst {
    ($func:ident, $fn_ty:ty, $src:ty, $dst:expr) => {
        match $dst {
            SampleType::Int8 => Some($func::<$src, i8> as $fn_ty),
            SampleType::Int16 => Some($func::<$src, i16> as $fn_ty),
            SampleType::Int32 => Some($func::<$src, i32> as $fn_ty),
            SampleType::Int64 => Some($func::<$src, i64> as $fn_ty),
            SampleType::UInt8 => Some($func::<$src, u8> as $fn_ty),
            SampleType::UInt16 => Some($func::<$src, u16> as $fn_ty),
            SampleType::UInt32 => Some($func::<$src, u32> as $fn_ty),
            SampleType::UInt64 => Some($func::<$src, u64> as $fn_ty),
            SampleType::Float32 => Some($func::<$src, f32> as $fn_ty),
            SampleType::Float64 => Some($func::<$src, f64> as $fn_ty),
            SampleType::ComplexFloat32 => Some($func::<$src, Complex32> as $fn_ty),
            SampleType::ComplexFloat64 => Some($func::<$src, Complex64> as $fn_ty),
            _ => None,
        }
    };
}

macro_rules! select {
    ($func:ident, $fn_ty:ty, $src:expr, $dst:expr) => {
        match $src {
            SampleType::Int8 => select_dst!($func, $fn_ty, i8, $dst),
            SampleType::Int16 => select_dst!($func, $fn_ty, i16, $dst),
            SampleType::Int32 => select_dst!($func, $fn_ty, i32, $dst),
            SampleType::Int64 => select_dst!($func, $fn_ty, i64, $dst),
            SampleType::UInt8 => select_dst!($func, $fn_ty, u8, $dst),
            SampleType::UInt16 => select_dst!($func, $fn_ty, u16, $dst),
            SampleType::UInt32 => select_dst!($func, $fn_ty, u32, $dst),
            SampleType::UInt64 => select_dst!($func, $fn_ty, u64, $dst),
            SampleType::Float32 => select_dst!($func, $fn_ty, f32, $dst),
            SampleType::Float64 => select_dst!($func, $fn_ty, f64, $dst),
            SampleType::ComplexFloat32 => select_dst!($func, $fn_ty, Complex32, $dst),
            SampleType::ComplexFloat64 => select_dst!($func, $fn_ty, Complex64, $dst),
            _ => None,
        }
    };
}

macro_rules! select_copy {
    ($ty:expr) => {
        match $ty {
            SampleType::Int8 => Some(copy::<i8> as ConvertFn),
            SampleType::Int16 => Some(copy::<i16> as ConvertFn),
            SampleType::Int32 => Some(copy::<i32> as ConvertFn),
            SampleType::Int64 => Some(copy::<i64> as ConvertFn),
            SampleType::UInt8 => Some(copy::<u8> as ConvertFn),
            SampleType::UInt16 => Some(copy::<u16> as ConvertFn),
            SampleType::UInt32 => Some(copy::<u32> as ConvertFn),
            SampleType::UInt64 => Some(copy::<u64> as ConvertFn),
            SampleType::Float32 => Some(copy::<f32> as ConvertFn),
            SampleType::Float64 => Some(copy::<f64> as ConvertFn),
            SampleType::ComplexFloat32 => Some(copy::<Complex32> as ConvertFn),
            SampleType::ComplexFloat64 => Some(copy::<Complex64> as ConvertFn),
            _ => None,
        }
    };
}

/// Converter between two numeric sample types.
///
/// Complex and real types do not convert into each other; same-type pairs
/// resolve to a byte copy.
pub(crate) fn converter(src: SampleType, dst: SampleType) -> Option<ConvertFn> {
    if !src.is_numeric() || !dst.is_numeric() || src.is_complex() != dst.is_complex() {
        return None;
    }
    if src == dst {
        return select_copy!(src);
    }
    select!(convert, ConvertFn, src, dst)
}

/// Post-scaling converter from a real raw type to a real destination type.
pub(crate) fn scaler(src: SampleType, dst: SampleType) -> Option<ScaleFn> {
    if !src.is_real() || !dst.is_real() {
        return None;
    }
    select!(scale, ScaleFn, src, dst)
}

/// Decode the first element of `bytes` as `sample_type`.
pub(crate) fn decode_scalar(sample_type: SampleType, bytes: &[u8]) -> Option<Scalar> {
    let size = sample_type.size()?;
    if bytes.len() < size {
        return None;
    }
    let value = match sample_type {
        SampleType::Int8 => i8::read_le(bytes).to_scalar(),
        SampleType::Int16 => i16::read_le(bytes).to_scalar(),
        SampleType::Int32 => i32::read_le(bytes).to_scalar(),
        SampleType::Int64 => i64::read_le(bytes).to_scalar(),
        SampleType::UInt8 => u8::read_le(bytes).to_scalar(),
        SampleType::UInt16 => u16::read_le(bytes).to_scalar(),
        SampleType::UInt32 => u32::read_le(bytes).to_scalar(),
        SampleType::UInt64 => u64::read_le(bytes).to_scalar(),
        SampleType::Float32 => f32::read_le(bytes).to_scalar(),
        SampleType::Float64 => f64::read_le(bytes).to_scalar(),
        SampleType::ComplexFloat32 => Complex32::read_le(bytes).to_scalar(),
        SampleType::ComplexFloat64 => Complex64::read_le(bytes).to_scalar(),
        SampleType::String | SampleType::Binary | SampleType::Struct => return None,
    };
    Some(value)
}

/// Encode `value` as `sample_type` at the start of `out`. Non-numeric types
/// and undersized buffers are left untouched.
pub(crate) fn encode_scalar(sample_type: SampleType, value: Scalar, out: &mut [u8]) {
    if sample_type.size().is_none_or(|size| out.len() < size) {
        return;
    }
    match sample_type {
        SampleType::Int8 => i8::from_scalar(value).write_le(out),
        SampleType::Int16 => i16::from_scalar(value).write_le(out),
        SampleType::Int32 => i32::from_scalar(value).write_le(out),
        SampleType::Int64 => i64::from_scalar(value).write_le(out),
        SampleType::UInt8 => u8::from_scalar(value).write_le(out),
        SampleType::UInt16 => u16::from_scalar(value).write_le(out),
        SampleType::UInt32 => u32::from_scalar(value).write_le(out),
        SampleType::UInt64 => u64::from_scalar(value).write_le(out),
        SampleType::Float32 => f32::from_scalar(value).write_le(out),
        SampleType::Float64 => f64::from_scalar(value).write_le(out),
        SampleType::ComplexFloat32 => Complex32::from_scalar(value).write_le(out),
        SampleType::ComplexFloat64 => Complex64::from_scalar(value).write_le(out),
        SampleType::String | SampleType::Binary | SampleType::Struct => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{decode_samples, encode_samples};
    use proptest::prelude::*;

    #[test]
    fn widening_and_narrowing() {
        let src = encode_samples(&[1i16, -2, 300]);
        let mut dst = vec![0u8; 3 * 8];
        converter(SampleType::Int16, SampleType::Float64).unwrap()(&src, &mut dst, 3);
        let mut out = [0f64; 3];
        decode_samples(&dst, &mut out);
        assert_eq!(out, [1.0, -2.0, 300.0]);

        let src = encode_samples(&[1.9f64, -2.5]);
        let mut dst = vec![0u8; 2 * 4];
        converter(SampleType::Float64, SampleType::Int32).unwrap()(&src, &mut dst, 2);
        let mut out = [0i32; 2];
        decode_samples(&dst, &mut out);
        assert_eq!(out, [1, -2]);
    }

    #[test]
    fn complex_and_real_do_not_mix() {
        assert!(converter(SampleType::ComplexFloat32, SampleType::Float64).is_none());
        assert!(converter(SampleType::Float32, SampleType::ComplexFloat64).is_none());
        assert!(converter(SampleType::ComplexFloat32, SampleType::ComplexFloat64).is_some());
        assert!(converter(SampleType::Struct, SampleType::Float64).is_none());
        assert!(scaler(SampleType::ComplexFloat32, SampleType::Float64).is_none());
    }

    #[test]
    fn linear_post_scaling() {
        let scaling = Scaling::linear(SampleType::Int16, SampleType::Float64, 0.5, 1.0);
        let src = encode_samples(&[0i16, 2, -4]);
        let mut dst = vec![0u8; 3 * 4];
        scaler(SampleType::Int16, SampleType::Float32).unwrap()(&src, &mut dst, 3, &scaling);
        let mut out = [0f32; 3];
        decode_samples(&dst, &mut out);
        assert_eq!(out, [1.0, 2.0, -1.0]);
    }

    #[test]
    fn scalar_codec_ignores_non_numeric() {
        assert_eq!(decode_scalar(SampleType::String, &[0; 8]), None);
        assert_eq!(decode_scalar(SampleType::Int32, &[0; 2]), None);
        let mut out = [7u8; 4];
        encode_scalar(SampleType::Binary, Scalar::Int(1), &mut out);
        assert_eq!(out, [7; 4]);
    }

    proptest! {
        #[test]
        fn prop_same_type_copy_is_byte_identical(values in prop::collection::vec(any::<u32>(), 0..64)) {
            let src = encode_samples(&values);
            let mut dst = vec![0u8; src.len()];
            converter(SampleType::UInt32, SampleType::UInt32).unwrap()(&src, &mut dst, values.len());
            prop_assert_eq!(dst, src);
        }

        #[test]
        fn prop_integer_widening_preserves_value(values in prop::collection::vec(any::<i16>(), 1..64)) {
            let src = encode_samples(&values);
            let mut dst = vec![0u8; values.len() * 8];
            converter(SampleType::Int16, SampleType::Int64).unwrap()(&src, &mut dst, values.len());
            let mut out = vec![0i64; values.len()];
            decode_samples(&dst, &mut out);
            let expected: Vec<i64> = values.iter().map(|v| *v as i64).collect();
            prop_assert_eq!(out, expected);
        }

        #[test]
        fn prop_scalar_roundtrip_i64(value in any::<i64>()) {
            let mut bytes = [0u8; 8];
            encode_scalar(SampleType::Int64, Scalar::Int(value), &mut bytes);
            prop_assert_eq!(decode_scalar(SampleType::Int64, &bytes), Some(Scalar::Int(value)));
        }
    }
}
