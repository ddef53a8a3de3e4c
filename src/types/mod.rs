//! Core types for sample stream representation.
//!
//! This module provides the leaf data structures shared by producers and
//! readers:
//! - [`SampleType`] enumerates the binary sample types a stream can carry
//! - [`Sample`] maps Rust types onto those sample types for typed buffers
//! - [`DataDescriptor`] describes a stream's layout, post-scaling and domain rule
//! - [`Packet`] is the unit queued in a connection: [`DataPacket`] or [`EventPacket`]
//! - [`ReaderStatus`] reports the outcome of every read
//!
//! ## Usage Example
//!
//! ```rust
//! use daqflow::types::{DataDescriptor, DataPacket, SampleType, Scaling};
//! use std::sync::Arc;
//!
//! let descriptor = Arc::new(
//!     DataDescriptor::builder(SampleType::Int16)
//!         .post_scaling(Scaling::linear(SampleType::Int16, SampleType::Float64, 0.01, 0.0))
//!         .unit("V")
//!         .build()
//!         .unwrap(),
//! );
//!
//! let packet = DataPacket::from_samples(descriptor, &[100i16, 200, 300], None).unwrap();
//! assert_eq!(packet.sample_count(), 3);
//! assert_eq!(packet.raw_data().len(), 6);
//! ```

mod descriptor;
mod event;
mod packet;
mod ratio;
mod read_mode;
mod sample;
mod sample_type;
mod scaling;
mod status;

pub use descriptor::{DataDescriptor, DataDescriptorBuilder, DataRule, Dimension};
pub use event::{DATA_DESCRIPTOR_CHANGED, EventPacket, IMPLICIT_DOMAIN_GAP_DETECTED};
pub use packet::{DataPacket, Packet};
pub use ratio::Ratio;
pub(crate) use ratio::lcm;
pub use read_mode::{ReadMode, ReadTimeoutType};
pub use sample::{Sample, SampleSliceMut, Scalar, decode_samples, encode_samples};
pub use sample_type::SampleType;
pub use scaling::{Scaling, ScalingKind};
pub use status::{MultiReaderStatus, ReadStatus, ReaderStatus};

#[cfg(test)]
mod tests {
    use super::*;

    use num_complex::Complex32;
    use proptest::prelude::*;

    fn numeric_types() -> Vec<SampleType> {
        SampleType::ALL.iter().copied().filter(SampleType::is_numeric).collect()
    }

    proptest! {
        #[test]
        fn prop_sample_type_sizes_are_consistent(sample_type in prop::sample::select(numeric_types())) {
            let size = sample_type.size();
            prop_assert!(size.is_some());
            let size = size.unwrap_or(0);
            match sample_type {
                SampleType::Int8 | SampleType::UInt8 => prop_assert_eq!(size, 1),
                SampleType::Int16 | SampleType::UInt16 => prop_assert_eq!(size, 2),
                SampleType::Int32 | SampleType::UInt32 | SampleType::Float32 => prop_assert_eq!(size, 4),
                SampleType::ComplexFloat64 => prop_assert_eq!(size, 16),
                _ => prop_assert_eq!(size, 8),
            }
        }

        #[test]
        fn prop_i32_encoding_preserves_values(values in prop::collection::vec(any::<i32>(), 0..64)) {
            let bytes = encode_samples(&values);
            prop_assert_eq!(bytes.len(), values.len() * 4);
            let mut decoded = vec![0i32; values.len()];
            decode_samples(&bytes, &mut decoded);
            prop_assert_eq!(decoded, values);
        }
    }

    #[test]
    fn variable_size_types_have_no_size() {
        assert_eq!(SampleType::String.size(), None);
        assert_eq!(SampleType::Binary.size(), None);
        assert_eq!(SampleType::Struct.size(), None);
        assert!(!SampleType::Struct.is_numeric());
    }

    #[test]
    fn sample_slice_mut_enforces_type() {
        let mut bytes = encode_samples(&[1.0f32, 2.0, 3.0]);
        let mut slice = SampleSliceMut::new(&mut bytes, SampleType::Float32, 4);
        assert_eq!(slice.len(), 3);
        assert_eq!(slice.get::<f32>(1), Some(2.0));
        assert_eq!(slice.get::<f64>(1), None);
        assert!(slice.map_in_place(|v: f32| v * 10.0));
        assert!(slice.set(0, -1.0f32));
        assert!(!slice.set(5, -1.0f32));
        let mut out = [0f32; 3];
        decode_samples(slice.as_bytes(), &mut out);
        assert_eq!(out, [-1.0, 20.0, 30.0]);
    }

    #[test]
    fn complex_samples_encode_both_parts() {
        let bytes = encode_samples(&[Complex32::new(1.5, -2.0)]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(Complex32::read_le(&bytes), Complex32::new(1.5, -2.0));
    }

    #[test]
    fn event_ids_are_stable() {
        assert_eq!(EventPacket::implicit_domain_gap(3).id(), IMPLICIT_DOMAIN_GAP_DETECTED);
        assert_eq!(EventPacket::descriptor_changed(None, None).id(), DATA_DESCRIPTOR_CHANGED);
    }
}
