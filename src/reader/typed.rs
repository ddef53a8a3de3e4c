//! Per-signal sample conversion engine
//!
//! A [`TypedReader`] binds a requested sample type and read mode to the live
//! descriptor of one stream (value or domain) and converts packet bytes into
//! the requested representation.

use std::sync::Arc;
use tracing::debug;

use super::convert::{ConvertFn, ScaleFn, converter, scaler};
use crate::types::{DataDescriptor, ReadMode, SampleSliceMut, SampleType, Scaling};
use crate::{Result, StreamError};

/// Post-conversion hook applied to every delivered chunk of samples.
pub type Transform = Arc<dyn Fn(&mut SampleSliceMut<'_>, &DataDescriptor) + Send + Sync>;

/// Binding state of a [`TypedReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypedReaderState {
    /// No descriptor seen yet
    Undefined,
    /// Requested type was derived from the first descriptor
    Inferred,
    /// Requested type was given explicitly and is convertible
    Defined,
    /// A descriptor made conversion impossible; terminal
    Invalid,
}

#[derive(Clone, Copy)]
enum Plan {
    Convert { f: ConvertFn, src_size: usize },
    Scale { f: ScaleFn, scaling: Scaling, src_size: usize },
    /// Raw bytes of whole (possibly dimensioned) samples
    Raw { sample_size: usize },
}

/// Converts packet buffers of one stream into a requested sample type.
pub struct TypedReader {
    requested: Option<SampleType>,
    explicit: bool,
    read_mode: ReadMode,
    state: TypedReaderState,
    descriptor: Option<Arc<DataDescriptor>>,
    plan: Option<Plan>,
    transform: Option<Transform>,
}

impl std::fmt::Debug for TypedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedReader")
            .field("requested", &self.requested)
            .field("read_mode", &self.read_mode)
            .field("state", &self.state)
            .field("has_transform", &self.transform.is_some())
            .finish()
    }
}

impl TypedReader {
    /// Create a reader. `requested == None` infers the type from the first descriptor.
    pub fn new(requested: Option<SampleType>, read_mode: ReadMode) -> Self {
        Self {
            requested,
            explicit: requested.is_some(),
            read_mode,
            state: TypedReaderState::Undefined,
            descriptor: None,
            plan: None,
            transform: None,
        }
    }

    pub fn state(&self) -> TypedReaderState {
        self.state
    }

    pub fn is_valid(&self) -> bool {
        self.state != TypedReaderState::Invalid
    }

    /// Requested type, once explicit or inferred.
    pub fn read_type(&self) -> Option<SampleType> {
        self.requested
    }

    pub fn read_mode(&self) -> ReadMode {
        self.read_mode
    }

    pub fn descriptor(&self) -> Option<&Arc<DataDescriptor>> {
        self.descriptor.as_ref()
    }

    /// Bytes written per delivered sample, once a descriptor is bound.
    pub fn sample_size(&self) -> Option<usize> {
        match self.plan? {
            Plan::Raw { sample_size } => Some(sample_size),
            Plan::Convert { .. } | Plan::Scale { .. } => self.requested?.size(),
        }
    }

    pub fn set_transform(&mut self, transform: Option<Transform>) {
        self.transform = transform;
    }

    pub fn invalidate(&mut self) {
        self.state = TypedReaderState::Invalid;
        self.plan = None;
    }

    /// Type a reader would infer for `descriptor` in `read_mode`.
    pub fn inferred_type(descriptor: &DataDescriptor, read_mode: ReadMode) -> SampleType {
        match (read_mode, &descriptor.post_scaling) {
            (ReadMode::Scaled, Some(scaling)) => scaling.input_type,
            _ => descriptor.sample_type,
        }
    }

    /// Bind to the first descriptor seen, inferring the requested type if it
    /// was left unspecified. Returns whether the reader is valid.
    pub fn infer_from_descriptor(&mut self, descriptor: &Arc<DataDescriptor>, read_mode: ReadMode) -> bool {
        if self.state == TypedReaderState::Invalid {
            return false;
        }
        self.read_mode = read_mode;
        if self.requested.is_none() {
            self.requested = Some(Self::inferred_type(descriptor, read_mode));
        }
        self.bind(descriptor)
    }

    /// Re-validate against a changed descriptor. Returns `false`, leaving the
    /// reader permanently invalid, if the requested type can no longer be
    /// produced.
    pub fn handle_descriptor_changed(&mut self, descriptor: &Arc<DataDescriptor>, read_mode: ReadMode) -> bool {
        match self.state {
            TypedReaderState::Invalid => false,
            TypedReaderState::Undefined => self.infer_from_descriptor(descriptor, read_mode),
            TypedReaderState::Inferred | TypedReaderState::Defined => {
                self.read_mode = read_mode;
                if !self.explicit {
                    let inferred = Self::inferred_type(descriptor, read_mode);
                    if self.requested != Some(inferred) {
                        debug!(
                            previous = ?self.requested,
                            inferred = %inferred,
                            "Inferred read type changed, invalidating reader"
                        );
                        self.invalidate();
                        return false;
                    }
                }
                self.bind(descriptor)
            }
        }
    }

    fn bind(&mut self, descriptor: &Arc<DataDescriptor>) -> bool {
        let Some(requested) = self.requested else {
            return false;
        };
        match plan_for(descriptor, requested, self.read_mode) {
            Ok(plan) => {
                self.plan = Some(plan);
                self.descriptor = Some(Arc::clone(descriptor));
                self.state = if self.explicit {
                    TypedReaderState::Defined
                } else {
                    TypedReaderState::Inferred
                };
                true
            }
            Err(reason) => {
                debug!(%requested, source = %descriptor.sample_type, %reason, "Descriptor not convertible");
                self.descriptor = Some(Arc::clone(descriptor));
                self.invalidate();
                false
            }
        }
    }

    /// Convert `count` samples starting at sample `src_offset` of `src` into `dst`.
    ///
    /// Fails with [`StreamError::InvalidState`] before a descriptor has been
    /// bound or once the reader is invalid; `dst` is not touched in that case.
    pub fn read_data(&self, src: &[u8], src_offset: usize, dst: &mut [u8], count: usize) -> Result<()> {
        let (Some(plan), Some(descriptor)) = (self.plan, self.descriptor.as_ref()) else {
            return Err(StreamError::invalid_state(match self.state {
                TypedReaderState::Invalid => "reader is invalid",
                _ => "no descriptor has been seen yet",
            }));
        };
        let Some(dst_size) = self.sample_size() else {
            return Err(StreamError::invalid_state("read type has no fixed size"));
        };

        let src_size = match plan {
            Plan::Convert { src_size, .. } | Plan::Scale { src_size, .. } => src_size,
            Plan::Raw { sample_size } => sample_size,
        };
        let start = src_offset * src_size;
        let end = start + count * src_size;
        let src = src.get(start..end).ok_or_else(|| {
            StreamError::invalid_parameter(format!(
                "source holds {} bytes, {} needed",
                src.len(),
                end
            ))
        })?;
        let dst_len = count * dst_size;
        if dst.len() < dst_len {
            return Err(StreamError::invalid_parameter(format!(
                "destination holds {} bytes, {} needed",
                dst.len(),
                dst_len
            )));
        }
        let dst = &mut dst[..dst_len];

        match plan {
            Plan::Convert { f, .. } => f(src, dst, count),
            Plan::Scale { f, scaling, .. } => f(src, dst, count, &scaling),
            Plan::Raw { .. } => dst.copy_from_slice(src),
        }

        if let (Some(transform), Some(requested)) = (&self.transform, self.requested) {
            let element_size = requested.size().unwrap_or(dst_size);
            let mut view = SampleSliceMut::new(dst, requested, element_size);
            transform(&mut view, descriptor);
        }
        Ok(())
    }
}

fn plan_for(descriptor: &DataDescriptor, requested: SampleType, read_mode: ReadMode) -> std::result::Result<Plan, String> {
    let source = descriptor.sample_type;
    let raw_size = descriptor
        .raw_sample_size()
        .ok_or_else(|| format!("{} samples have no fixed size", source))?;
    if !source.is_numeric() {
        return Err(format!("{} samples cannot be converted", source));
    }

    if read_mode == ReadMode::RawValue {
        if requested != source {
            return Err(format!("raw reads require {}, requested {}", source, requested));
        }
        return Ok(Plan::Raw { sample_size: raw_size });
    }

    if !descriptor.dimensions.is_empty() {
        return Err("dimensioned samples can only be read raw".to_string());
    }
    if read_mode == ReadMode::Unscaled && requested == source {
        return Ok(Plan::Raw { sample_size: raw_size });
    }

    match (read_mode, descriptor.post_scaling) {
        (ReadMode::Scaled, Some(scaling)) => scaler(source, requested)
            .map(|f| Plan::Scale { f, scaling, src_size: raw_size })
            .ok_or_else(|| format!("cannot scale {} into {}", source, requested)),
        _ => converter(source, requested)
            .map(|f| Plan::Convert { f, src_size: raw_size })
            .ok_or_else(|| format!("cannot convert {} into {}", source, requested)),
    }
}
