//! Built-in sample sources
//!
//! - [`GeneratorSource`]: synthetic sine, ramp and counter waveforms
//! - [`ReplaySource`]: pre-recorded blocks, optionally paced
//! - [`StreamSource`]: any `futures` stream of blocks

mod generator;
mod replay;
mod stream;

pub use generator::{GeneratorSource, Waveform};
pub use replay::ReplaySource;
pub use stream::StreamSource;
