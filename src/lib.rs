//! Typed packet streaming and sample readers for data-acquisition signals.
//!
//! Daqflow moves time-stamped sample packets from producers to readers and
//! turns them into strongly typed, optionally rescaled, optionally
//! block-windowed views.
//!
//! # Features
//!
//! - **Packet queues**: lock-light FIFO [`Connection`]s fed by [`Signal`]s
//! - **Typed readers**: stream, block (with overlap) and multi-signal readers
//!   with in-band descriptor changes
//! - **Bounded memory**: a circular [`PacketRingAllocator`] with FIFO reclaim
//! - **Producers**: async [`Driver`] tasks pulling from [`SampleSource`]s
//!
//! # Quick Start
//!
//! ```rust
//! use daqflow::reader::BlockReader;
//! use daqflow::types::{DataDescriptor, DataPacket, SampleType};
//! use daqflow::Signal;
//! use std::time::Duration;
//!
//! let signal = Signal::new(DataDescriptor::builder(SampleType::Float32).build()?)?;
//! let reader = BlockReader::new(&signal, 4, 50)?;
//!
//! let samples: Vec<f32> = (0..8).map(|i| i as f32).collect();
//! signal.send_packet(DataPacket::from_samples(signal.descriptor(), &samples, None)?)?;
//!
//! let mut blocks = [0f32; 12];
//! let status = reader.read(&mut blocks, Duration::ZERO)?;
//! assert_eq!(status.read_count, 3);
//! assert_eq!(&blocks[4..8], &[2.0, 3.0, 4.0, 5.0]);
//! # Ok::<(), daqflow::StreamError>(())
//! ```
//!
//! ## Example (generated source)
//!
//! ```rust,no_run
//! use daqflow::providers::{GeneratorSource, Waveform};
//! use daqflow::reader::StreamReader;
//! use daqflow::types::{DataDescriptor, Ratio, SampleType};
//! use daqflow::{Driver, PacketRingAllocator, Signal};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> daqflow::Result<()> {
//!     let time = Signal::new(
//!         DataDescriptor::builder(SampleType::Int64)
//!             .linear_rule(1, 0)
//!             .tick_resolution(Ratio::per(1000).unwrap())
//!             .unit("s")
//!             .build()?,
//!     )?;
//!     let signal = Signal::with_domain(DataDescriptor::builder(SampleType::Float64).build()?, time)?;
//!     let reader = StreamReader::new(&signal);
//!
//!     let source = GeneratorSource::new(Waveform::Sine { frequency: 5.0, amplitude: 1.0 }, 1000.0, 100)?.paced(true);
//!     let allocator = PacketRingAllocator::for_descriptor(&signal.descriptor())?;
//!     let driver = Driver::spawn(source, signal, allocator);
//!
//!     let (values, status) = reader.read_async::<f64>(500, Duration::from_secs(2)).await?;
//!     println!("read {} samples starting at tick {:?}", values.len(), status.offset);
//!
//!     driver.cancel();
//!     driver.join().await?;
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Packet transport and memory
pub mod allocator;
pub mod connection;
pub mod reader;

// Producer side
pub mod driver;
pub mod provider;
pub mod providers;

// Ambient
pub mod config;
pub mod logging;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use allocator::{AllocationStatus, PacketRingAllocator};
pub use config::DaqConfig;
pub use connection::{Connection, PacketListener, Signal};
pub use driver::{Driver, DriverHandle, DriverStats};
pub use provider::{SampleBlock, SampleSource};
pub use reader::{BlockReader, MultiReader, PacketReader, Reader, StreamReader};
