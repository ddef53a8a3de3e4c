//! Source adapter for `futures` streams

use futures::{Stream, StreamExt};
use tracing::debug;

use crate::Result;
use crate::provider::{SampleBlock, SampleSource};
use crate::types::Sample;

/// Feeds the driver from any stream of sample blocks, e.g. a device SDK
/// callback bridged through a channel.
pub struct StreamSource<St> {
    stream: St,
    sample_rate: f64,
}

impl<St> StreamSource<St> {
    pub fn new(stream: St, sample_rate: f64) -> Self {
        Self { stream, sample_rate }
    }

    pub fn into_inner(self) -> St {
        self.stream
    }
}

#[async_trait::async_trait]
impl<St, T> SampleSource for StreamSource<St>
where
    St: Stream<Item = Result<SampleBlock<T>>> + Send + Unpin + 'static,
    T: Sample,
{
    type Sample = T;

    async fn next_block(&mut self) -> Result<Option<SampleBlock<T>>> {
        let next = self.stream.next().await.transpose();
        if matches!(next, Ok(None)) {
            debug!("Wrapped stream ended");
        }
        next
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}
