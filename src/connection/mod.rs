//! Packet queues between signals and readers.
//!
//! A [`Connection`] is the ordered FIFO of [`Packet`]s flowing from one
//! [`Signal`] to one reader input. Enqueueing never blocks; payload memory,
//! and with it backpressure, is bounded by the packet allocator instead.
//!
//! # Architecture
//!
//! ```text
//! producer ──► Signal::send_packet ──► Connection (VecDeque<Packet>) ──► reader
//!                                         │
//!                                         └──► PacketListener::packet_received
//! ```
//!
//! Readers register themselves as the connection's [`PacketListener`] so
//! blocking reads wake up as soon as a packet arrives.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tracing::trace;

use crate::types::Packet;

mod signal;

pub use signal::Signal;

/// Callback invoked after a packet has been enqueued.
pub trait PacketListener: Send + Sync {
    fn packet_received(&self);
}

#[derive(Default)]
struct ConnectionInner {
    queue: Mutex<VecDeque<Packet>>,
    listener: Mutex<Option<Weak<dyn PacketListener>>>,
}

/// Shared handle to a signal-to-input packet queue.
#[derive(Clone, Default)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a packet and notify the listener. Never blocks on readers.
    pub fn enqueue(&self, packet: impl Into<Packet>) {
        let packet = packet.into();
        trace!(samples = packet.sample_count(), event = packet.as_event().is_some(), "Enqueue packet");
        self.inner.queue.lock().push_back(packet);
        self.notify();
    }

    /// Append several packets with a single notification.
    pub fn enqueue_multiple<I>(&self, packets: I)
    where
        I: IntoIterator,
        I::Item: Into<Packet>,
    {
        {
            let mut queue = self.inner.queue.lock();
            queue.extend(packets.into_iter().map(Into::into));
        }
        self.notify();
    }

    /// Pop the oldest packet.
    pub fn dequeue(&self) -> Option<Packet> {
        self.inner.queue.lock().pop_front()
    }

    /// Oldest packet without removing it.
    pub fn peek(&self) -> Option<Packet> {
        self.inner.queue.lock().front().cloned()
    }

    /// Sum of data packet sample counts from the front of the queue.
    ///
    /// Unless `across_descriptor_changes` is set, counting stops at the first
    /// event packet.
    pub fn available_samples(&self, across_descriptor_changes: bool) -> usize {
        let queue = self.inner.queue.lock();
        let mut total = 0;
        for packet in queue.iter() {
            match packet {
                Packet::Data(data) => total += data.sample_count(),
                Packet::Event(_) if !across_descriptor_changes => break,
                Packet::Event(_) => {}
            }
        }
        total
    }

    /// Whether any event packet is queued.
    pub fn has_event_packet(&self) -> bool {
        self.inner.queue.lock().iter().any(|p| matches!(p, Packet::Event(_)))
    }

    pub fn packet_count(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.queue.lock().is_empty()
    }

    /// Drop every queued packet.
    pub fn clear(&self) {
        self.inner.queue.lock().clear();
    }

    /// Register the listener woken on enqueue, replacing any previous one.
    pub fn set_listener(&self, listener: Weak<dyn PacketListener>) {
        *self.inner.listener.lock() = Some(listener);
    }

    pub fn clear_listener(&self) {
        *self.inner.listener.lock() = None;
    }

    /// Whether both handles refer to the same queue.
    pub fn same_queue(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn notify(&self) {
        // Queue lock is released before calling out so listeners may inspect it.
        let listener = self.inner.listener.lock().as_ref().and_then(Weak::upgrade);
        if let Some(listener) = listener {
            listener.packet_received();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("packets", &self.packet_count()).finish()
    }
}

#[cfg(test)]
mod tests;
