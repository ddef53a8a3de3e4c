//! Producer side of a packet stream

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use super::Connection;
use crate::types::{DataDescriptor, DataPacket, EventPacket, Packet};
use crate::{Result, StreamError};

struct SignalInner {
    descriptor: Mutex<Arc<DataDescriptor>>,
    domain: Option<Signal>,
    connections: Mutex<Vec<Connection>>,
}

/// A stream of data packets described by a [`DataDescriptor`], optionally
/// paired with a domain signal carrying the sample timestamps.
///
/// Cloning yields another handle to the same signal.
#[derive(Clone)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

impl Signal {
    /// Create a signal without a domain.
    pub fn new(descriptor: DataDescriptor) -> Result<Self> {
        Self::build(descriptor, None)
    }

    /// Create a value signal whose packets link packets of `domain`.
    pub fn with_domain(descriptor: DataDescriptor, domain: Signal) -> Result<Self> {
        Self::build(descriptor, Some(domain))
    }

    fn build(descriptor: DataDescriptor, domain: Option<Signal>) -> Result<Self> {
        descriptor.validate()?;
        Ok(Self {
            inner: Arc::new(SignalInner {
                descriptor: Mutex::new(Arc::new(descriptor)),
                domain,
                connections: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Open a new connection. Its first packet is a descriptor-changed event
    /// carrying the current value and domain descriptors.
    pub fn connect(&self) -> Connection {
        let connection = Connection::new();
        connection.enqueue(EventPacket::descriptor_changed(
            Some(self.descriptor()),
            self.domain_descriptor(),
        ));
        let mut connections = self.inner.connections.lock();
        connections.push(connection.clone());
        info!(
            signal = %self.descriptor().name,
            connections = connections.len(),
            "Connection attached to signal"
        );
        connection
    }

    pub fn descriptor(&self) -> Arc<DataDescriptor> {
        Arc::clone(&self.inner.descriptor.lock())
    }

    pub fn domain_signal(&self) -> Option<&Signal> {
        self.inner.domain.as_ref()
    }

    pub fn domain_descriptor(&self) -> Option<Arc<DataDescriptor>> {
        self.inner.domain.as_ref().map(Signal::descriptor)
    }

    /// Send a packet to every connection. The packet must use the current descriptor.
    pub fn send_packet(&self, packet: DataPacket) -> Result<()> {
        self.check_descriptor(&packet)?;
        self.broadcast(Packet::Data(packet));
        Ok(())
    }

    /// Send several packets, checking all of them before any is queued.
    pub fn send_packets(&self, packets: impl IntoIterator<Item = DataPacket>) -> Result<()> {
        let packets: Vec<DataPacket> = packets.into_iter().collect();
        for packet in &packets {
            self.check_descriptor(packet)?;
        }
        let connections = self.inner.connections.lock().clone();
        for connection in &connections {
            connection.enqueue_multiple(packets.iter().cloned());
        }
        Ok(())
    }

    /// Replace the value descriptor and announce it on every connection.
    pub fn set_descriptor(&self, descriptor: DataDescriptor) -> Result<Arc<DataDescriptor>> {
        descriptor.validate()?;
        let descriptor = Arc::new(descriptor);
        *self.inner.descriptor.lock() = Arc::clone(&descriptor);
        debug!(signal = %descriptor.name, sample_type = %descriptor.sample_type, "Value descriptor changed");
        self.broadcast(Packet::Event(EventPacket::descriptor_changed(Some(Arc::clone(&descriptor)), None)));
        Ok(descriptor)
    }

    /// Replace the domain signal's descriptor and announce it on this
    /// signal's connections.
    pub fn set_domain_descriptor(&self, descriptor: DataDescriptor) -> Result<Arc<DataDescriptor>> {
        let domain = self.inner.domain.as_ref().ok_or_else(|| {
            StreamError::invalid_state("signal has no domain signal")
        })?;
        descriptor.validate()?;
        let descriptor = Arc::new(descriptor);
        *domain.inner.descriptor.lock() = Arc::clone(&descriptor);
        debug!(signal = %self.descriptor().name, "Domain descriptor changed");
        self.broadcast(Packet::Event(EventPacket::descriptor_changed(None, Some(Arc::clone(&descriptor)))));
        Ok(descriptor)
    }

    /// Queue an arbitrary event, e.g. an implicit domain gap.
    pub fn send_event(&self, event: EventPacket) {
        self.broadcast(Packet::Event(event));
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.lock().len()
    }

    /// Forget every connection. Readers keep their queues but receive no more packets.
    pub fn disconnect_all(&self) {
        let dropped = std::mem::take(&mut *self.inner.connections.lock());
        info!(signal = %self.descriptor().name, dropped = dropped.len(), "Signal disconnected");
    }

    fn broadcast(&self, packet: Packet) {
        let connections = self.inner.connections.lock().clone();
        for connection in &connections {
            connection.enqueue(packet.clone());
        }
    }

    fn check_descriptor(&self, packet: &DataPacket) -> Result<()> {
        let current = self.descriptor();
        if !Arc::ptr_eq(packet.descriptor(), &current) && **packet.descriptor() != *current {
            return Err(StreamError::invalid_descriptor(format!(
                "packet descriptor ({}) does not match signal descriptor ({})",
                packet.descriptor().sample_type,
                current.sample_type
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("descriptor", &self.descriptor())
            .field("has_domain", &self.inner.domain.is_some())
            .field("connections", &self.connection_count())
            .finish()
    }
}
