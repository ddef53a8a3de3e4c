//! Whole-packet reader

use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use super::notifier::Notifier;
use super::{deadline, listen};
use crate::connection::{Connection, Signal};
use crate::types::Packet;

/// Hands out queued packets as they are, without conversion.
///
/// Data packets keep their payload alive (including ring-allocated memory)
/// for as long as the caller holds them.
#[derive(Debug, Clone)]
pub struct PacketReader {
    connection: Connection,
    notifier: Arc<Notifier>,
}

impl PacketReader {
    pub fn new(signal: &Signal) -> Self {
        Self::from_connection(signal.connect())
    }

    pub fn from_connection(connection: Connection) -> Self {
        let notifier = Arc::new(Notifier::new());
        listen(&connection, &notifier);
        Self { connection, notifier }
    }

    /// Next packet, if one is queued.
    pub fn read(&self) -> Option<Packet> {
        self.connection.dequeue()
    }

    /// Wait up to `timeout` for the next packet.
    pub fn read_timeout(&self, timeout: Duration) -> Option<Packet> {
        self.notifier.wait(deadline(timeout), || !self.connection.is_empty());
        self.read()
    }

    /// Drain every queued packet.
    pub fn read_all(&self) -> Vec<Packet> {
        let packets: Vec<Packet> = std::iter::from_fn(|| self.connection.dequeue()).collect();
        trace!(count = packets.len(), "Drained packets");
        packets
    }

    pub fn packet_count(&self) -> usize {
        self.connection.packet_count()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}
