//! Event packets interleaved with data packets in a connection

use std::sync::Arc;

use super::DataDescriptor;

/// Event id of [`EventPacket::DataDescriptorChanged`].
pub const DATA_DESCRIPTOR_CHANGED: &str = "DATA_DESCRIPTOR_CHANGED";
/// Event id of [`EventPacket::ImplicitDomainGapDetected`].
pub const IMPLICIT_DOMAIN_GAP_DETECTED: &str = "IMPLICIT_DOMAIN_GAP_DETECTED";

/// Control packet carried in-band with sample data.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPacket {
    /// The value and/or domain descriptor changed. `None` means unchanged.
    DataDescriptorChanged {
        value_descriptor: Option<Arc<DataDescriptor>>,
        domain_descriptor: Option<Arc<DataDescriptor>>,
    },
    /// The producer skipped domain ticks; `gap` is the number of ticks missing.
    ImplicitDomainGapDetected { gap: i64 },
}

impl EventPacket {
    /// Descriptor-changed event announcing both descriptors.
    pub fn descriptor_changed(
        value_descriptor: Option<Arc<DataDescriptor>>,
        domain_descriptor: Option<Arc<DataDescriptor>>,
    ) -> Self {
        EventPacket::DataDescriptorChanged { value_descriptor, domain_descriptor }
    }

    pub fn implicit_domain_gap(gap: i64) -> Self {
        EventPacket::ImplicitDomainGapDetected { gap }
    }

    /// Stable textual event id.
    pub fn id(&self) -> &'static str {
        match self {
            EventPacket::DataDescriptorChanged { .. } => DATA_DESCRIPTOR_CHANGED,
            EventPacket::ImplicitDomainGapDetected { .. } => IMPLICIT_DOMAIN_GAP_DETECTED,
        }
    }

    pub fn is_descriptor_changed(&self) -> bool {
        matches!(self, EventPacket::DataDescriptorChanged { .. })
    }
}
