//! Tests for the connection queue and signal fan-out
//!
//! These tests verify FIFO delivery, sample accounting around event packets
//! and listener notification.

use super::*;
use crate::test_utils::{f64_descriptor, linear_domain_descriptor};
use crate::types::{DataPacket, EventPacket};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct CountingListener {
    hits: AtomicUsize,
}

impl PacketListener for CountingListener {
    fn packet_received(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }
}

fn data(samples: &[f64]) -> DataPacket {
    DataPacket::from_samples(Arc::new(f64_descriptor()), samples, None).unwrap()
}

#[test]
fn packets_dequeue_in_send_order() {
    let connection = Connection::new();
    let first = data(&[1.0]);
    let second = data(&[2.0, 3.0]);
    connection.enqueue(first.clone());
    connection.enqueue(second.clone());

    assert_eq!(connection.packet_count(), 2);
    assert!(connection.peek().and_then(|p| p.as_data().map(|d| d.ptr_eq(&first))).unwrap_or(false));
    assert!(connection.dequeue().unwrap().as_data().unwrap().ptr_eq(&first));
    assert!(connection.dequeue().unwrap().as_data().unwrap().ptr_eq(&second));
    assert!(connection.dequeue().is_none());
    assert!(connection.is_empty());
}

#[test]
fn available_samples_stops_at_event_unless_asked() {
    let connection = Connection::new();
    connection.enqueue(data(&[1.0, 2.0]));
    connection.enqueue(data(&[3.0]));
    connection.enqueue(EventPacket::implicit_domain_gap(4));
    connection.enqueue(data(&[4.0, 5.0, 6.0]));

    assert_eq!(connection.available_samples(false), 3);
    assert_eq!(connection.available_samples(true), 6);
    assert!(connection.has_event_packet());
}

#[test]
fn listener_is_notified_once_per_enqueue_call() {
    let connection = Connection::new();
    let listener = Arc::new(CountingListener::default());
    let weak: Weak<dyn PacketListener> = Arc::downgrade(&listener) as Weak<dyn PacketListener>;
    connection.set_listener(weak);

    connection.enqueue(data(&[1.0]));
    connection.enqueue_multiple([data(&[2.0]), data(&[3.0])]);
    assert_eq!(listener.hits.load(Ordering::SeqCst), 2);

    drop(listener);
    // A dropped listener is silently skipped.
    connection.enqueue(data(&[4.0]));
    assert_eq!(connection.packet_count(), 4);
}

#[test]
fn signal_connect_queues_initial_descriptors() {
    let domain = Signal::new(linear_domain_descriptor(1000)).unwrap();
    let signal = Signal::with_domain(f64_descriptor(), domain).unwrap();
    let connection = signal.connect();

    match connection.dequeue() {
        Some(Packet::Event(EventPacket::DataDescriptorChanged { value_descriptor, domain_descriptor })) => {
            assert_eq!(value_descriptor.as_deref(), Some(&f64_descriptor()));
            assert_eq!(domain_descriptor.as_deref(), Some(&linear_domain_descriptor(1000)));
        }
        other => panic!("expected descriptor-changed event, got {:?}", other),
    }
}

#[test]
fn signal_fans_out_and_checks_descriptor() {
    let signal = Signal::new(f64_descriptor()).unwrap();
    let a = signal.connect();
    let b = signal.connect();
    assert!(!a.same_queue(&b));

    signal.send_packet(DataPacket::from_samples(signal.descriptor(), &[1.0f64, 2.0], None).unwrap()).unwrap();
    assert_eq!(a.available_samples(true), 2);
    assert_eq!(b.available_samples(true), 2);

    let foreign = Arc::new(crate::test_utils::i32_descriptor());
    let err = signal.send_packet(DataPacket::from_samples(foreign, &[1i32], None).unwrap());
    assert!(err.is_err());

    signal.disconnect_all();
    signal.send_packet(DataPacket::from_samples(signal.descriptor(), &[3.0f64], None).unwrap()).unwrap();
    assert_eq!(a.available_samples(true), 2);
}

#[test]
fn set_descriptor_emits_event_on_every_connection() {
    let signal = Signal::new(f64_descriptor()).unwrap();
    let connection = signal.connect();
    connection.clear();

    signal.set_descriptor(crate::test_utils::i32_descriptor()).unwrap();
    let event = connection.dequeue().and_then(|p| p.as_event().cloned()).unwrap();
    assert!(event.is_descriptor_changed());
    assert_eq!(signal.descriptor().sample_type, crate::types::SampleType::Int32);
    assert!(signal.set_domain_descriptor(linear_domain_descriptor(10)).is_err());
}
