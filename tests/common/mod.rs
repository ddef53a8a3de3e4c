//! Fixtures shared by the integration tests

#![allow(dead_code)]

use daqflow::types::{DataDescriptor, DataPacket, Ratio, SampleType};
use daqflow::Signal;

pub fn f64_descriptor() -> DataDescriptor {
    DataDescriptor::builder(SampleType::Float64).name("value").unit("V").build().expect("descriptor")
}

/// Linear `Int64` domain signal ticking `rate` times per second.
pub fn domain_signal(rate: i64) -> Signal {
    let descriptor = DataDescriptor::builder(SampleType::Int64)
        .name("time")
        .linear_rule(1, 0)
        .tick_resolution(Ratio::per(rate).expect("positive rate"))
        .origin("1970-01-01T00:00:00Z")
        .unit("s")
        .build()
        .expect("domain descriptor");
    Signal::new(descriptor).expect("domain signal")
}

/// Send `count` samples valued `start, start + 1, ...` with an implicit
/// domain starting at tick `start`.
pub fn send_ramp(signal: &Signal, start: i64, count: usize) -> DataPacket {
    let domain = signal
        .domain_descriptor()
        .map(|descriptor| DataPacket::implicit(descriptor, count, start).expect("domain packet"));
    let values: Vec<f64> = (0..count).map(|i| (start + i as i64) as f64).collect();
    let packet = DataPacket::from_samples(signal.descriptor(), &values, domain).expect("ramp packet");
    signal.send_packet(packet.clone()).expect("send");
    packet
}
