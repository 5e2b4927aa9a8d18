// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Sequencing and instance lifecycle through the public engine API.
//!
//! A `RecordingTransport` restores transaction order like a real transport
//! would, so these tests observe what a reader would receive.

mod common;

use common::{reader, sample, world};
use hdds_publication::discovery::ReaderAssociation;
use hdds_publication::qos::{DataWriterQos, History, ResourceLimits};
use hdds_publication::{Error, InstanceHandle, MessageKind, SequenceNumber, Timestamp};
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn sequences_are_gapless_across_data_and_control() {
    let w = world(DataWriterQos::default());
    let e = &w.engine;

    e.write(sample(1, 10), InstanceHandle::NIL).unwrap();
    e.write(sample(2, 20), InstanceHandle::NIL).unwrap();
    let h1 = e.lookup_instance(&[1]);
    e.write(sample(1, 11), h1).unwrap();
    e.dispose_instance(h1, None, Timestamp::now()).unwrap();
    e.unregister_instance(InstanceHandle::NIL, Some(&[2u8][..]), Timestamp::now())
        .unwrap();

    let seqs = w.transport.delivered_sequences();
    let expected: Vec<u64> = (1..=seqs.len() as u64).collect();
    assert_eq!(seqs, expected, "delivered {:?}", w.transport.delivered_kinds());
    assert_eq!(e.max_sequence(), SequenceNumber::new(seqs.len() as u64));
    assert_eq!(
        w.transport.delivered_kinds(),
        vec![
            MessageKind::InstanceRegistration,
            MessageKind::SampleData,
            MessageKind::InstanceRegistration,
            MessageKind::SampleData,
            MessageKind::SampleData,
            MessageKind::DisposeInstance,
            MessageKind::DisposeUnregisterInstance,
        ]
    );
}

#[test]
fn late_reader_starts_after_history() {
    let w = world(DataWriterQos::default());
    for v in 0..3 {
        w.engine.write(sample(7, v), InstanceHandle::NIL).unwrap();
    }
    let written = w.engine.max_sequence();

    w.engine
        .add_association(ReaderAssociation::new(reader(1)), true)
        .unwrap();
    let cursor = w.engine.expected_sequence_for(&reader(1)).unwrap();
    assert!(cursor >= written, "cursor {} < {}", cursor, written);

    w.engine.write(sample(7, 9), InstanceHandle::NIL).unwrap();
    let last = w.transport.delivered.lock().last().cloned().unwrap();
    assert!(last.is_for(&reader(1)));
    assert_eq!(w.engine.expected_sequence_for(&reader(1)), Some(last.sequence()));
}

#[test]
fn registering_twice_returns_same_handle_and_sends_once() {
    let w = world(DataWriterQos::default());
    let first = w.engine.register_instance(Arc::from(&[5u8][..]), Timestamp::now()).unwrap();
    let second = w.engine.register_instance(Arc::from(&[5u8][..]), Timestamp::now()).unwrap();

    assert_eq!(first, second);
    assert_eq!(w.engine.instance_count(), 1);
    assert_eq!(
        w.transport.delivered_kinds(),
        vec![MessageKind::InstanceRegistration]
    );
    assert_eq!(&*w.engine.get_key_value(first).unwrap(), &[5u8]);
}

#[test]
fn write_with_mismatched_handle_is_rejected() {
    let w = world(DataWriterQos::default());
    let h = w.engine.register_instance(Arc::from(&[1u8][..]), Timestamp::now()).unwrap();
    let before = w.engine.max_sequence();

    let err = w.engine.write(sample(2, 0), h).unwrap_err();
    assert!(matches!(err, Error::PreconditionNotMet(_) | Error::BadParameter(_)), "{:?}", err);
    assert_eq!(w.engine.max_sequence(), before);
}

#[test]
fn unregister_all_clears_registry() {
    let w = world(DataWriterQos::default());
    for id in 0..4 {
        w.engine.write(sample(id, 0), InstanceHandle::NIL).unwrap();
    }
    assert_eq!(w.engine.instance_count(), 4);

    w.engine.unregister_all();
    assert_eq!(w.engine.instance_count(), 0);
    assert!(w.engine.lookup_instance(&[2]).is_nil());
}

#[test]
fn keep_all_write_times_out_when_reader_never_acks() {
    let qos = DataWriterQos::reliable()
        .history(History::KeepAll)
        .resource_limits(ResourceLimits {
            max_samples: 1,
            max_instances: 4,
            max_samples_per_instance: 1,
        })
        .max_blocking_time(Duration::from_millis(50));
    let w = world(qos);
    w.engine
        .add_association(ReaderAssociation::new(reader(1)), true)
        .unwrap();

    w.engine.write(sample(1, 0), InstanceHandle::NIL).unwrap();
    let before = w.engine.max_sequence();
    let err = w.engine.write(sample(1, 1), InstanceHandle::NIL).unwrap_err();
    assert!(err.is_timeout(), "{:?}", err);
    assert_eq!(w.engine.max_sequence(), before);

    w.store.acknowledge(&reader(1), before);
    w.engine.write(sample(1, 2), InstanceHandle::NIL).unwrap();
}

#[test]
fn concurrent_writers_produce_gapless_ordered_stream() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 50;

    let w = world(DataWriterQos::default().history(History::KeepLast(4)));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let engine = Arc::clone(&w.engine);
            thread::spawn(move || {
                let mut seqs = Vec::with_capacity(PER_THREAD);
                for i in 0..PER_THREAD {
                    let id = fastrand::u8(0..8);
                    seqs.push(engine.write(sample(id, i as u8), InstanceHandle::NIL).unwrap());
                    if fastrand::bool() {
                        thread::yield_now();
                    }
                }
                (t, seqs)
            })
        })
        .collect();

    let mut data_seqs = BTreeSet::new();
    for h in handles {
        let (_, seqs) = h.join().unwrap();
        for s in seqs.windows(2) {
            assert!(s[0] < s[1], "per-thread sequences must increase");
        }
        data_seqs.extend(seqs);
    }
    assert_eq!(data_seqs.len(), THREADS * PER_THREAD);

    // The gate hands items on in transaction order, so the delivered stream
    // is the full gapless sequence range.
    let delivered = w.transport.delivered_sequences();
    let expected: Vec<u64> = (1..=w.engine.max_sequence().value()).collect();
    assert_eq!(delivered, expected);
}

#[test]
fn write_before_enable_is_not_enabled() {
    let w = common::world_with(
        DataWriterQos::default(),
        hdds_publication::EngineConfig::default(),
        Default::default(),
    );
    assert!(matches!(
        w.engine.write(sample(1, 1), InstanceHandle::NIL),
        Err(Error::NotEnabled)
    ));
}

#[test]
fn denied_registration_consumes_nothing() {
    let w = world(DataWriterQos::default());
    w.owner.gatekeeper.deny_register.store(true, Ordering::SeqCst);
    let before = w.engine.max_sequence();

    assert_eq!(
        w.engine.register_instance(Arc::from(&[1u8][..]), Timestamp::now()),
        Err(Error::NotAllowedBySecurity)
    );
    assert!(matches!(
        w.engine.write(sample(1, 0), InstanceHandle::NIL),
        Err(Error::NotAllowedBySecurity)
    ));
    assert_eq!(w.engine.max_sequence(), before);
    assert_eq!(w.engine.instance_count(), 0);
    assert!(w.transport.delivered.lock().is_empty());
}

#[test]
fn denied_dispose_leaves_instance_alive() {
    let w = world(DataWriterQos::default());
    let handle = w
        .engine
        .register_instance(Arc::from(&[2u8][..]), Timestamp::now())
        .unwrap();
    w.owner.gatekeeper.deny_dispose.store(true, Ordering::SeqCst);
    let before = w.engine.max_sequence();

    assert_eq!(
        w.engine.dispose_instance(handle, None, Timestamp::now()),
        Err(Error::NotAllowedBySecurity)
    );
    assert_eq!(w.engine.max_sequence(), before);
    assert_eq!(w.engine.instance_count(), 1);
    assert!(!w.store.is_disposed(handle));
    assert!(!w
        .transport
        .delivered_kinds()
        .contains(&MessageKind::DisposeInstance));

    // Registration is still allowed and stays idempotent.
    assert_eq!(
        w.engine.register_instance(Arc::from(&[2u8][..]), Timestamp::now()),
        Ok(handle)
    );
}

#[test]
fn refused_registration_rolls_back() {
    let qos = DataWriterQos::default().resource_limits(ResourceLimits {
        max_samples: 8,
        max_instances: 1,
        max_samples_per_instance: 8,
    });
    let w = world(qos);
    w.engine
        .register_instance(Arc::from(&[1u8][..]), Timestamp::now())
        .unwrap();
    let before = w.engine.max_sequence();

    let err = w
        .engine
        .register_instance(Arc::from(&[2u8][..]), Timestamp::now())
        .unwrap_err();
    assert!(matches!(err, Error::ResourceExhausted(_)), "{:?}", err);
    assert_eq!(w.engine.lookup_instance(&[2u8]), InstanceHandle::NIL);
    assert_eq!(w.engine.instance_count(), 1);
    assert_eq!(w.engine.max_sequence(), before);
    assert_eq!(w.owner.returned.lock().len(), 1, "handle goes back to the participant");
    assert_eq!(w.store.outstanding_leases(), 0);
}

#[test]
fn reliable_keep_all_without_readers_never_stalls() {
    let qos = DataWriterQos::reliable()
        .history(History::KeepAll)
        .resource_limits(ResourceLimits {
            max_samples: 2,
            max_instances: 1,
            max_samples_per_instance: 2,
        })
        .max_blocking_time(Duration::from_millis(50));
    let w = world(qos);

    for v in 0..4 {
        w.engine.write(sample(1, v), InstanceHandle::NIL).unwrap();
        let sent = std::mem::take(&mut *w.transport.delivered.lock());
        for item in &sent {
            w.engine.data_delivered(item);
        }
    }
    assert_eq!(w.store.retained(), 0);
}
