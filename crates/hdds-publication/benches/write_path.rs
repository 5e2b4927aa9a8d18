// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Write Path Benchmark
//!
//! Measures `PublicationEngine::write()` from sample to `Transport::send`
//! with the in-memory store and a transport that discards everything:
//! - Payload sizes (64B to 16KB)
//! - Number of matched readers (0, 4, 32), which drives the per-write
//!   reader bookkeeping
//! - Content-filtered readers
//!
//! No network I/O; this isolates the engine's own overhead.

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_possible_truncation)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hdds_publication::discovery::{Discovery, ReaderAssociation};
use hdds_publication::filter::{FieldMap, FieldValue, FilterCache};
use hdds_publication::participant::{DomainParticipant, HandleAllocator, PublisherRef};
use hdds_publication::qos::{DataWriterQos, History, Presentation};
use hdds_publication::transport::{AssociationProgress, SendControlStatus, Transport};
use hdds_publication::{
    EngineConfig, EngineContext, Guid, InstanceHandle, MemorySampleStore, PublicationEngine,
    QueuedItem, Result, SampleData, SampleStore, Timestamp, TransactionId,
};
use std::hint::black_box as bb;
use std::sync::Arc;

struct NullTransport;

impl Transport for NullTransport {
    fn enable(&self, _publication: &Guid) -> Result<()> {
        Ok(())
    }

    fn associate(&self, _reader: &Guid, _active: bool) -> Result<AssociationProgress> {
        Ok(AssociationProgress::Complete)
    }

    fn disassociate(&self, _reader: &Guid) {}

    fn stop_associating(&self, _readers: &[Guid]) {}

    fn send(&self, items: Vec<QueuedItem>, _transaction: TransactionId) {
        bb(items);
    }

    fn send_control(&self, _item: QueuedItem) -> SendControlStatus {
        SendControlStatus::Ok
    }

    fn send_with_control(
        &self,
        _items: Vec<QueuedItem>,
        _control: QueuedItem,
        _reader: &Guid,
    ) -> SendControlStatus {
        SendControlStatus::Ok
    }

    fn stop(&self) {}
}

struct FixedDiscovery;

impl Discovery for FixedDiscovery {
    fn add_publication(&self, _publisher: &Guid, _qos: &DataWriterQos) -> Result<Guid> {
        Ok(Guid::new([7; 12], [0, 0, 1, 0x02]))
    }

    fn update_publication_qos(&self, _publication: &Guid, _qos: &DataWriterQos) -> Result<()> {
        Ok(())
    }

    fn remove_publication(&self, _publication: &Guid) {}
}

struct BenchOwner {
    handles: HandleAllocator,
    filters: Arc<FilterCache>,
}

impl DomainParticipant for BenchOwner {
    fn participant_id(&self) -> Guid {
        Guid::new([7; 12], [0, 0, 1, 0xC1])
    }

    fn assign_handle(&self) -> InstanceHandle {
        self.handles.allocate()
    }

    fn return_handle(&self, handle: InstanceHandle) {
        self.handles.release(handle);
    }

    fn filter_cache(&self) -> Arc<FilterCache> {
        Arc::clone(&self.filters)
    }

    fn assert_liveliness(&self) -> Result<()> {
        Ok(())
    }
}

impl PublisherRef for BenchOwner {
    fn publisher_id(&self) -> Guid {
        Guid::new([7; 12], [0, 0, 1, 0x08])
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn is_suspended(&self) -> bool {
        false
    }

    fn presentation(&self) -> Presentation {
        Presentation::default()
    }
}

/// Engine plus the owner it borrows weakly; keep both alive together.
struct Bench {
    engine: Arc<PublicationEngine>,
    _owner: Arc<BenchOwner>,
}

fn setup(qos: DataWriterQos, readers: u8, filtered: bool) -> Bench {
    let owner = Arc::new(BenchOwner {
        handles: HandleAllocator::new(),
        filters: Arc::new(FilterCache::new()),
    });
    let participant: Arc<dyn DomainParticipant> = owner.clone();
    let publisher: Arc<dyn PublisherRef> = owner.clone();
    let store: Arc<dyn SampleStore> = Arc::new(MemorySampleStore::new(&qos));
    let ctx = EngineContext {
        store,
        transport: Arc::new(NullTransport),
        discovery: Arc::new(FixedDiscovery),
        participant: Arc::downgrade(&participant),
        publisher: Arc::downgrade(&publisher),
        key_fields: vec!["id".to_string()],
    };
    let engine = PublicationEngine::new(qos, EngineConfig::default(), ctx).expect("engine creation");
    engine.enable().expect("enable");

    for n in 0..readers {
        let reader = Guid::new([9; 12], [0, 0, n, 0x07]);
        let mut association = ReaderAssociation::new(reader);
        if filtered {
            association = association.filter("DDSSQL", "level > %0", vec![n.to_string()]);
        }
        engine.add_association(association, true).expect("association");
    }
    Bench {
        engine,
        _owner: owner,
    }
}

fn sample(size: usize, level: i64) -> SampleData {
    let mut fields = FieldMap::new();
    fields.insert("id".to_string(), FieldValue::Int(1));
    fields.insert("level".to_string(), FieldValue::Int(level));
    SampleData::new(vec![1u8], vec![0xAB; size]).with_fields(fields)
}

/// Benchmark write cost by payload size
fn bench_write_payload_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_path_by_size");
    let bench = setup(DataWriterQos::best_effort(), 1, false);
    let handle = bench
        .engine
        .register_instance(Arc::from(&[1u8][..]), Timestamp::now())
        .expect("register");

    for size in [64, 1024, 4096, 16384] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let payload = sample(size, 0);
            b.iter(|| {
                bench
                    .engine
                    .write(bb(payload.clone()), handle)
                    .expect("write should succeed");
            });
        });
    }
    group.finish();
}

/// Benchmark write cost by number of matched readers
fn bench_write_reader_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_path_by_readers");
    group.throughput(Throughput::Elements(1));

    for readers in [0u8, 4, 32] {
        let bench = setup(
            DataWriterQos::reliable().history(History::KeepLast(1)),
            readers,
            false,
        );
        let payload = sample(256, 0);
        group.bench_with_input(BenchmarkId::from_parameter(readers), &readers, |b, _| {
            b.iter(|| {
                bench
                    .engine
                    .write(bb(payload.clone()), InstanceHandle::NIL)
                    .expect("write should succeed");
            });
        });
    }
    group.finish();
}

/// Benchmark writer-side content filtering across 32 filtered readers
fn bench_write_filtered(c: &mut Criterion) {
    let bench = setup(DataWriterQos::best_effort(), 32, true);
    let mut level = 0i64;
    c.bench_function("write_path_filtered_32", |b| {
        b.iter(|| {
            level = (level + 1) % 64;
            bench
                .engine
                .write(bb(sample(256, level)), InstanceHandle::NIL)
                .expect("write should succeed");
        });
    });
}

criterion_group!(
    benches,
    bench_write_payload_sizes,
    bench_write_reader_count,
    bench_write_filtered
);
criterion_main!(benches);
