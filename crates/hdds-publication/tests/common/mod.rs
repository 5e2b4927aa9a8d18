// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared fixtures: a recording transport that restores release order with
//! a [`TransactionGate`], a fake participant/publisher pair and a discovery
//! stub.

#![allow(dead_code)]

use hdds_publication::discovery::Discovery;
use hdds_publication::filter::FilterCache;
use hdds_publication::participant::{AccessControl, DomainParticipant, HandleAllocator, PublisherRef};
use hdds_publication::qos::{DataWriterQos, Presentation};
use hdds_publication::transport::{
    AssociationProgress, SendControlStatus, TransactionGate, Transport,
};
use hdds_publication::{
    EngineConfig, EngineContext, Error, Guid, InstanceHandle, MemorySampleStore, MessageKind,
    PublicationEngine, QueuedItem, Result, SampleData, SampleStore, TransactionId,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

/// Transport that records what would have gone on the wire.
pub struct RecordingTransport {
    gate: Mutex<TransactionGate>,
    /// Items in delivery order, after transaction reordering.
    pub delivered: Mutex<Vec<QueuedItem>>,
    /// `(transaction, batch length)` of every `send` call, as received.
    pub releases: Mutex<Vec<(TransactionId, usize)>>,
    pub controls: Mutex<Vec<QueuedItem>>,
    pub replays: Mutex<Vec<(Guid, Vec<QueuedItem>)>>,
    /// Leave associations pending until the test completes them.
    pub defer_associations: AtomicBool,
    /// Refuse the terminator of durable replays.
    pub fail_replay_control: AtomicBool,
    pub stopped: AtomicBool,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self {
            gate: Mutex::new(TransactionGate::new()),
            delivered: Mutex::new(Vec::new()),
            releases: Mutex::new(Vec::new()),
            controls: Mutex::new(Vec::new()),
            replays: Mutex::new(Vec::new()),
            defer_associations: AtomicBool::new(false),
            fail_replay_control: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }
}

impl RecordingTransport {
    pub fn delivered_kinds(&self) -> Vec<MessageKind> {
        self.delivered.lock().iter().map(QueuedItem::kind).collect()
    }

    pub fn delivered_sequences(&self) -> Vec<u64> {
        self.delivered
            .lock()
            .iter()
            .map(|i| i.sequence().value())
            .collect()
    }

    pub fn control_kinds(&self) -> Vec<MessageKind> {
        self.controls.lock().iter().map(QueuedItem::kind).collect()
    }

    pub fn transactions(&self) -> Vec<TransactionId> {
        self.releases.lock().iter().map(|(txn, _)| *txn).collect()
    }
}

impl Transport for RecordingTransport {
    fn enable(&self, _publication: &Guid) -> Result<()> {
        Ok(())
    }

    fn associate(&self, _reader: &Guid, _active: bool) -> Result<AssociationProgress> {
        if self.defer_associations.load(Ordering::SeqCst) {
            Ok(AssociationProgress::Pending)
        } else {
            Ok(AssociationProgress::Complete)
        }
    }

    fn disassociate(&self, _reader: &Guid) {}

    fn stop_associating(&self, _readers: &[Guid]) {}

    fn send(&self, items: Vec<QueuedItem>, transaction: TransactionId) {
        self.releases.lock().push((transaction, items.len()));
        let ready = self.gate.lock().admit(items, transaction);
        self.delivered.lock().extend(ready);
    }

    fn send_control(&self, item: QueuedItem) -> SendControlStatus {
        self.controls.lock().push(item);
        SendControlStatus::Ok
    }

    fn send_with_control(
        &self,
        items: Vec<QueuedItem>,
        control: QueuedItem,
        reader: &Guid,
    ) -> SendControlStatus {
        self.replays.lock().push((*reader, items));
        if self.fail_replay_control.load(Ordering::SeqCst) {
            return SendControlStatus::Error;
        }
        self.controls.lock().push(control);
        SendControlStatus::Ok
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

pub struct StubDiscovery {
    next_entity: AtomicU8,
    pub qos_updates: AtomicU32,
    pub reject_qos_updates: AtomicBool,
    pub removed: Mutex<Vec<Guid>>,
    /// Runs inside `add_publication`, before the id is handed back.
    pub on_add: Mutex<Option<Box<dyn Fn() + Send>>>,
}

impl Default for StubDiscovery {
    fn default() -> Self {
        Self {
            next_entity: AtomicU8::new(1),
            qos_updates: AtomicU32::new(0),
            reject_qos_updates: AtomicBool::new(false),
            removed: Mutex::new(Vec::new()),
            on_add: Mutex::new(None),
        }
    }
}

impl Discovery for StubDiscovery {
    fn add_publication(&self, publisher: &Guid, _qos: &DataWriterQos) -> Result<Guid> {
        if let Some(hook) = self.on_add.lock().as_ref() {
            hook();
        }
        let prefix = publisher.as_bytes();
        let mut prefix12 = [0u8; 12];
        prefix12.copy_from_slice(&prefix[..12]);
        let entity = self.next_entity.fetch_add(1, Ordering::SeqCst);
        Ok(Guid::new(prefix12, [0, 0, entity, 0x02]))
    }

    fn update_publication_qos(&self, _publication: &Guid, _qos: &DataWriterQos) -> Result<()> {
        if self.reject_qos_updates.load(Ordering::SeqCst) {
            return Err(Error::Internal("qos update rejected".into()));
        }
        self.qos_updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove_publication(&self, publication: &Guid) {
        self.removed.lock().push(*publication);
    }
}

/// Access control with switchable verdicts; allows everything by default.
#[derive(Default)]
pub struct Gatekeeper {
    pub deny_register: AtomicBool,
    pub deny_dispose: AtomicBool,
}

impl AccessControl for Gatekeeper {
    fn check_register_instance(&self, _publication: &Guid, _key: &[u8]) -> bool {
        !self.deny_register.load(Ordering::SeqCst)
    }

    fn check_dispose_instance(&self, _publication: &Guid, _key: &[u8]) -> bool {
        !self.deny_dispose.load(Ordering::SeqCst)
    }
}

/// Participant and publisher in one object.
pub struct FakeOwner {
    handles: HandleAllocator,
    filters: Arc<FilterCache>,
    pub gatekeeper: Arc<Gatekeeper>,
    /// Handles given back through `return_handle`.
    pub returned: Mutex<Vec<InstanceHandle>>,
    pub enabled: AtomicBool,
    pub suspended: AtomicBool,
    pub presentation: Presentation,
    pub participant_asserts: AtomicU32,
}

impl FakeOwner {
    pub fn new(presentation: Presentation) -> Self {
        Self {
            handles: HandleAllocator::new(),
            filters: Arc::new(FilterCache::new()),
            gatekeeper: Arc::new(Gatekeeper::default()),
            returned: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
            suspended: AtomicBool::new(false),
            presentation,
            participant_asserts: AtomicU32::new(0),
        }
    }

    pub fn filter_cache_len(&self) -> usize {
        self.filters.len()
    }
}

impl DomainParticipant for FakeOwner {
    fn participant_id(&self) -> Guid {
        Guid::new([0x42; 12], [0, 0, 1, 0xC1])
    }

    fn assign_handle(&self) -> InstanceHandle {
        self.handles.allocate()
    }

    fn return_handle(&self, handle: InstanceHandle) {
        self.returned.lock().push(handle);
        self.handles.release(handle);
    }

    fn filter_cache(&self) -> Arc<FilterCache> {
        Arc::clone(&self.filters)
    }

    fn assert_liveliness(&self) -> Result<()> {
        self.participant_asserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn access_control(&self) -> Option<Arc<dyn AccessControl>> {
        let gatekeeper: Arc<dyn AccessControl> = self.gatekeeper.clone();
        Some(gatekeeper)
    }
}

impl PublisherRef for FakeOwner {
    fn publisher_id(&self) -> Guid {
        Guid::new([0x42; 12], [0, 0, 1, 0x08])
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    fn presentation(&self) -> Presentation {
        self.presentation
    }
}

pub struct World {
    pub engine: Arc<PublicationEngine>,
    pub store: Arc<MemorySampleStore>,
    pub transport: Arc<RecordingTransport>,
    pub discovery: Arc<StubDiscovery>,
    pub owner: Arc<FakeOwner>,
}

/// Build a disabled engine.
pub fn world_with(qos: DataWriterQos, config: EngineConfig, presentation: Presentation) -> World {
    let store = Arc::new(MemorySampleStore::new(&qos));
    let transport = Arc::new(RecordingTransport::default());
    let discovery = Arc::new(StubDiscovery::default());
    let owner = Arc::new(FakeOwner::new(presentation));

    let participant: Arc<dyn DomainParticipant> = owner.clone();
    let publisher: Arc<dyn PublisherRef> = owner.clone();
    let store_dyn: Arc<dyn SampleStore> = store.clone();
    let transport_dyn: Arc<dyn Transport> = transport.clone();
    let discovery_dyn: Arc<dyn Discovery> = discovery.clone();
    let ctx = EngineContext {
        store: store_dyn,
        transport: transport_dyn,
        discovery: discovery_dyn,
        participant: Arc::downgrade(&participant),
        publisher: Arc::downgrade(&publisher),
        key_fields: vec!["id".to_string()],
    };
    let engine = PublicationEngine::new(qos, config, ctx).unwrap();
    World {
        engine,
        store,
        transport,
        discovery,
        owner,
    }
}

/// Build and enable an engine with default config.
pub fn world(qos: DataWriterQos) -> World {
    let w = world_with(qos, EngineConfig::default(), Presentation::default());
    w.engine.enable().unwrap();
    w
}

pub fn reader(n: u8) -> Guid {
    Guid::new([0x55; 12], [0, 0, n, 0x07])
}

pub fn sample(id: u8, value: u8) -> SampleData {
    SampleData::new(vec![id], vec![id, value])
}
