// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Publication engine
//!
//! [`PublicationEngine`] is the DataWriter core: it owns the instance
//! registry, the reader association table and the status counters of one
//! publication, stamps every outgoing message with a sequence number and
//! hands released batches to the [`Transport`].
//!
//! ## Delivery Path
//!
//! ```text
//! write() -> Sequencer -> SampleStore::enqueue -> get_unsent_data
//!                                                     |
//!                    publisher suspended? --yes--> SuspendQueue (resume flush)
//!                                                     |
//!                                                     no
//!                                                     v
//!                                               Transport::send
//! ```
//!
//! ## Locking
//!
//! Three engine locks, always taken in this order:
//!
//! 1. `removal`: serializes association removal and instance teardown
//! 2. `state`: status counters, instances, coherent and suspend state
//! 3. `readers`: the association table (may also be taken alone)
//!
//! The sample store's internal lock nests inside all three. `enabling` is
//! taken alone and only by `enable`. Listener callbacks run with `state`
//! released (`MutexGuard::unlocked`), observer events fire after every
//! engine lock is dropped, and no engine lock is held while blocking on
//! acknowledgments.

/// Debug log gated by the engine's [`LogConfig`](crate::config::LogConfig).
macro_rules! verbose {
    ($engine:expr, $($arg:tt)*) => {
        if $engine.config.log.verbose {
            log::debug!("[{}] {}", $engine.config.log.tag, format_args!($($arg)*));
        }
    };
}

mod ack;
mod associations;
mod coherent;
mod lifecycle;
mod liveliness;
mod suspend;
mod write;

pub use ack::AckToken;
pub use write::SampleData;

use liveliness::LivelinessState;
use suspend::SuspendQueue;

use crate::association::ReaderAssociationTable;
use crate::config::EngineConfig;
use crate::control_tracker::ControlTracker;
use crate::discovery::Discovery;
use crate::error::{Error, Result};
use crate::instances::InstanceRegistry;
use crate::listener::{
    DataWriterListener, LivelinessLostStatus, OfferedDeadlineMissedStatus,
    OfferedIncompatibleQosStatus, PublicationMatchedStatus, StatusMask, WriterObserver,
};
use crate::message::{MessageHeader, MessageKind, QueuedItem};
use crate::participant::{DomainParticipant, PublisherRef};
use crate::qos::DataWriterQos;
use crate::sequencer::Sequencer;
use crate::store::SampleStore;
use crate::timer::SporadicTask;
use crate::transport::{SendControlStatus, Transport};
use crate::types::{Guid, InstanceHandle, Timestamp, TransactionId};
use arc_swap::{ArcSwap, ArcSwapOption};
use coherent::CoherentState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Collaborators handed to [`PublicationEngine::new`].
pub struct EngineContext {
    pub store: Arc<dyn SampleStore>,
    pub transport: Arc<dyn Transport>,
    pub discovery: Arc<dyn Discovery>,
    /// Owning participant (non-owning back-reference).
    pub participant: Weak<dyn DomainParticipant>,
    /// Owning publisher (non-owning back-reference).
    pub publisher: Weak<dyn PublisherRef>,
    /// Names of the key fields of the topic type, for control-message
    /// content filtering.
    pub key_fields: Vec<String>,
}

struct ListenerBinding {
    listener: Arc<dyn DataWriterListener>,
    mask: StatusMask,
}

struct ObserverSlot(Arc<dyn WriterObserver>);

#[derive(Default)]
struct LivelinessTasks {
    send: Option<SporadicTask>,
    lost: Option<SporadicTask>,
}

/// State guarded by the main lock.
pub(crate) struct EngineState {
    qos: DataWriterQos,
    instances: InstanceRegistry,
    matched: PublicationMatchedStatus,
    liveliness_lost: LivelinessLostStatus,
    deadline_missed: OfferedDeadlineMissedStatus,
    incompatible_qos: OfferedIncompatibleQosStatus,
    status_changes: StatusMask,
    liveliness: LivelinessState,
    coherent: CoherentState,
    suspend: SuspendQueue,
    last_transaction: TransactionId,
    /// Participant handles of fully associated readers.
    subscription_handles: HashMap<Guid, InstanceHandle>,
}

impl EngineState {
    fn new(qos: DataWriterQos) -> Self {
        Self {
            qos,
            instances: InstanceRegistry::new(),
            matched: PublicationMatchedStatus::default(),
            liveliness_lost: LivelinessLostStatus::default(),
            deadline_missed: OfferedDeadlineMissedStatus::default(),
            incompatible_qos: OfferedIncompatibleQosStatus::default(),
            status_changes: StatusMask::NONE,
            liveliness: LivelinessState::new(),
            coherent: CoherentState::default(),
            suspend: SuspendQueue::default(),
            last_transaction: 0,
            subscription_handles: HashMap::new(),
        }
    }
}

/// A batch released from the store, ready for `Transport::send`.
#[must_use]
pub(crate) struct PendingSend {
    items: Vec<QueuedItem>,
    transaction: TransactionId,
}

/// DataWriter publication engine.
///
/// Created through [`PublicationEngine::new`] and shared as
/// `Arc<PublicationEngine>`; liveliness timer threads hold only a `Weak`
/// reference to it.
///
/// # Thread Safety
///
/// Every operation takes `&self` and may be called from any thread:
/// application writers, the liveliness timer threads and transport
/// completion callbacks.
pub struct PublicationEngine {
    self_ref: Weak<PublicationEngine>,
    config: EngineConfig,
    key_fields: Vec<String>,

    store: Arc<dyn SampleStore>,
    transport: Arc<dyn Transport>,
    discovery: Arc<dyn Discovery>,
    participant: Weak<dyn DomainParticipant>,
    publisher: Weak<dyn PublisherRef>,

    publication_id: ArcSwap<Guid>,
    sequencer: Sequencer,

    removal: Mutex<()>,
    /// Serializes `enable`; never held across callbacks.
    enabling: Mutex<()>,
    state: Mutex<EngineState>,
    readers: Mutex<ReaderAssociationTable>,

    control_tracker: ControlTracker,
    listener: ArcSwapOption<ListenerBinding>,
    observer: ArcSwapOption<ObserverSlot>,
    /// Outside `state` so tasks are joined without the main lock held.
    liveliness_tasks: Mutex<LivelinessTasks>,

    enabled: AtomicBool,
    deleted: AtomicBool,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl PublicationEngine {
    fn with_context(qos: DataWriterQos, config: EngineConfig, ctx: EngineContext) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            config,
            key_fields: ctx.key_fields,
            store: ctx.store,
            transport: ctx.transport,
            discovery: ctx.discovery,
            participant: ctx.participant,
            publisher: ctx.publisher,
            publication_id: ArcSwap::from_pointee(Guid::UNKNOWN),
            sequencer: Sequencer::new(),
            removal: Mutex::new(()),
            enabling: Mutex::new(()),
            state: Mutex::new(EngineState::new(qos)),
            readers: Mutex::new(ReaderAssociationTable::new()),
            control_tracker: ControlTracker::new(),
            listener: ArcSwapOption::empty(),
            observer: ArcSwapOption::empty(),
            liveliness_tasks: Mutex::new(LivelinessTasks::default()),
            enabled: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    /// Publication id assigned at enable (`Guid::UNKNOWN` before).
    pub fn publication_id(&self) -> Guid {
        **self.publication_id.load()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Highest sequence number assigned so far.
    pub fn max_sequence(&self) -> crate::types::SequenceNumber {
        self.sequencer.max()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    fn check_writable(&self) -> Result<()> {
        if self.is_deleted() {
            return Err(Error::AlreadyDeleted);
        }
        if !self.enabled.load(Ordering::Acquire) {
            return Err(Error::NotEnabled);
        }
        Ok(())
    }

    fn participant(&self) -> Result<Arc<dyn DomainParticipant>> {
        self.participant.upgrade().ok_or(Error::AlreadyDeleted)
    }

    fn publisher(&self) -> Result<Arc<dyn PublisherRef>> {
        self.publisher.upgrade().ok_or(Error::AlreadyDeleted)
    }

    /// Releases are held back while the publisher is suspended or gone.
    fn publisher_holds_releases(&self) -> bool {
        self.publisher.upgrade().map_or(true, |p| p.is_suspended())
    }

    fn observe(&self, event: impl FnOnce(&dyn WriterObserver, &Guid)) {
        if let Some(slot) = self.observer.load_full() {
            event(slot.0.as_ref(), &self.publication_id());
        }
    }

    // ========================================================================
    // Message building (caller holds the main lock)
    // ========================================================================

    fn base_header(&self, kind: MessageKind, publisher: &Guid, timestamp: Timestamp) -> MessageHeader {
        let mut header = MessageHeader::new(kind);
        header.source_timestamp = timestamp;
        header.publication_id = self.publication_id();
        header.publisher_id = *publisher;
        header
    }

    /// Build a control message. `_st` is proof the main lock is held, which
    /// keeps sequence order equal to enqueue order.
    fn build_control(
        &self,
        _st: &EngineState,
        kind: MessageKind,
        instance: InstanceHandle,
        payload: Option<Arc<[u8]>>,
        timestamp: Timestamp,
    ) -> Result<QueuedItem> {
        let publisher = self
            .publisher
            .upgrade()
            .ok_or_else(|| Error::InvalidState(format!("{} without publisher", kind.name())))?;
        let mut header = self.base_header(kind, &publisher.publisher_id(), timestamp);
        header.message_length = payload
            .as_ref()
            .map_or(0, |p| u32::try_from(p.len()).unwrap_or(u32::MAX));

        let mut exclude = None;
        if kind.consumes_sequence() {
            let mut readers = self.readers.lock();
            let stamp = self.sequencer.stamp(&readers);
            header.sequence = stamp.sequence;
            header.sequence_repair = stamp.repair;
            header.key_fields_only = true;
            readers.advance_all(stamp.sequence);
            if kind.is_instance_control() && self.config.publisher_content_filter {
                exclude = readers.control_exclusions(&self.key_fields).map(Arc::new);
            }
        }

        let mut item = QueuedItem::new(header, payload);
        item.instance = instance;
        item.exclude = exclude;
        Ok(item)
    }

    // ========================================================================
    // Release path
    // ========================================================================

    /// Drain the store's unsent items as one transaction. Returns `None` when
    /// there is nothing to send now (empty, or deferred by suspension).
    fn stage_unsent(&self, st: &mut EngineState) -> Option<PendingSend> {
        let items = self.store.get_unsent_data();
        if items.is_empty() {
            return None;
        }
        st.last_transaction += 1;
        let transaction = st.last_transaction;
        if self.publisher_holds_releases() {
            verbose!(self, "deferring {} item(s) as transaction {}", items.len(), transaction);
            st.suspend.defer(items, transaction);
            return None;
        }
        Some(PendingSend { items, transaction })
    }

    /// Hand a staged batch to the transport. Called without engine locks.
    fn dispatch(&self, pending: Option<PendingSend>) {
        if let Some(PendingSend { items, transaction }) = pending {
            self.transport.send(items, transaction);
        }
    }

    /// Send a control message directly (not through the store).
    fn send_control_item(&self, item: QueuedItem) -> SendControlStatus {
        let kind = item.kind();
        self.control_tracker.message_sent();
        let status = self.transport.send_control(item);
        if !status.is_ok() {
            log::debug!("[control] {} not sent: {:?}", kind.name(), status);
            self.control_tracker.message_dropped();
        }
        status
    }
}

impl std::fmt::Debug for PublicationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicationEngine")
            .field("publication_id", &self.publication_id())
            .field("max_sequence", &self.sequencer.max())
            .field("enabled", &self.enabled.load(Ordering::Relaxed))
            .field("deleted", &self.is_deleted())
            .finish_non_exhaustive()
    }
}
