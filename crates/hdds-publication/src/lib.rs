// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # HDDS publication engine
//!
//! DataWriter-side core of HDDS: everything that happens between an
//! application `write()` and the transport, independent of any wire
//! protocol or network stack.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hdds_publication::{EngineConfig, EngineContext, PublicationEngine, SampleData};
//! use hdds_publication::qos::DataWriterQos;
//! use hdds_publication::types::InstanceHandle;
//!
//! let engine = PublicationEngine::new(DataWriterQos::reliable(), EngineConfig::default(), ctx)?;
//! engine.enable()?;
//! let seq = engine.write(SampleData::new(key, payload), InstanceHandle::NIL)?;
//! engine.wait_for_acknowledgments(std::time::Duration::from_secs(1))?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |            DataWriter<T> (typed facade, serialization)              |
//! +---------------------------------------------------------------------+
//! |                        PublicationEngine                            |
//! |  Instance Registry | Reader Associations | Sequencer | Coherent Sets|
//! |  Durability Replay | Ack Waiter | Liveliness Monitor | Suspend Queue|
//! +---------------------------------------------------------------------+
//! |  SampleStore | Transport | Discovery | DomainParticipant | Publisher|
//! +---------------------------------------------------------------------+
//! ```
//!
//! The engine reaches its collaborators only through the traits in
//! [`store`], [`transport`], [`discovery`] and [`participant`].
//! [`MemorySampleStore`] is the in-process store implementation.
//!
//! ## Modules Overview
//!
//! - [`engine`] - [`PublicationEngine`] (start here)
//! - [`writer`] - typed [`DataWriter`]
//! - [`qos`] - writer and publisher QoS policies
//! - [`filter`] - writer-side content filtering
//! - [`message`] - queued items and control payloads
//! - [`config`] - [`EngineConfig`], optional YAML loading

pub mod association;
pub mod config;
pub mod control_tracker;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod filter;
pub mod instances;
pub mod listener;
pub mod message;
pub mod participant;
pub mod qos;
pub mod sequencer;
pub mod store;
pub mod timer;
pub mod transport;
pub mod types;
pub mod writer;

pub use config::{EngineConfig, LogConfig};
pub use engine::{AckToken, EngineContext, PublicationEngine, SampleData};
pub use error::{Error, Result};
pub use listener::{DataWriterListener, StatusMask, WriterObserver};
pub use message::{MessageKind, QueuedItem};
pub use store::{MemorySampleStore, SampleStore};
pub use types::{Guid, InstanceHandle, SequenceNumber, Timestamp, TransactionId};
pub use writer::{DataWriter, DdsSample};
