// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Queued items and the header codec handed to the transport.
//!
//! # Header layout (big-endian)
//!
//! ```text
//! 0        1        2                 6                        14
//! +--------+--------+-----------------+------------------------+
//! | kind   | flags  | message_length  | sequence (u64)         |
//! +--------+--------+-----------------+------------------------+
//! 14                22                         38                         54
//! +-----------------+--------------------------+--------------------------+
//! | timestamp s/ns  | publication id (16)      | publisher id (16)        |
//! +-----------------+--------------------------+--------------------------+
//! 54                62   (present when FLAG_LIFESPAN is set)
//! +-----------------+
//! | lifespan s/ns   |
//! +-----------------+
//! ```

use crate::error::{Error, Result};
use crate::filter::FieldMap;
use crate::types::{Guid, GuidSet, InstanceHandle, SequenceNumber, Timestamp};
use std::sync::Arc;
use std::time::Duration;

/// Fixed header size without the lifespan extension.
pub const HEADER_LEN: usize = 54;
/// Size of the optional lifespan extension.
pub const LIFESPAN_EXT_LEN: usize = 8;

const FLAG_BYTE_ORDER: u8 = 0x01;
const FLAG_COHERENT: u8 = 0x02;
const FLAG_HISTORIC: u8 = 0x04;
const FLAG_LIFESPAN: u8 = 0x08;
const FLAG_GROUP_COHERENT: u8 = 0x10;
const FLAG_CONTENT_FILTER: u8 = 0x20;
const FLAG_SEQUENCE_REPAIR: u8 = 0x40;
const FLAG_KEY_FIELDS_ONLY: u8 = 0x80;

/// Message kinds produced by the engine (wire values are stable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    SampleData = 0,
    DatawriterLiveliness = 1,
    InstanceRegistration = 2,
    UnregisterInstance = 3,
    DisposeInstance = 4,
    RequestAck = 6,
    EndCoherentChanges = 8,
    DisposeUnregisterInstance = 10,
    EndHistoricSamples = 11,
}

impl MessageKind {
    pub const ALL: [MessageKind; 9] = [
        MessageKind::SampleData,
        MessageKind::DatawriterLiveliness,
        MessageKind::InstanceRegistration,
        MessageKind::UnregisterInstance,
        MessageKind::DisposeInstance,
        MessageKind::RequestAck,
        MessageKind::EndCoherentChanges,
        MessageKind::DisposeUnregisterInstance,
        MessageKind::EndHistoricSamples,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| *k as u8 == value)
    }

    /// Control kinds that take a sequence number, like data does.
    ///
    /// Liveliness, end-of-coherent-set and end-of-replay markers are
    /// sequence-less.
    pub fn consumes_sequence(self) -> bool {
        matches!(
            self,
            MessageKind::InstanceRegistration
                | MessageKind::UnregisterInstance
                | MessageKind::DisposeInstance
                | MessageKind::DisposeUnregisterInstance
                | MessageKind::RequestAck
        )
    }

    /// Kinds carrying an instance key as payload.
    pub fn is_instance_control(self) -> bool {
        matches!(
            self,
            MessageKind::InstanceRegistration
                | MessageKind::UnregisterInstance
                | MessageKind::DisposeInstance
                | MessageKind::DisposeUnregisterInstance
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageKind::SampleData => "SAMPLE_DATA",
            MessageKind::DatawriterLiveliness => "DATAWRITER_LIVELINESS",
            MessageKind::InstanceRegistration => "INSTANCE_REGISTRATION",
            MessageKind::UnregisterInstance => "UNREGISTER_INSTANCE",
            MessageKind::DisposeInstance => "DISPOSE_INSTANCE",
            MessageKind::RequestAck => "REQUEST_ACK",
            MessageKind::EndCoherentChanges => "END_COHERENT_CHANGES",
            MessageKind::DisposeUnregisterInstance => "DISPOSE_UNREGISTER_INSTANCE",
            MessageKind::EndHistoricSamples => "END_HISTORIC_SAMPLES",
        }
    }
}

/// Header of every data and control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub kind: MessageKind,
    /// Payload is little-endian.
    pub byte_order: bool,
    pub coherent_change: bool,
    pub historic_sample: bool,
    pub group_coherent: bool,
    pub content_filter: bool,
    /// Some reader may have missed earlier sequence numbers.
    pub sequence_repair: bool,
    pub key_fields_only: bool,
    pub message_length: u32,
    pub sequence: SequenceNumber,
    pub source_timestamp: Timestamp,
    pub publication_id: Guid,
    pub publisher_id: Guid,
    pub lifespan: Option<Duration>,
}

impl MessageHeader {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            byte_order: cfg!(target_endian = "little"),
            coherent_change: false,
            historic_sample: false,
            group_coherent: false,
            content_filter: false,
            sequence_repair: false,
            key_fields_only: false,
            message_length: 0,
            sequence: SequenceNumber::UNKNOWN,
            source_timestamp: Timestamp::default(),
            publication_id: Guid::UNKNOWN,
            publisher_id: Guid::UNKNOWN,
            lifespan: None,
        }
    }

    pub fn serialized_len(&self) -> usize {
        if self.lifespan.is_some() {
            HEADER_LEN + LIFESPAN_EXT_LEN
        } else {
            HEADER_LEN
        }
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        for (set, bit) in [
            (self.byte_order, FLAG_BYTE_ORDER),
            (self.coherent_change, FLAG_COHERENT),
            (self.historic_sample, FLAG_HISTORIC),
            (self.lifespan.is_some(), FLAG_LIFESPAN),
            (self.group_coherent, FLAG_GROUP_COHERENT),
            (self.content_filter, FLAG_CONTENT_FILTER),
            (self.sequence_repair, FLAG_SEQUENCE_REPAIR),
            (self.key_fields_only, FLAG_KEY_FIELDS_ONLY),
        ] {
            if set {
                flags |= bit;
            }
        }
        flags
    }

    /// Encode into `buf`, returning bytes written.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize> {
        let len = self.serialized_len();
        if buf.len() < len {
            return Err(Error::SerializationError(format!(
                "header needs {} bytes, buffer has {}",
                len,
                buf.len()
            )));
        }

        buf[0] = self.kind as u8;
        buf[1] = self.flags();
        buf[2..6].copy_from_slice(&self.message_length.to_be_bytes());
        buf[6..14].copy_from_slice(&self.sequence.value().to_be_bytes());
        buf[14..18].copy_from_slice(&self.source_timestamp.sec.to_be_bytes());
        buf[18..22].copy_from_slice(&self.source_timestamp.nanosec.to_be_bytes());
        buf[22..38].copy_from_slice(&self.publication_id.as_bytes());
        buf[38..54].copy_from_slice(&self.publisher_id.as_bytes());
        if let Some(lifespan) = self.lifespan {
            let secs = u32::try_from(lifespan.as_secs()).unwrap_or(u32::MAX);
            buf[54..58].copy_from_slice(&secs.to_be_bytes());
            buf[58..62].copy_from_slice(&lifespan.subsec_nanos().to_be_bytes());
        }
        Ok(len)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.serialized_len()];
        // Buffer is sized from serialized_len, encode cannot fail.
        let _ = self.encode_into(&mut buf);
        buf
    }

    /// Decode a header, returning it and the bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let mut r = ByteReader::new(buf);
        let raw_kind = r.u8()?;
        let kind = MessageKind::from_u8(raw_kind)
            .ok_or_else(|| Error::SerializationError(format!("unknown message kind {}", raw_kind)))?;
        let flags = r.u8()?;
        let message_length = r.u32()?;
        let sequence = SequenceNumber::new(r.u64()?);
        let sec = r.i32()?;
        let nanosec = r.u32()?;
        let publication_id = r.guid()?;
        let publisher_id = r.guid()?;
        let lifespan = if flags & FLAG_LIFESPAN != 0 {
            let secs = r.u32()?;
            let nanos = r.u32()?;
            Some(Duration::new(u64::from(secs), nanos))
        } else {
            None
        };

        let header = Self {
            kind,
            byte_order: flags & FLAG_BYTE_ORDER != 0,
            coherent_change: flags & FLAG_COHERENT != 0,
            historic_sample: flags & FLAG_HISTORIC != 0,
            group_coherent: flags & FLAG_GROUP_COHERENT != 0,
            content_filter: flags & FLAG_CONTENT_FILTER != 0,
            sequence_repair: flags & FLAG_SEQUENCE_REPAIR != 0,
            key_fields_only: flags & FLAG_KEY_FIELDS_ONLY != 0,
            message_length,
            sequence,
            source_timestamp: Timestamp { sec, nanosec },
            publication_id,
            publisher_id,
            lifespan,
        };
        Ok((header, r.pos))
    }
}

/// A data or control message staged for the sample store and transport.
#[derive(Debug, Clone)]
pub struct QueuedItem {
    pub header: MessageHeader,
    pub payload: Option<Arc<[u8]>>,
    pub instance: InstanceHandle,
    /// Readers that must not receive this item.
    pub exclude: Option<Arc<GuidSet>>,
    /// Field snapshot for content filtering during replay.
    pub fields: Option<Arc<FieldMap>>,
    /// Addressed to a single reader (historic replay).
    pub destination: Option<Guid>,
}

impl QueuedItem {
    pub fn new(header: MessageHeader, payload: Option<Arc<[u8]>>) -> Self {
        Self {
            header,
            payload,
            instance: InstanceHandle::NIL,
            exclude: None,
            fields: None,
            destination: None,
        }
    }

    pub fn sequence(&self) -> SequenceNumber {
        self.header.sequence
    }

    pub fn kind(&self) -> MessageKind {
        self.header.kind
    }

    /// Whether `reader` should receive this item.
    pub fn is_for(&self, reader: &Guid) -> bool {
        if let Some(dest) = &self.destination {
            if dest != reader {
                return false;
            }
        }
        !self
            .exclude
            .as_ref()
            .is_some_and(|set| set.contains(reader))
    }

    /// Header followed by payload.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = self.header.to_bytes();
        if let Some(payload) = &self.payload {
            out.extend_from_slice(payload);
        }
        out
    }
}

/// Per-writer summary inside a group-coherent END_COHERENT_CHANGES.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterCoherentSamples {
    pub writer: Guid,
    pub num_samples: u32,
    pub last_sample: SequenceNumber,
}

/// Summaries for every writer of a group-scoped publisher.
pub type GroupCoherentSamples = Vec<WriterCoherentSamples>;

/// Payload of END_COHERENT_CHANGES.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoherentChangeControl {
    pub num_samples: u32,
    pub last_sample: SequenceNumber,
    pub group_coherent: bool,
    pub publisher_id: Guid,
    pub group_samples: GroupCoherentSamples,
}

impl CoherentChangeControl {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(33 + self.group_samples.len() * 28);
        out.extend_from_slice(&self.num_samples.to_be_bytes());
        out.extend_from_slice(&self.last_sample.value().to_be_bytes());
        out.push(u8::from(self.group_coherent));
        out.extend_from_slice(&self.publisher_id.as_bytes());
        let count = u32::try_from(self.group_samples.len()).unwrap_or(u32::MAX);
        out.extend_from_slice(&count.to_be_bytes());
        for entry in self.group_samples.iter().take(count as usize) {
            out.extend_from_slice(&entry.writer.as_bytes());
            out.extend_from_slice(&entry.num_samples.to_be_bytes());
            out.extend_from_slice(&entry.last_sample.value().to_be_bytes());
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(buf);
        let num_samples = r.u32()?;
        let last_sample = SequenceNumber::new(r.u64()?);
        let group_coherent = r.u8()? != 0;
        let publisher_id = r.guid()?;
        let count = r.u32()?;
        let mut group_samples = Vec::new();
        for _ in 0..count {
            group_samples.push(WriterCoherentSamples {
                writer: r.guid()?,
                num_samples: r.u32()?,
                last_sample: SequenceNumber::new(r.u64()?),
            });
        }
        Ok(Self {
            num_samples,
            last_sample,
            group_coherent,
            publisher_id,
            group_samples,
        })
    }
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let slice = self.buf.get(self.pos..end).ok_or_else(|| {
            Error::SerializationError(format!("truncated at offset {}", self.pos))
        })?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take()?))
    }

    fn guid(&mut self) -> Result<Guid> {
        Ok(Guid::from_bytes(self.take()?))
    }
}
