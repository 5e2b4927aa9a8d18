// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed DataWriter facade over [`PublicationEngine`].

use crate::config::EngineConfig;
use crate::engine::{EngineContext, PublicationEngine, SampleData};
use crate::error::{Error, Result};
use crate::filter::FieldMap;
use crate::qos::DataWriterQos;
use crate::types::{InstanceHandle, SequenceNumber, Timestamp};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Encode contract for published types.
pub trait DdsSample: Send + Sync + 'static {
    /// Upper bound of the encoded size, used to size the buffer.
    fn encoded_size(&self) -> usize;

    /// Encode into `buf`, returning the bytes written.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the buffer is too small or encoding fails.
    fn encode(&self, buf: &mut [u8]) -> Result<usize>;

    /// Encode the key fields only. Keyless types return an empty key.
    fn encode_key(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    /// Field values for writer-side content filtering.
    ///
    /// Empty by default: samples of such types are never filtered out.
    fn fields(&self) -> FieldMap {
        FieldMap::new()
    }

    /// Names of the key fields, for control-message filtering.
    fn key_fields() -> &'static [&'static str]
    where
        Self: Sized,
    {
        &[]
    }
}

fn serialization(e: Error) -> Error {
    match e {
        Error::SerializationError(_) => e,
        other => Error::SerializationError(other.to_string()),
    }
}

/// Typed DataWriter.
///
/// Serializes `T` and forwards to the shared engine; everything else
/// (statuses, associations, liveliness) is reachable via [`engine`](Self::engine).
pub struct DataWriter<T: DdsSample> {
    engine: Arc<PublicationEngine>,
    _phantom: PhantomData<fn(T)>,
}

impl<T: DdsSample> DataWriter<T> {
    /// Build an engine for `T`, filling the key field names from the type.
    pub fn create(qos: DataWriterQos, config: EngineConfig, mut ctx: EngineContext) -> Result<Self> {
        if ctx.key_fields.is_empty() {
            ctx.key_fields = T::key_fields().iter().map(|f| (*f).to_string()).collect();
        }
        Ok(Self::new(PublicationEngine::new(qos, config, ctx)?))
    }

    pub fn new(engine: Arc<PublicationEngine>) -> Self {
        Self {
            engine,
            _phantom: PhantomData,
        }
    }

    pub fn engine(&self) -> &Arc<PublicationEngine> {
        &self.engine
    }

    fn to_sample(msg: &T, timestamp: Timestamp) -> Result<SampleData> {
        let mut buf = vec![0u8; msg.encoded_size()];
        let len = msg.encode(&mut buf).map_err(serialization)?;
        buf.truncate(len);
        let key = msg.encode_key().map_err(serialization)?;
        let fields = msg.fields();
        let sample = SampleData::new(key, buf).with_timestamp(timestamp);
        Ok(if fields.is_empty() {
            sample
        } else {
            sample.with_fields(fields)
        })
    }

    fn encode_key(msg: &T) -> Result<Vec<u8>> {
        msg.encode_key().map_err(serialization)
    }

    pub fn write(&self, msg: &T) -> Result<SequenceNumber> {
        self.write_w_timestamp(msg, InstanceHandle::NIL, Timestamp::now())
    }

    pub fn write_w_timestamp(
        &self,
        msg: &T,
        handle: InstanceHandle,
        timestamp: Timestamp,
    ) -> Result<SequenceNumber> {
        let sample = Self::to_sample(msg, timestamp)?;
        self.engine.write(sample, handle)
    }

    pub fn register_instance(&self, msg: &T) -> Result<InstanceHandle> {
        let key = Self::encode_key(msg)?;
        self.engine.register_instance(key.into(), Timestamp::now())
    }

    /// Unregister by `handle`, or by the key of `msg` when `handle` is nil.
    pub fn unregister_instance(&self, msg: &T, handle: InstanceHandle) -> Result<()> {
        let key = Self::encode_key(msg)?;
        self.engine
            .unregister_instance(handle, Some(key.as_slice()), Timestamp::now())
    }

    pub fn dispose(&self, msg: &T, handle: InstanceHandle) -> Result<()> {
        let key = Self::encode_key(msg)?;
        self.engine
            .dispose_instance(handle, Some(key.as_slice()), Timestamp::now())
    }

    pub fn lookup_instance(&self, msg: &T) -> Result<InstanceHandle> {
        let key = Self::encode_key(msg)?;
        Ok(self.engine.lookup_instance(&key))
    }

    pub fn wait_for_acknowledgments(&self, max_wait: Duration) -> Result<()> {
        self.engine.wait_for_acknowledgments(max_wait)
    }
}

impl<T: DdsSample> Clone for DataWriter<T> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.engine))
    }
}

impl<T: DdsSample> std::fmt::Debug for DataWriter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataWriter")
            .field("type", &std::any::type_name::<T>())
            .field("engine", &self.engine)
            .finish()
    }
}
