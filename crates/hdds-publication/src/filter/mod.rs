// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Writer-side content filtering.
//!
//! Each matched reader may carry a filter class, an SQL-like expression and
//! parameters. Compiled expressions are shared through a participant-level
//! [`FilterCache`]; a reader record holds a [`FilterLease`] and releases its
//! reference when dropped.
//!
//! Only the SQL filter classes ([`SQL_FILTER_CLASSES`]) are evaluated here.
//! Any other class never excludes a reader on the writer side.

mod evaluator;
mod parser;

pub use evaluator::{evaluate, FieldMap, FieldValue, FilterError};
pub use parser::{parse_predicate, CompareOp, Operand, Predicate};

use crate::message::{MessageKind, QueuedItem};
use dashmap::DashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Filter classes evaluated by the writer.
pub const SQL_FILTER_CLASSES: &[&str] = &["DDSSQL", "HDDSSQL"];

/// A parsed expression plus the fields it references.
#[derive(Debug)]
pub struct CompiledFilter {
    expression: String,
    predicate: Predicate,
    fields: Vec<String>,
}

impl CompiledFilter {
    pub fn compile(expression: &str) -> Result<Self, FilterError> {
        let predicate = parse_predicate(expression)?;
        let fields = predicate.fields();
        Ok(Self {
            expression: expression.to_string(),
            predicate,
            fields,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn evaluate(&self, fields: &FieldMap, params: &[String]) -> Result<bool, FilterError> {
        evaluate(&self.predicate, fields, params)
    }

    /// True when every referenced field is one of `keys`.
    pub fn references_only(&self, keys: &[String]) -> bool {
        self.fields.iter().all(|f| keys.contains(f))
    }
}

struct CacheSlot {
    filter: Arc<CompiledFilter>,
    refs: usize,
}

/// Reference-counted cache of compiled expressions, keyed by expression text.
#[derive(Default)]
pub struct FilterCache {
    slots: DashMap<String, CacheSlot>,
}

impl FilterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile (or reuse) `expression` and take one reference on it.
    pub fn acquire(self: &Arc<Self>, expression: &str) -> Result<FilterLease, FilterError> {
        if let Some(mut slot) = self.slots.get_mut(expression) {
            slot.refs += 1;
            return Ok(FilterLease {
                cache: Arc::downgrade(self),
                filter: Arc::clone(&slot.filter),
            });
        }

        let compiled = Arc::new(CompiledFilter::compile(expression)?);
        let mut slot = self
            .slots
            .entry(expression.to_string())
            .or_insert_with(|| CacheSlot {
                filter: compiled,
                refs: 0,
            });
        slot.refs += 1;
        Ok(FilterLease {
            cache: Arc::downgrade(self),
            filter: Arc::clone(&slot.filter),
        })
    }

    fn release(&self, expression: &str) {
        let last = match self.slots.get_mut(expression) {
            Some(mut slot) => {
                slot.refs = slot.refs.saturating_sub(1);
                slot.refs == 0
            }
            None => false,
        };
        if last {
            self.slots.remove_if(expression, |_, slot| slot.refs == 0);
        }
    }

    /// Live references on `expression` (0 if not cached).
    pub fn ref_count(&self, expression: &str) -> usize {
        self.slots.get(expression).map(|s| s.refs).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// One reference on a cached [`CompiledFilter`]; released on drop.
pub struct FilterLease {
    cache: Weak<FilterCache>,
    filter: Arc<CompiledFilter>,
}

impl FilterLease {
    pub fn filter(&self) -> &CompiledFilter {
        &self.filter
    }
}

impl Drop for FilterLease {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.release(self.filter.expression());
        }
    }
}

impl fmt::Debug for FilterLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterLease")
            .field("expression", &self.filter.expression())
            .finish()
    }
}

/// Content filter attached to one reader association.
#[derive(Debug)]
pub struct ReaderFilter {
    class: String,
    lease: FilterLease,
    params: Vec<String>,
}

impl ReaderFilter {
    pub fn new(class: impl Into<String>, lease: FilterLease, params: Vec<String>) -> Self {
        Self {
            class: class.into(),
            lease,
            params,
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn expression(&self) -> &str {
        self.lease.filter().expression()
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn set_params(&mut self, params: Vec<String>) {
        self.params = params;
    }

    /// Whether the writer evaluates this filter at all.
    pub fn is_evaluated(&self) -> bool {
        SQL_FILTER_CLASSES.contains(&self.class.as_str())
    }

    /// True when a sample with these fields must not reach the reader.
    ///
    /// Evaluation errors never exclude.
    pub fn excludes_sample(&self, fields: &FieldMap) -> bool {
        if !self.is_evaluated() {
            return false;
        }
        match self.lease.filter().evaluate(fields, &self.params) {
            Ok(pass) => !pass,
            Err(e) => {
                log::debug!(
                    "[filter] '{}' not applied: {}",
                    self.lease.filter().expression(),
                    e
                );
                false
            }
        }
    }

    /// Instance control messages carry only key fields; a filter on any
    /// other field cannot be evaluated and excludes the message.
    pub fn excludes_control(&self, key_fields: &[String]) -> bool {
        self.is_evaluated() && !self.lease.filter().references_only(key_fields)
    }

    /// Whether a retained sample may be replayed to this reader.
    pub fn admits(&self, item: &QueuedItem) -> bool {
        if item.header.kind != MessageKind::SampleData {
            return true;
        }
        match &item.fields {
            Some(fields) => !self.excludes_sample(fields),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(id: i64) -> FieldMap {
        let mut f = FieldMap::new();
        f.insert("id".into(), FieldValue::Int(id));
        f.insert("value".into(), FieldValue::Float(1.0));
        f
    }

    #[test]
    fn test_cache_shares_and_releases() {
        let cache = Arc::new(FilterCache::new());
        let a = cache.acquire("id > 3").unwrap();
        let b = cache.acquire("id > 3").unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.ref_count("id > 3"), 2);
        drop(a);
        assert_eq!(cache.ref_count("id > 3"), 1);
        drop(b);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_rejects_bad_expression() {
        let cache = Arc::new(FilterCache::new());
        assert!(cache.acquire("id >").is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reader_filter_sample_and_control() {
        let cache = Arc::new(FilterCache::new());
        let lease = cache.acquire("id > %0 AND value < 5").unwrap();
        let filter = ReaderFilter::new("DDSSQL", lease, vec!["3".into()]);

        assert!(filter.excludes_sample(&fields(2)));
        assert!(!filter.excludes_sample(&fields(4)));
        // Snapshot without the field: evaluation error, not excluded.
        assert!(!filter.excludes_sample(&FieldMap::new()));

        assert!(filter.excludes_control(&["id".to_string()]));
        assert!(!filter.excludes_control(&["id".to_string(), "value".to_string()]));
    }

    #[test]
    fn test_foreign_filter_class_never_excludes() {
        let cache = Arc::new(FilterCache::new());
        let lease = cache.acquire("id > 100").unwrap();
        let filter = ReaderFilter::new("VENDOR_REGEX", lease, Vec::new());
        assert!(!filter.is_evaluated());
        assert!(!filter.excludes_sample(&fields(1)));
        assert!(!filter.excludes_control(&[]));
    }

    #[test]
    fn test_lease_outliving_cache_is_harmless() {
        let cache = Arc::new(FilterCache::new());
        let lease = cache.acquire("id = 1").unwrap();
        drop(cache);
        assert_eq!(lease.filter().fields(), &["id".to_string()]);
        drop(lease);
    }
}
