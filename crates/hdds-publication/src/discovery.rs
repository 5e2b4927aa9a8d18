// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery collaborator contract and the match record it reports.
//!
//! Discovery announces the publication, matches it against remote readers
//! and reports each match through `PublicationEngine::add_association`.

use crate::error::Result;
use crate::qos::DataWriterQos;
use crate::types::Guid;

pub trait Discovery: Send + Sync {
    /// Announce a new publication; returns its assigned id.
    fn add_publication(&self, publisher: &Guid, qos: &DataWriterQos) -> Result<Guid>;

    fn update_publication_qos(&self, publication: &Guid, qos: &DataWriterQos) -> Result<()>;

    fn remove_publication(&self, publication: &Guid);

    /// Protocol-level liveliness (writer need not send DATAWRITER_LIVELINESS).
    fn supports_liveliness(&self) -> bool {
        false
    }
}

/// A remote reader matched by discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderAssociation {
    pub reader: Guid,
    /// Reader asked for TRANSIENT_LOCAL (or stronger) durability.
    pub durable: bool,
    /// Content filter class; empty when the reader is unfiltered.
    pub filter_class: String,
    pub filter_expression: String,
    pub filter_params: Vec<String>,
}

impl ReaderAssociation {
    pub fn new(reader: Guid) -> Self {
        Self {
            reader,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    #[must_use]
    pub fn filter(mut self, class: &str, expression: &str, params: Vec<String>) -> Self {
        self.filter_class = class.to_string();
        self.filter_expression = expression.to_string();
        self.filter_params = params;
        self
    }

    pub fn has_filter(&self) -> bool {
        !self.filter_expression.is_empty()
    }
}
