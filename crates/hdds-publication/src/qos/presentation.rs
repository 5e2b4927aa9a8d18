// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! PRESENTATION QoS policy of the owning publisher (DDS v1.4 Sec.2.2.3.12).

/// PRESENTATION access scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PresentationAccessScope {
    /// Each instance is independent. No transactional semantics.
    #[default]
    Instance = 0,
    /// All instances of a topic are presented together.
    Topic = 1,
    /// Multiple topics can be presented as one coherent set.
    Group = 2,
}

/// PRESENTATION QoS policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Presentation {
    pub access_scope: PresentationAccessScope,
    pub coherent_access: bool,
    pub ordered_access: bool,
}

impl Presentation {
    #[must_use]
    pub fn topic_coherent() -> Self {
        Self {
            access_scope: PresentationAccessScope::Topic,
            coherent_access: true,
            ordered_access: false,
        }
    }

    #[must_use]
    pub fn group_coherent() -> Self {
        Self {
            access_scope: PresentationAccessScope::Group,
            coherent_access: true,
            ordered_access: false,
        }
    }

    /// Coherent sets from this publisher span several writers.
    #[must_use]
    pub fn is_group_scope(&self) -> bool {
        self.access_scope == PresentationAccessScope::Group
    }
}
