//! Resource modification events.
//!
//! Events arrive from the write path after a change has committed. They are
//! deliberately unvalidated on construction so that a malformed upstream
//! event can still be represented and rejected by the matcher with a typed
//! error instead of panicking at the boundary.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EventError;
use crate::resource::ResourceRef;

/// The kind of change an event describes.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One committed change to one resource.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationEvent {
    pub event_id: Uuid,
    pub resource_type: String,
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    pub operation: OperationKind,
    pub timestamp: DateTime<Utc>,
}

impl ModificationEvent {
    /// Builds an event from raw parts without validating them.
    #[must_use]
    pub fn from_parts(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        operation: OperationKind,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            version: None,
            operation,
            timestamp: Utc::now(),
        }
    }

    fn for_ref(reference: &ResourceRef, operation: OperationKind) -> Self {
        let mut event = Self::from_parts(reference.resource_type(), reference.id(), operation);
        event.version = reference.version();
        event
    }

    /// A create event for `reference`, stamped now.
    #[must_use]
    pub fn created(reference: &ResourceRef) -> Self {
        Self::for_ref(reference, OperationKind::Create)
    }

    /// An update event.
    #[must_use]
    pub fn updated(reference: &ResourceRef) -> Self {
        Self::for_ref(reference, OperationKind::Update)
    }

    /// A delete event.
    #[must_use]
    pub fn deleted(reference: &ResourceRef) -> Self {
        Self::for_ref(reference, OperationKind::Delete)
    }

    /// Resolves the unversioned identity this event refers to.
    pub fn resource_ref(&self) -> Result<ResourceRef, EventError> {
        ResourceRef::new(self.resource_type.as_str(), self.resource_id.as_str())
    }
}
