//! Subscription values as seen by the matcher.
//!
//! The matcher only reads a subscription: its criteria drive the query and
//! its id and status are carried for logging. Deciding whether a
//! subscription is valid or active belongs to the caller.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a subscription, as recorded upstream.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Requested,
    #[default]
    Active,
    Error,
    Off,
}

/// A registered filter over one resource type.
///
/// `criteria` is a match expression such as `Observation?status=final` or
/// the bare form `status=final`, in which case the event's resource type is
/// the target.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub criteria: String,
    #[serde(default)]
    pub status: SubscriptionStatus,
    /// Why the subscription is in its current status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Subscription {
    /// Creates an active subscription with a fresh id.
    #[must_use]
    pub fn new(criteria: impl Into<String>) -> Self {
        Self {
            id: SubscriptionId::new(),
            criteria: criteria.into(),
            status: SubscriptionStatus::Active,
            reason: None,
        }
    }

    /// Replaces the generated id.
    #[must_use]
    pub fn with_id(mut self, id: SubscriptionId) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn with_status(mut self, status: SubscriptionStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// The raw criteria string.
    #[must_use]
    pub fn criteria(&self) -> &str {
        &self.criteria
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_defaults_to_active() {
        let sub = Subscription::new("Observation?status=final");
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.criteria(), "Observation?status=final");
        assert!(sub.reason.is_none());
    }

    #[test]
    fn subscription_deserializes_without_optional_fields() {
        let id = SubscriptionId::new();
        let json = format!(r#"{{"id":"{id}","criteria":"Patient?gender=female"}}"#);
        let sub: Subscription = serde_json::from_str(&json).unwrap();
        assert_eq!(sub.id, id);
        assert_eq!(sub.status, SubscriptionStatus::Active);
    }

    #[test]
    fn subscription_status_serializes_snake_case() {
        let sub = Subscription::new("Patient?").with_status(SubscriptionStatus::Off);
        let json = serde_json::to_value(&sub).unwrap();
        assert_eq!(json["status"], "off");
    }
}
