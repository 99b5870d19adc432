//! Identity scoping: subscription criteria + event identity -> augmented criteria.

use std::fmt;

use crate::error::{CriteriaError, SubmatchResult};
use crate::event::ModificationEvent;
use crate::resource::ResourceRef;
use crate::subscription::Subscription;

/// The search parameter carrying record identity.
pub const ID_PARAM: &str = "_id";

/// Subscription criteria with the identity clause of one event appended.
///
/// Built per match call and never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AugmentedCriteria {
    criteria: String,
    identity: ResourceRef,
}

impl AugmentedCriteria {
    /// The full criteria string, identity clause included.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.criteria
    }

    /// The unversioned identity the criteria were scoped to.
    #[must_use]
    pub const fn identity(&self) -> &ResourceRef {
        &self.identity
    }
}

impl fmt::Display for AugmentedCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.criteria)
    }
}

/// Appends `_id=<Type>/<id>` to subscription criteria.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityFilterBuilder;

impl IdentityFilterBuilder {
    /// Builds the augmented criteria for `event`.
    ///
    /// The event identity is resolved first, so an unscoped event is always
    /// reported as `InvalidEvent` even when the criteria are also bad.
    ///
    /// # Errors
    /// - `MatchError::InvalidEvent` if the event has no legal type and id
    /// - `MatchError::CriteriaValidation` if the criteria are empty
    pub fn build(subscription: &Subscription, event: &ModificationEvent) -> SubmatchResult<AugmentedCriteria> {
        let identity = event.resource_ref()?.to_unversioned();

        let criteria = subscription.criteria().trim();
        if criteria.is_empty() {
            return Err(CriteriaError::Empty.into());
        }

        let separator = if criteria.ends_with('?') || criteria.ends_with('&') {
            ""
        } else if !criteria.contains('?') && !criteria.contains('=') {
            "?"
        } else {
            "&"
        };

        Ok(AugmentedCriteria {
            criteria: format!("{criteria}{separator}{ID_PARAM}={identity}"),
            identity,
        })
    }
}
