//! Resource identity and stored resource records.
//!
//! A resource is addressed by its type and logical id (`Observation/123`).
//! Ids follow the usual `[A-Za-z0-9\-\.]{1,64}` rule and types are
//! capitalised alphanumeric names, so an identity can always be written into
//! a criteria string without escaping.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EventError;
use crate::value::Value;

static RESOURCE_TYPE_RE: OnceLock<Regex> = OnceLock::new();
static RESOURCE_ID_RE: OnceLock<Regex> = OnceLock::new();

/// Returns true if `s` is a legal resource type name.
#[must_use]
pub fn is_valid_resource_type(s: &str) -> bool {
    RESOURCE_TYPE_RE
        .get_or_init(|| Regex::new(r"^[A-Z][A-Za-z0-9]{0,63}$").expect("static regex"))
        .is_match(s)
}

/// Returns true if `s` is a legal logical resource id.
#[must_use]
pub fn is_valid_resource_id(s: &str) -> bool {
    RESOURCE_ID_RE
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9\-\.]{1,64}$").expect("static regex"))
        .is_match(s)
}

/// A validated `Type/id` reference, optionally pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    resource_type: String,
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<u64>,
}

impl ResourceRef {
    /// Creates a reference after validating both parts.
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Result<Self, EventError> {
        let resource_type = resource_type.into();
        let id = id.into();
        let resource_type = resource_type.trim();
        let id = id.trim();

        if resource_type.is_empty() {
            return Err(EventError::MissingResourceType);
        }
        if id.is_empty() {
            return Err(EventError::MissingResourceId);
        }
        if !is_valid_resource_type(resource_type) {
            return Err(EventError::InvalidResourceType {
                value: resource_type.to_string(),
            });
        }
        if !is_valid_resource_id(id) {
            return Err(EventError::InvalidResourceId {
                value: id.to_string(),
            });
        }

        Ok(Self {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
            version: None,
        })
    }

    /// Parses `Type/id` or `Type/id/_history/version`.
    pub fn parse(s: &str) -> Result<Self, EventError> {
        let s = s.trim().trim_start_matches('/');
        let mut parts = s.split('/');
        let resource_type = parts.next().unwrap_or_default();
        let id = parts.next().unwrap_or_default();
        let mut out = Self::new(resource_type, id)?;

        match (parts.next(), parts.next(), parts.next()) {
            (None, _, _) => {}
            (Some("_history"), Some(v), None) => {
                let version = v.parse::<u64>().map_err(|_| EventError::InvalidResourceId {
                    value: s.to_string(),
                })?;
                out.version = Some(version);
            }
            _ => {
                return Err(EventError::InvalidResourceId {
                    value: s.to_string(),
                })
            }
        }

        Ok(out)
    }

    /// Resource type, e.g. `Patient`.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Logical id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// History version, if the reference carried one.
    #[must_use]
    pub const fn version(&self) -> Option<u64> {
        self.version
    }

    /// Pins the reference to a specific version.
    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// The same reference without a version.
    #[must_use]
    pub fn to_unversioned(&self) -> Self {
        Self {
            resource_type: self.resource_type.clone(),
            id: self.id.clone(),
            version: None,
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)?;
        if let Some(v) = self.version {
            write!(f, "/_history/{v}")?;
        }
        Ok(())
    }
}

/// A stored resource: identity, store-assigned metadata and attributes.
///
/// `version` and `last_updated` are assigned by the store on commit; values
/// set by callers before writing are overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    resource_type: String,
    id: String,
    /// Committed version.
    pub version: u64,
    /// Commit time.
    pub last_updated: DateTime<Utc>,
    /// Searchable attributes by name.
    pub attributes: BTreeMap<String, Value>,
}

impl Resource {
    /// Creates an empty resource for the given identity.
    #[must_use]
    pub fn new(reference: &ResourceRef) -> Self {
        Self {
            resource_type: reference.resource_type().to_string(),
            id: reference.id().to_string(),
            version: 0,
            last_updated: Utc::now(),
            attributes: BTreeMap::new(),
        }
    }

    /// Sets an attribute, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Reads an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The unversioned reference of this resource.
    #[must_use]
    pub fn reference(&self) -> ResourceRef {
        ResourceRef {
            resource_type: self.resource_type.clone(),
            id: self.id.clone(),
            version: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_ref_parses_plain_and_versioned_forms() {
        let r = ResourceRef::parse("Observation/123").unwrap();
        assert_eq!(r.resource_type(), "Observation");
        assert_eq!(r.id(), "123");
        assert_eq!(r.version(), None);
        assert_eq!(r.to_string(), "Observation/123");

        let r = ResourceRef::parse("/Patient/a-1.b/_history/7").unwrap();
        assert_eq!(r.id(), "a-1.b");
        assert_eq!(r.version(), Some(7));
        assert_eq!(r.to_string(), "Patient/a-1.b/_history/7");
        assert_eq!(r.to_unversioned().to_string(), "Patient/a-1.b");
    }

    #[test]
    fn resource_ref_rejects_missing_parts() {
        assert_eq!(ResourceRef::parse("Observation"), Err(EventError::MissingResourceId));
        assert_eq!(ResourceRef::new("  ", "1"), Err(EventError::MissingResourceType));
        assert_eq!(ResourceRef::new("Observation", ""), Err(EventError::MissingResourceId));
    }

    #[test]
    fn resource_ref_rejects_illegal_parts() {
        assert!(matches!(
            ResourceRef::new("observation", "1"),
            Err(EventError::InvalidResourceType { .. })
        ));
        assert!(matches!(
            ResourceRef::new("Observation", "1&_id=2"),
            Err(EventError::InvalidResourceId { .. })
        ));
        assert!(matches!(
            ResourceRef::new("Observation", "x".repeat(65)),
            Err(EventError::InvalidResourceId { .. })
        ));
        assert!(ResourceRef::parse("Observation/1/_history/x").is_err());
        assert!(ResourceRef::parse("Observation/1/extra").is_err());
    }

    #[test]
    fn resource_builder_sets_attributes() {
        let r = ResourceRef::new("Observation", "1").unwrap();
        let res = Resource::new(&r).with("status", "final").with("value", 4.5);
        assert_eq!(res.get("status"), Some(&Value::from("final")));
        assert_eq!(res.get("value").and_then(Value::as_float), Some(4.5));
        assert_eq!(res.reference(), r);
        assert!(res.get("missing").is_none());
    }
}
