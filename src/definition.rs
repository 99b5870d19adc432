//! Resource type definitions and their search parameters.
//!
//! The definition registry is the record-type registry the criteria
//! translator validates against: a parameter that is not declared on the
//! target type cannot appear in subscription criteria.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resource::is_valid_resource_type;

/// How a search parameter compares its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchParamType {
    /// Exact code match, optionally `system|code`.
    Token,
    /// Case-insensitive prefix match by default.
    String,
    /// Numeric comparison with `eq/ne/gt/lt/ge/le` prefixes.
    Number,
    /// Date/time comparison with the same prefixes as numbers.
    Date,
    /// Literal `Type/id` reference, or a bare id.
    Reference,
}

impl fmt::Display for SearchParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token => write!(f, "token"),
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Date => write!(f, "date"),
            Self::Reference => write!(f, "reference"),
        }
    }
}

/// A declared search parameter: its name, type and the attribute it reads.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParam {
    pub name: String,
    pub param_type: SearchParamType,
    pub path: String,
}

/// The searchable surface of one resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    name: String,
    params: BTreeMap<String, SearchParam>,
}

impl ResourceDefinition {
    /// A type with no search parameters yet.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Declares a search parameter reading attribute `path`.
    #[must_use]
    pub fn with_param(
        mut self,
        name: impl Into<String>,
        param_type: SearchParamType,
        path: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.params.insert(
            name.clone(),
            SearchParam {
                name,
                param_type,
                path: path.into(),
            },
        );
        self
    }

    /// Resource type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a declared parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&SearchParam> {
        self.params.get(name)
    }
}

/// Registry of resource definitions keyed by type name.
#[derive(Debug, Clone, Default)]
pub struct DefinitionRegistry {
    definitions: HashMap<String, ResourceDefinition>,
}

impl DefinitionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the clinical resource types most
    /// subscriptions are written against.
    #[must_use]
    pub fn standard() -> Self {
        use SearchParamType as P;

        let mut registry = Self::new();

        registry.insert(
            ResourceDefinition::new("Observation")
                .with_param("status", P::Token, "status")
                .with_param("code", P::Token, "code")
                .with_param("category", P::Token, "category")
                .with_param("subject", P::Reference, "subject")
                .with_param("patient", P::Reference, "subject")
                .with_param("encounter", P::Reference, "encounter")
                .with_param("date", P::Date, "effective")
                .with_param("value-quantity", P::Number, "valueQuantity")
                .with_param("value-string", P::String, "valueString"),
        );

        registry.insert(
            ResourceDefinition::new("Patient")
                .with_param("active", P::Token, "active")
                .with_param("gender", P::Token, "gender")
                .with_param("identifier", P::Token, "identifier")
                .with_param("name", P::String, "name")
                .with_param("family", P::String, "family")
                .with_param("given", P::String, "given")
                .with_param("birthdate", P::Date, "birthDate")
                .with_param("general-practitioner", P::Reference, "generalPractitioner"),
        );

        registry.insert(
            ResourceDefinition::new("Encounter")
                .with_param("status", P::Token, "status")
                .with_param("class", P::Token, "class")
                .with_param("subject", P::Reference, "subject")
                .with_param("patient", P::Reference, "subject")
                .with_param("date", P::Date, "period")
                .with_param("length", P::Number, "length"),
        );

        registry.insert(
            ResourceDefinition::new("DiagnosticReport")
                .with_param("status", P::Token, "status")
                .with_param("code", P::Token, "code")
                .with_param("category", P::Token, "category")
                .with_param("subject", P::Reference, "subject")
                .with_param("patient", P::Reference, "subject")
                .with_param("result", P::Reference, "result")
                .with_param("issued", P::Date, "issued")
                .with_param("conclusion", P::String, "conclusion"),
        );

        registry
    }

    fn insert(&mut self, definition: ResourceDefinition) {
        self.definitions.insert(definition.name.clone(), definition);
    }

    /// Registers (or replaces) a definition.
    ///
    /// Returns `false` and leaves the registry untouched if the type name is
    /// not a legal resource type.
    pub fn register(&mut self, definition: ResourceDefinition) -> bool {
        if !is_valid_resource_type(definition.name()) {
            return false;
        }
        self.insert(definition);
        true
    }

    /// Definition for `resource_type`, if registered.
    #[must_use]
    pub fn get(&self, resource_type: &str) -> Option<&ResourceDefinition> {
        self.definitions.get(resource_type)
    }

    /// True if `resource_type` is registered.
    #[must_use]
    pub fn contains(&self, resource_type: &str) -> bool {
        self.definitions.contains_key(resource_type)
    }

    /// Registered type names, sorted.
    #[must_use]
    pub fn resource_types(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        out.sort_unstable();
        out
    }
}
