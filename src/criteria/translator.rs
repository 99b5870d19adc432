//! Match-URL criteria translation.
//!
//! Accepts `Type?name[:modifier]=value&...` (or the bare `name=value&...`
//! form) and compiles it against the resource definitions. Splitting on `&`,
//! `=` and `,` happens before percent-decoding, so `%2C` is a literal comma
//! inside a value.

use std::sync::Arc;

use crate::definition::{DefinitionRegistry, ResourceDefinition, SearchParamType};
use crate::error::CriteriaError;

use super::query::{Comparator, Condition, DateRange, Operand, SearchPredicate, StructuredQuery, Target, TextMatch};
use super::CriteriaTranslator;

/// Parameters that shape a result set rather than filter it. An existence
/// check has no use for them, so they are rejected rather than ignored.
const RESULT_PARAMETERS: &[&str] = &[
    "_sort",
    "_count",
    "_include",
    "_revinclude",
    "_summary",
    "_elements",
    "_total",
    "_contained",
    "_containedType",
    "_format",
    "_pretty",
];

/// Translator for the match-URL criteria language.
#[derive(Debug, Clone)]
pub struct MatchUrlTranslator {
    definitions: Arc<DefinitionRegistry>,
}

impl MatchUrlTranslator {
    /// Creates a translator validating against `definitions`.
    #[must_use]
    pub fn new(definitions: Arc<DefinitionRegistry>) -> Self {
        Self { definitions }
    }
}

impl Default for MatchUrlTranslator {
    fn default() -> Self {
        Self::new(Arc::new(DefinitionRegistry::standard()))
    }
}

impl CriteriaTranslator for MatchUrlTranslator {
    fn translate(&self, criteria: &str, resource_type: &str) -> Result<StructuredQuery, CriteriaError> {
        let criteria = criteria.trim();
        if criteria.is_empty() {
            return Err(CriteriaError::Empty);
        }

        let (prefix, params) = split_target(criteria);
        let target_type = prefix.unwrap_or(resource_type);

        let definition = self
            .definitions
            .get(target_type)
            .ok_or_else(|| CriteriaError::UnknownResourceType {
                resource_type: target_type.to_string(),
            })?;

        let mut query = StructuredQuery::new(definition.name());
        for clause in params.split('&').filter(|c| !c.is_empty()) {
            query.push(compile_clause(definition, clause)?);
        }

        Ok(query)
    }
}

/// Splits `Type?params` into the optional type prefix and the parameters.
fn split_target(criteria: &str) -> (Option<&str>, &str) {
    let criteria = criteria.trim_start_matches('/');
    if let Some((prefix, params)) = criteria.split_once('?') {
        let prefix = prefix.trim();
        return (if prefix.is_empty() { None } else { Some(prefix) }, params);
    }
    if criteria.contains('=') {
        (None, criteria)
    } else {
        (Some(criteria), "")
    }
}

fn compile_clause(definition: &ResourceDefinition, clause: &str) -> Result<SearchPredicate, CriteriaError> {
    let (raw_name, raw_value) = clause
        .split_once('=')
        .ok_or_else(|| CriteriaError::malformed(clause, "expected name=value"))?;

    let raw_name = percent_decode(raw_name).map_err(|reason| CriteriaError::malformed(clause, reason))?;
    let (name, modifier) = match raw_name.split_once(':') {
        Some((name, modifier)) => (name, Some(modifier)),
        None => (raw_name.as_str(), None),
    };

    if name.is_empty() {
        return Err(CriteriaError::malformed(clause, "missing parameter name"));
    }
    if raw_value.trim().is_empty() {
        return Err(CriteriaError::malformed(clause, format!("missing value for parameter '{name}'")));
    }
    if RESULT_PARAMETERS.contains(&name) {
        return Err(CriteriaError::UnsupportedParameter {
            parameter: name.to_string(),
        });
    }

    let (target, param_type, is_id) = match name {
        "_id" => (Target::Id, SearchParamType::Token, true),
        "_lastUpdated" => (Target::LastUpdated, SearchParamType::Date, false),
        _ => {
            let param = definition.param(name).ok_or_else(|| CriteriaError::UnknownParameter {
                resource_type: definition.name().to_string(),
                parameter: name.to_string(),
            })?;
            (Target::Attribute(param.path.clone()), param.param_type, false)
        }
    };

    let unsupported = |modifier: &str| CriteriaError::UnsupportedModifier {
        parameter: name.to_string(),
        modifier: modifier.to_string(),
    };

    let spec = ValueSpec {
        definition,
        parameter: name,
        param_type,
        is_id,
    };

    let condition = match modifier {
        None => Condition::AnyOf(spec.operands(clause, raw_value, TextMatch::StartsWith)?),
        Some("missing") if !is_id => Condition::Missing(parse_bool(name, raw_value)?),
        Some("not") if param_type == SearchParamType::Token => {
            Condition::NoneOf(spec.operands(clause, raw_value, TextMatch::StartsWith)?)
        }
        Some("exact") if param_type == SearchParamType::String => {
            Condition::AnyOf(spec.operands(clause, raw_value, TextMatch::Exact)?)
        }
        Some("contains") if param_type == SearchParamType::String => {
            Condition::AnyOf(spec.operands(clause, raw_value, TextMatch::Contains)?)
        }
        Some(other) => return Err(unsupported(other)),
    };

    Ok(SearchPredicate {
        parameter: name.to_string(),
        target,
        condition,
    })
}

struct ValueSpec<'a> {
    definition: &'a ResourceDefinition,
    parameter: &'a str,
    param_type: SearchParamType,
    is_id: bool,
}

impl ValueSpec<'_> {
    fn operands(&self, clause: &str, raw_value: &str, mode: TextMatch) -> Result<Vec<Operand>, CriteriaError> {
        raw_value
            .split(',')
            .map(|raw| {
                if raw.is_empty() {
                    return Err(CriteriaError::malformed(clause, "empty alternative in value list"));
                }
                let value = percent_decode(raw).map_err(|reason| CriteriaError::malformed(clause, reason))?;
                self.operand(value, mode)
            })
            .collect()
    }

    fn operand(&self, value: String, mode: TextMatch) -> Result<Operand, CriteriaError> {
        match self.param_type {
            SearchParamType::Token if self.is_id => Ok(Operand::Token(self.normalize_id(value))),
            SearchParamType::Token => Ok(Operand::Token(value)),
            SearchParamType::String => Ok(Operand::Text { value, mode }),
            SearchParamType::Reference => Ok(Operand::Reference(value)),
            SearchParamType::Number => {
                let (comparator, rest) = split_prefix(&value);
                let number = rest
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .ok_or_else(|| CriteriaError::invalid_value(self.parameter, &value, "expected a number"))?;
                Ok(Operand::Number {
                    comparator,
                    value: number,
                })
            }
            SearchParamType::Date => {
                let (comparator, rest) = split_prefix(&value);
                let date = DateRange::parse(rest).ok_or_else(|| {
                    CriteriaError::invalid_value(
                        self.parameter,
                        &value,
                        "expected YYYY, YYYY-MM, YYYY-MM-DD or an RFC 3339 date-time",
                    )
                })?;
                Ok(Operand::Date { comparator, value: date })
            }
        }
    }

    /// `_id=Type/id` is reduced to the bare id when the type is the query
    /// target; any other type is kept verbatim so it can never match an id.
    fn normalize_id(&self, value: String) -> String {
        match value.split_once('/') {
            Some((resource_type, id)) if resource_type == self.definition.name() => id.to_string(),
            _ => value,
        }
    }
}

fn split_prefix(value: &str) -> (Comparator, &str) {
    if value.len() > 2 && value.is_char_boundary(2) {
        if let Some(comparator) = Comparator::from_prefix(&value[..2]) {
            return (comparator, &value[2..]);
        }
    }
    (Comparator::Eq, value)
}

fn parse_bool(parameter: &str, value: &str) -> Result<bool, CriteriaError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(CriteriaError::invalid_value(parameter, other, "expected true or false")),
    }
}

fn percent_decode(s: &str) -> Result<String, String> {
    if !s.contains('%') {
        return Ok(s.to_string());
    }

    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = s.get(i + 1..i + 3).ok_or_else(|| "truncated percent escape".to_string())?;
            let byte = u8::from_str_radix(hex, 16).map_err(|_| format!("invalid percent escape '%{hex}'"))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).map_err(|_| "percent escapes do not decode to UTF-8".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translate(criteria: &str) -> Result<StructuredQuery, CriteriaError> {
        MatchUrlTranslator::default().translate(criteria, "Observation")
    }

    #[test]
    fn bare_and_prefixed_criteria_target_the_right_type() {
        let q = translate("status=final").unwrap();
        assert_eq!(q.resource_type(), "Observation");
        assert_eq!(q.predicates().len(), 1);

        let q = translate("Patient?gender=female").unwrap();
        assert_eq!(q.resource_type(), "Patient");

        let q = translate("/Observation?status=final&").unwrap();
        assert_eq!(q.resource_type(), "Observation");
        assert_eq!(q.predicates().len(), 1);

        let q = translate("Observation").unwrap();
        assert!(q.predicates().is_empty());
    }

    #[test]
    fn empty_value_is_malformed() {
        let err = translate("status=").unwrap_err();
        assert!(matches!(err, CriteriaError::Malformed { .. }), "got {err:?}");

        let err = translate("Observation?status").unwrap_err();
        assert!(matches!(err, CriteriaError::Malformed { .. }), "got {err:?}");

        let err = translate("   ").unwrap_err();
        assert_eq!(err, CriteriaError::Empty);
    }

    #[test]
    fn unknown_types_and_parameters_are_rejected() {
        assert_eq!(
            translate("Widget?status=final").unwrap_err(),
            CriteriaError::UnknownResourceType {
                resource_type: "Widget".to_string()
            }
        );
        assert_eq!(
            translate("Observation?colour=red").unwrap_err(),
            CriteriaError::UnknownParameter {
                resource_type: "Observation".to_string(),
                parameter: "colour".to_string(),
            }
        );
        assert!(matches!(
            translate("Observation?_count=10").unwrap_err(),
            CriteriaError::UnsupportedParameter { .. }
        ));
    }

    #[test]
    fn modifiers_are_checked_against_parameter_type() {
        let q = translate("Observation?status:not=final").unwrap();
        assert!(matches!(q.predicates()[0].condition, Condition::NoneOf(_)));

        let q = translate("Observation?value-string:contains=gluc").unwrap();
        assert!(matches!(
            &q.predicates()[0].condition,
            Condition::AnyOf(ops) if matches!(ops[0], Operand::Text { mode: TextMatch::Contains, .. })
        ));

        let q = translate("Observation?encounter:missing=true").unwrap();
        assert_eq!(q.predicates()[0].condition, Condition::Missing(true));

        assert!(matches!(
            translate("Observation?status:exact=final").unwrap_err(),
            CriteriaError::UnsupportedModifier { .. }
        ));
        assert!(matches!(
            translate("Observation?status:above=final").unwrap_err(),
            CriteriaError::UnsupportedModifier { .. }
        ));
        assert!(matches!(
            translate("Observation?status:missing=maybe").unwrap_err(),
            CriteriaError::InvalidValue { .. }
        ));
    }

    #[test]
    fn number_and_date_values_parse_prefixes() {
        let q = translate("Observation?value-quantity=gt5.5,le1").unwrap();
        let Condition::AnyOf(ops) = &q.predicates()[0].condition else {
            panic!("expected AnyOf");
        };
        assert_eq!(
            ops[0],
            Operand::Number {
                comparator: Comparator::Gt,
                value: 5.5
            }
        );
        assert_eq!(
            ops[1],
            Operand::Number {
                comparator: Comparator::Le,
                value: 1.0
            }
        );

        let q = translate("Observation?date=ge2024-01").unwrap();
        let Condition::AnyOf(ops) = &q.predicates()[0].condition else {
            panic!("expected AnyOf");
        };
        let Operand::Date { comparator, value } = &ops[0] else {
            panic!("expected date operand");
        };
        assert_eq!(*comparator, Comparator::Ge);
        assert_eq!(value.start().to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(value.end().to_rfc3339(), "2024-02-01T00:00:00+00:00");

        assert!(matches!(
            translate("Observation?value-quantity=abc").unwrap_err(),
            CriteriaError::InvalidValue { .. }
        ));
        assert!(matches!(
            translate("Observation?date=yesterday").unwrap_err(),
            CriteriaError::InvalidValue { .. }
        ));
    }

    #[test]
    fn id_parameter_accepts_typed_and_bare_forms() {
        let q = translate("Observation?_id=Observation/123").unwrap();
        assert_eq!(q.predicates()[0].target, Target::Id);
        assert_eq!(
            q.predicates()[0].condition,
            Condition::AnyOf(vec![Operand::Token("123".to_string())])
        );

        let q = translate("Patient?_id=Observation/123").unwrap();
        assert_eq!(
            q.predicates()[0].condition,
            Condition::AnyOf(vec![Operand::Token("Observation/123".to_string())])
        );

        assert!(matches!(
            translate("Observation?_id:missing=true").unwrap_err(),
            CriteriaError::UnsupportedModifier { .. }
        ));
    }

    #[test]
    fn percent_escapes_are_decoded_per_alternative() {
        let q = translate("Observation?value-string=a%2Cb,c").unwrap();
        let Condition::AnyOf(ops) = &q.predicates()[0].condition else {
            panic!("expected AnyOf");
        };
        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[0], Operand::Text { value, .. } if value == "a,b"));

        assert!(matches!(
            translate("Observation?value-string=%zz").unwrap_err(),
            CriteriaError::Malformed { .. }
        ));
        assert!(matches!(
            translate("Observation?status=a,,b").unwrap_err(),
            CriteriaError::Malformed { .. }
        ));
    }
}
