//! Compiled, executable form of subscription criteria.
//!
//! A `StructuredQuery` is a conjunction of predicates over one resource type
//! plus the identity constraint the matcher pins it to. Stores may evaluate
//! it natively; `StructuredQuery::matches` is the reference semantics.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::resource::{Resource, ResourceRef};
use crate::value::Value;

const FLOAT_TOLERANCE: f64 = 1e-9;

/// Comparison prefix for number and date values.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Comparator {
    #[default]
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl Comparator {
    /// Parses a two-letter search prefix.
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "lt" => Some(Self::Lt),
            "ge" => Some(Self::Ge),
            "le" => Some(Self::Le),
            _ => None,
        }
    }

    fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            Self::Eq => ordering == Equal,
            Self::Ne => ordering != Equal,
            Self::Gt => ordering == Greater,
            Self::Lt => ordering == Less,
            Self::Ge => ordering != Less,
            Self::Le => ordering != Greater,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Ge => "ge",
            Self::Le => "le",
        };
        write!(f, "{s}")
    }
}

/// How string parameters compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextMatch {
    /// Case-insensitive prefix match.
    #[default]
    StartsWith,
    /// Exact, case-sensitive match (`:exact`).
    Exact,
    /// Case-insensitive substring match (`:contains`).
    Contains,
}

/// A half-open `[start, end)` span of time.
///
/// A date is as wide as the precision it was written at: `2024` covers the
/// whole year, `2024-05-01` the whole day and a date-time one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateRange {
    /// Parses `YYYY`, `YYYY-MM`, `YYYY-MM-DD`, `YYYY-MM-DDThh:mm:ss` (UTC)
    /// or an RFC 3339 date-time.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Self::one_second(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
            return Self::one_second(Utc.from_utc_datetime(&naive));
        }

        let (start, end) = match s.len() {
            4 if s.bytes().all(|b| b.is_ascii_digit()) => {
                let year: i32 = s.parse().ok()?;
                (NaiveDate::from_ymd_opt(year, 1, 1)?, NaiveDate::from_ymd_opt(year + 1, 1, 1)?)
            }
            7 => {
                let first = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d").ok()?;
                let next = if first.month() == 12 {
                    NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)?
                };
                (first, next)
            }
            10 => {
                let day = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
                (day, day.succ_opt()?)
            }
            _ => return None,
        };

        Some(Self {
            start: Utc.from_utc_datetime(&start.and_hms_opt(0, 0, 0)?),
            end: Utc.from_utc_datetime(&end.and_hms_opt(0, 0, 0)?),
        })
    }

    /// The range holding exactly one instant.
    #[must_use]
    pub fn instant(at: DateTime<Utc>) -> Self {
        Self {
            start: at,
            end: at.checked_add_signed(Duration::nanoseconds(1)).unwrap_or(at),
        }
    }

    fn one_second(start: DateTime<Utc>) -> Option<Self> {
        Some(Self {
            start,
            end: start.checked_add_signed(Duration::seconds(1))?,
        })
    }

    /// Inclusive start.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive end.
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// True if `stored` satisfies `comparator` against this search range.
    ///
    /// `eq` requires `stored` to lie inside the range. The ordering
    /// comparators hold when some part of `stored` lies on the named side.
    fn admits(&self, comparator: Comparator, stored: &Self) -> bool {
        let contained = self.start <= stored.start && stored.end <= self.end;
        match comparator {
            Comparator::Eq => contained,
            Comparator::Ne => !contained,
            Comparator::Gt => stored.end > self.end,
            Comparator::Lt => stored.start < self.start,
            Comparator::Ge => stored.end > self.start,
            Comparator::Le => stored.start < self.end,
        }
    }
}

/// A single search value.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Token(String),
    Text { value: String, mode: TextMatch },
    Number { comparator: Comparator, value: f64 },
    Date { comparator: Comparator, value: DateRange },
    Reference(String),
}

impl Operand {
    fn matches(&self, stored: &Value) -> bool {
        match self {
            Self::Token(expected) => token_matches(expected, stored),
            Self::Text { value, mode } => stored.as_string().is_some_and(|s| text_matches(value, *mode, s)),
            Self::Number { comparator, value } => stored.as_float().is_some_and(|actual| {
                let ordering = if (actual - value).abs() <= FLOAT_TOLERANCE {
                    std::cmp::Ordering::Equal
                } else if actual < *value {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Greater
                };
                comparator.holds(ordering)
            }),
            Self::Date { comparator, value } => {
                date_range_of(stored).is_some_and(|actual| value.admits(*comparator, &actual))
            }
            Self::Reference(expected) => stored.as_string().is_some_and(|s| reference_matches(expected, s)),
        }
    }
}

fn token_matches(expected: &str, stored: &Value) -> bool {
    if let Some(b) = stored.as_bool() {
        return expected.eq_ignore_ascii_case(if b { "true" } else { "false" });
    }
    if let Some(i) = stored.as_int() {
        return expected.parse::<i64>().is_ok_and(|e| e == i);
    }
    let Value::String(s) = stored else {
        return false;
    };

    if s == expected {
        return true;
    }
    // A bare code matches a stored `system|code` in any system.
    if !expected.contains('|') {
        if let Some((_, code)) = s.split_once('|') {
            return code == expected;
        }
    }
    // `|code` only matches codes stored without a system.
    expected.strip_prefix('|').is_some_and(|code| code == s)
}

fn text_matches(expected: &str, mode: TextMatch, stored: &str) -> bool {
    match mode {
        TextMatch::Exact => stored == expected,
        TextMatch::StartsWith => stored.to_lowercase().starts_with(&expected.to_lowercase()),
        TextMatch::Contains => stored.to_lowercase().contains(&expected.to_lowercase()),
    }
}

fn reference_matches(expected: &str, stored: &str) -> bool {
    if stored == expected {
        return true;
    }
    if expected.contains('/') {
        return false;
    }
    stored.rsplit_once('/').is_some_and(|(_, id)| id == expected)
}

fn date_range_of(value: &Value) -> Option<DateRange> {
    match value {
        Value::String(s) => DateRange::parse(s),
        other => other.as_instant().map(DateRange::instant),
    }
}

/// What a predicate reads from a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The logical id.
    Id,
    /// The store-assigned last-updated instant.
    LastUpdated,
    /// A named attribute.
    Attribute(String),
}

/// The test applied to the values read by a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// At least one stored value matches at least one operand.
    AnyOf(Vec<Operand>),
    /// No stored value matches any operand (`:not`).
    NoneOf(Vec<Operand>),
    /// `true`: the attribute is absent; `false`: it is present.
    Missing(bool),
}

/// One `name[:modifier]=value` clause after compilation.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPredicate {
    /// Parameter name as written in the criteria.
    pub parameter: String,
    pub target: Target,
    pub condition: Condition,
}

impl SearchPredicate {
    /// Evaluates this predicate against a resource.
    #[must_use]
    pub fn matches(&self, resource: &Resource) -> bool {
        let stored: Vec<Value> = match &self.target {
            Target::Id => vec![Value::String(resource.id().to_string())],
            Target::LastUpdated => vec![Value::Instant(resource.last_updated)],
            Target::Attribute(path) => resource
                .get(path)
                .map(|v| v.scalars().into_iter().cloned().collect())
                .unwrap_or_default(),
        };

        match &self.condition {
            Condition::Missing(expect_missing) => stored.is_empty() == *expect_missing,
            Condition::AnyOf(operands) => stored.iter().any(|v| operands.iter().any(|o| o.matches(v))),
            Condition::NoneOf(operands) => !stored.iter().any(|v| operands.iter().any(|o| o.matches(v))),
        }
    }
}

/// A compiled query over one resource type.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredQuery {
    resource_type: String,
    predicates: Vec<SearchPredicate>,
    identity: Option<ResourceRef>,
    limit: Option<usize>,
}

impl StructuredQuery {
    /// An unscoped, unlimited query with no predicates.
    #[must_use]
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            predicates: Vec::new(),
            identity: None,
            limit: None,
        }
    }

    /// Adds a predicate; all predicates must hold.
    pub fn push(&mut self, predicate: SearchPredicate) {
        self.predicates.push(predicate);
    }

    /// Pins the query to exactly one resource.
    #[must_use]
    pub fn with_identity(mut self, identity: ResourceRef) -> Self {
        self.identity = Some(identity.to_unversioned());
        self
    }

    /// Caps the number of resources a store returns.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Type the query searches.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Predicates in clause order.
    #[must_use]
    pub fn predicates(&self) -> &[SearchPredicate] {
        &self.predicates
    }

    /// The resource the query is pinned to, if any.
    #[must_use]
    pub const fn identity(&self) -> Option<&ResourceRef> {
        self.identity.as_ref()
    }

    /// Maximum resources to return, if capped.
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// True if `resource` satisfies the identity constraint and every
    /// predicate.
    #[must_use]
    pub fn matches(&self, resource: &Resource) -> bool {
        if resource.resource_type() != self.resource_type {
            return false;
        }
        if let Some(identity) = &self.identity {
            if identity.resource_type() != resource.resource_type() || identity.id() != resource.id() {
                return false;
            }
        }
        self.predicates.iter().all(|p| p.matches(resource))
    }
}
