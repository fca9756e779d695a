//! Declarative field mapping: RawRecord → DomainRecord
//!
//! A [`FieldMapping`] is an ordered list of [`FieldRule`]s, one per target
//! field. Each rule resolves a value from the raw record (candidate headers
//! or a derivation) or, for configurable fields, from the session
//! configuration. It then falls back to the rule's built-in default and
//! finally coerces the result. Mapping is total: a malformed row degrades to
//! defaults, it never fails.

use crate::models::{DomainRecord, FieldValue, ImportConfiguration, ImportTarget, RawRecord};
use std::fmt;

/// Derivation over the whole raw record
pub type Derivation = fn(&RawRecord) -> Option<String>;

/// Where a field's value comes from
#[derive(Clone, Copy)]
pub enum FieldSource {
    /// Headers tried left to right; the first trimmed non-empty value wins
    Candidates(&'static [&'static str]),
    /// Computed from the record; replaces candidate lookup
    Derived(Derivation),
    /// Fixed value; always the rule's default
    Constant,
    /// Chosen per import through the session configuration
    Configured,
}

impl fmt::Debug for FieldSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSource::Candidates(headers) => f.debug_tuple("Candidates").field(headers).finish(),
            FieldSource::Derived(_) => f.write_str("Derived"),
            FieldSource::Constant => f.write_str("Constant"),
            FieldSource::Configured => f.write_str("Configured"),
        }
    }
}

/// Target type of a field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coercion {
    Text,
    /// Unparseable values become 0
    Integer,
    /// Unparseable values become 0.0
    Float,
    /// Documented value set; values outside it pass through to the store
    Enum(&'static [&'static str]),
}

impl Coercion {
    fn apply(&self, field: &str, value: Option<String>) -> FieldValue {
        match (self, value) {
            (Coercion::Integer, value) => FieldValue::Integer(
                value
                    .and_then(|v| v.trim().parse::<i64>().ok())
                    .unwrap_or(0),
            ),
            (Coercion::Float, value) => FieldValue::Float(
                value
                    .and_then(|v| v.trim().parse::<f64>().ok())
                    .filter(|f| f.is_finite())
                    .unwrap_or(0.0),
            ),
            (Coercion::Enum(allowed), Some(v)) => {
                if !allowed.contains(&v.as_str()) {
                    tracing::debug!(field, value = %v, "Value outside documented set, passing through");
                }
                FieldValue::Text(v)
            }
            (Coercion::Text, Some(v)) => FieldValue::Text(v),
            (Coercion::Text | Coercion::Enum(_), None) => FieldValue::Null,
        }
    }
}

/// Resolution rule for one target field
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: &'static str,
    pub source: FieldSource,
    pub default: Option<&'static str>,
    pub coercion: Coercion,
}

impl FieldRule {
    /// Text field read from candidate headers, no default
    pub const fn text(field: &'static str, candidates: &'static [&'static str]) -> Self {
        Self {
            field,
            source: FieldSource::Candidates(candidates),
            default: None,
            coercion: Coercion::Text,
        }
    }

    pub const fn with_default(self, default: &'static str) -> Self {
        Self {
            default: Some(default),
            ..self
        }
    }

    pub const fn coerce(self, coercion: Coercion) -> Self {
        Self { coercion, ..self }
    }

    pub const fn derived(field: &'static str, derivation: Derivation) -> Self {
        Self {
            field,
            source: FieldSource::Derived(derivation),
            default: None,
            coercion: Coercion::Text,
        }
    }

    pub const fn constant(field: &'static str, value: &'static str) -> Self {
        Self {
            field,
            source: FieldSource::Constant,
            default: Some(value),
            coercion: Coercion::Text,
        }
    }

    /// Set only through configuration (falls back to `default`)
    pub const fn configured(field: &'static str) -> Self {
        Self {
            field,
            source: FieldSource::Configured,
            default: None,
            coercion: Coercion::Text,
        }
    }

    pub fn is_configurable(&self) -> bool {
        matches!(self.source, FieldSource::Configured)
    }

    fn resolve(&self, raw: &RawRecord, configuration: &ImportConfiguration) -> FieldValue {
        let found = match self.source {
            FieldSource::Candidates(headers) => headers
                .iter()
                .find_map(|h| raw.non_empty(h))
                .map(str::to_string),
            FieldSource::Derived(derive) => derive(raw)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            FieldSource::Constant => None,
            FieldSource::Configured => configuration.get(self.field).map(str::to_string),
        };

        let value = found.or_else(|| self.default.map(str::to_string));

        self.coercion.apply(self.field, value)
    }
}

/// Rule set for one target type
#[derive(Debug)]
pub struct FieldMapping {
    pub target: ImportTarget,
    pub rules: &'static [FieldRule],
}

impl FieldMapping {
    pub fn rule(&self, field: &str) -> Option<&FieldRule> {
        self.rules.iter().find(|r| r.field == field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|r| r.field)
    }
}

/// Map one raw record; never fails
pub fn map(
    raw: &RawRecord,
    mapping: &FieldMapping,
    configuration: &ImportConfiguration,
) -> DomainRecord {
    let fields = mapping
        .rules
        .iter()
        .map(|rule| (rule.field, rule.resolve(raw, configuration)))
        .collect();
    DomainRecord::new(mapping.target, fields)
}

/// Mapper bound to one mapping and one session configuration
#[derive(Debug, Clone)]
pub struct FieldMapper {
    mapping: &'static FieldMapping,
    configuration: ImportConfiguration,
}

impl FieldMapper {
    pub fn new(mapping: &'static FieldMapping, configuration: ImportConfiguration) -> Self {
        Self {
            mapping,
            configuration,
        }
    }

    pub fn map(&self, raw: &RawRecord) -> DomainRecord {
        map(raw, self.mapping, &self.configuration)
    }
}
