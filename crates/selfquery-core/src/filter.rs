//! Structured metadata filter tree.
//!
//! A filter arrives from the translation oracle as untrusted text, is parsed
//! into [`FilterExpression`], and must pass [`FilterExpression::validated`]
//! against the governing attribute schema before any store sees it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::types::{find_attribute, AttributeInfo, AttributeType};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Like,
}

impl Comparator {
    pub const ALL: [Comparator; 9] = [
        Self::Eq,
        Self::Ne,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::In,
        Self::Nin,
        Self::Like,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::Nin => "nin",
            Self::Like => "like",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    fn is_ordering(self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }

    fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::Nin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    And,
    Or,
    Not,
}

impl Operator {
    pub const ALL: [Operator; 3] = [Self::And, Self::Or, Self::Not];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.as_str() == name)
    }
}

/// Literal on the right-hand side of a comparison.
///
/// Deserialized dates come back as `String`; [`FilterExpression::validated`]
/// turns them into `Date` for date attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Integer(i64),
    Number(f64),
    String(String),
    Date(NaiveDate),
    List(Vec<FilterValue>),
}

impl FilterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Integer(i) => Some(*i as f64),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for FilterValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for FilterValue {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<NaiveDate> for FilterValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Date(d) => write!(f, "date(\"{}\")", d.format(DATE_FORMAT)),
            Self::String(s) => write!(f, "{}", serde_json::Value::String(s.clone())),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Leaf comparison or boolean composite over child expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FilterExpression {
    Comparison {
        attribute: String,
        comparator: Comparator,
        value: FilterValue,
    },
    Composite {
        operator: Operator,
        children: Vec<FilterExpression>,
    },
}

impl FilterExpression {
    pub fn compare(attribute: impl Into<String>, comparator: Comparator, value: impl Into<FilterValue>) -> Self {
        Self::Comparison { attribute: attribute.into(), comparator, value: value.into() }
    }

    pub fn eq(attribute: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::compare(attribute, Comparator::Eq, value)
    }

    pub fn and(children: Vec<FilterExpression>) -> Self {
        Self::Composite { operator: Operator::And, children }
    }

    pub fn or(children: Vec<FilterExpression>) -> Self {
        Self::Composite { operator: Operator::Or, children }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: FilterExpression) -> Self {
        Self::Composite { operator: Operator::Not, children: vec![child] }
    }

    /// Attribute names referenced by every leaf, in tree order.
    pub fn attributes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_attributes(&mut out);
        out
    }

    fn collect_attributes<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Comparison { attribute, .. } => out.push(attribute),
            Self::Composite { children, .. } => {
                for c in children {
                    c.collect_attributes(out);
                }
            }
        }
    }

    /// Check the tree against `schema` and normalize literals to the declared
    /// attribute types (e.g. date strings become [`FilterValue::Date`]).
    pub fn validated(self, schema: &[AttributeInfo]) -> Result<Self> {
        match self {
            Self::Comparison { attribute, comparator, value } => {
                let Some(attr) = find_attribute(schema, &attribute) else {
                    return Err(Error::UnknownAttribute { attribute });
                };
                let value = coerce_value(attr, comparator, value)?;
                Ok(Self::Comparison { attribute, comparator, value })
            }
            Self::Composite { operator, children } => {
                match (operator, children.len()) {
                    (Operator::Not, 1) => {}
                    (Operator::Not, n) => {
                        return Err(Error::InvalidFilter { reason: format!("not() takes exactly 1 argument, got {n}") })
                    }
                    (_, 0) => {
                        return Err(Error::InvalidFilter {
                            reason: format!("{}() needs at least 1 argument", operator.as_str()),
                        })
                    }
                    _ => {}
                }
                let children = children
                    .into_iter()
                    .map(|c| c.validated(schema))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::Composite { operator, children })
            }
        }
    }
}

fn coerce_value(attr: &AttributeInfo, comparator: Comparator, value: FilterValue) -> Result<FilterValue> {
    match (comparator.takes_list(), value) {
        (true, FilterValue::List(items)) => {
            if items.is_empty() {
                return Err(invalid(attr, comparator, "needs a non-empty list"));
            }
            let items = items
                .into_iter()
                .map(|v| coerce_scalar(attr, comparator, v))
                .collect::<Result<Vec<_>>>()?;
            Ok(FilterValue::List(items))
        }
        (true, _) => Err(invalid(attr, comparator, "needs a list value")),
        (false, FilterValue::List(_)) => Err(invalid(attr, comparator, "does not accept a list")),
        (false, v) => coerce_scalar(attr, comparator, v),
    }
}

fn coerce_scalar(attr: &AttributeInfo, comparator: Comparator, value: FilterValue) -> Result<FilterValue> {
    if comparator == Comparator::Like && attr.attr_type != AttributeType::String {
        return Err(invalid(attr, comparator, "is only supported on string attributes"));
    }
    match (attr.attr_type, value) {
        (AttributeType::String, v @ FilterValue::String(_)) => Ok(v),
        #[allow(clippy::cast_possible_truncation)]
        (AttributeType::Integer, FilterValue::Number(n)) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
            Ok(FilterValue::Integer(n as i64))
        }
        (AttributeType::Integer | AttributeType::Number, v @ (FilterValue::Integer(_) | FilterValue::Number(_))) => {
            Ok(v)
        }
        (AttributeType::Boolean, v @ FilterValue::Bool(_)) => {
            if comparator.is_ordering() {
                Err(invalid(attr, comparator, "cannot order boolean values"))
            } else {
                Ok(v)
            }
        }
        (AttributeType::Date, v @ FilterValue::Date(_)) => Ok(v),
        (AttributeType::Date, FilterValue::String(s)) => NaiveDate::parse_from_str(&s, DATE_FORMAT)
            .map(FilterValue::Date)
            .map_err(|_| invalid(attr, comparator, &format!("expects a YYYY-MM-DD date, got \"{s}\""))),
        (ty, v) => Err(invalid(attr, comparator, &format!("cannot compare {ty} attribute with {v}"))),
    }
}

fn invalid(attr: &AttributeInfo, comparator: Comparator, what: &str) -> Error {
    Error::InvalidFilter { reason: format!("{}(\"{}\", ..) {what}", comparator.as_str(), attr.name) }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comparison { attribute, comparator, value } => {
                write!(f, "{}({}, {value})", comparator.as_str(), serde_json::Value::String(attribute.clone()))
            }
            Self::Composite { operator, children } => {
                write!(f, "{}(", operator.as_str())?;
                for (i, c) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Vec<AttributeInfo> {
        vec![
            AttributeInfo::new("country", AttributeType::String, "country the city is in"),
            AttributeInfo::new("population", AttributeType::Integer, "inhabitants"),
            AttributeInfo::new("rating", AttributeType::Number, "visitor rating"),
            AttributeInfo::new("capital", AttributeType::Boolean, "is a capital city"),
            AttributeInfo::new("founded", AttributeType::Date, "founding date"),
        ]
    }

    #[test]
    fn date_strings_are_normalized() {
        let f = FilterExpression::compare("founded", Comparator::Gt, "1600-01-01")
            .validated(&schema())
            .expect("valid");
        let FilterExpression::Comparison { value, .. } = f else { panic!("leaf") };
        assert_eq!(value, FilterValue::Date(NaiveDate::from_ymd_opt(1600, 1, 1).expect("date")));
    }

    #[test]
    fn integral_numbers_become_integers() {
        let f = FilterExpression::compare("population", Comparator::Gte, 1_000_000.0)
            .validated(&schema())
            .expect("valid");
        assert_eq!(f, FilterExpression::compare("population", Comparator::Gte, 1_000_000_i64));
    }

    #[test]
    fn like_on_number_is_rejected() {
        let err = FilterExpression::compare("rating", Comparator::Like, 3.5).validated(&schema());
        assert!(matches!(err, Err(Error::InvalidFilter { .. })));
    }

    #[test]
    fn ordering_booleans_is_rejected() {
        let err = FilterExpression::compare("capital", Comparator::Gt, true).validated(&schema());
        assert!(matches!(err, Err(Error::InvalidFilter { .. })));
    }

    #[test]
    fn in_requires_list() {
        let err = FilterExpression::compare("country", Comparator::In, "Japan").validated(&schema());
        assert!(matches!(err, Err(Error::InvalidFilter { .. })));
        let ok = FilterExpression::compare("country", Comparator::In, vec!["Japan", "France"]).validated(&schema());
        assert!(ok.is_ok());
    }

    #[test]
    fn composite_arity_is_enforced() {
        let empty_and = FilterExpression::and(vec![]).validated(&schema());
        assert!(matches!(empty_and, Err(Error::InvalidFilter { .. })));
        let two_not = FilterExpression::Composite {
            operator: Operator::Not,
            children: vec![FilterExpression::eq("country", "Japan"), FilterExpression::eq("capital", true)],
        }
        .validated(&schema());
        assert!(matches!(two_not, Err(Error::InvalidFilter { .. })));
    }

    #[test]
    fn unknown_attribute_is_named() {
        let f = FilterExpression::and(vec![
            FilterExpression::eq("country", "Japan"),
            FilterExpression::not(FilterExpression::eq("continent", "Asia")),
        ]);
        match f.validated(&schema()) {
            Err(Error::UnknownAttribute { attribute }) => assert_eq!(attribute, "continent"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn display_renders_dsl() {
        let f = FilterExpression::and(vec![
            FilterExpression::eq("country", "Japan"),
            FilterExpression::compare("population", Comparator::Gt, 2_000_000_i64),
        ]);
        assert_eq!(f.to_string(), r#"and(eq("country", "Japan"), gt("population", 2000000))"#);
    }
}
