//! Filter tree to a Lance SQL predicate.

use selfquery_core::filter::DATE_FORMAT;
use selfquery_core::types::find_attribute;
use selfquery_core::{Comparator, Error, FilterExpression, FilterValue, IndexConfig, Operator, Result};

use super::table::sql_quote;

/// Predicate selecting `namespace`, narrowed by `filter` when present.
pub fn build_predicate(config: &IndexConfig, namespace: &str, filter: Option<&FilterExpression>) -> Result<String> {
    let scope = format!("namespace = {}", sql_quote(namespace));
    match filter {
        None => Ok(scope),
        Some(f) => Ok(format!("{scope} AND ({})", to_sql(config, f)?)),
    }
}

/// Leaves are guarded with `IS NOT NULL` so a missing attribute makes the
/// leaf false rather than NULL, and `NOT` over it is then true.
pub fn to_sql(config: &IndexConfig, filter: &FilterExpression) -> Result<String> {
    match filter {
        FilterExpression::Composite { operator: Operator::Not, children } => match children.as_slice() {
            [only] => Ok(format!("NOT ({})", to_sql(config, only)?)),
            _ => Err(Error::InvalidFilter { reason: "not() takes exactly 1 argument".to_string() }),
        },
        FilterExpression::Composite { operator, children } => {
            if children.is_empty() {
                return Err(Error::InvalidFilter { reason: format!("{}() needs at least 1 argument", operator.as_str()) });
            }
            let joiner = if *operator == Operator::And { " AND " } else { " OR " };
            let parts = children
                .iter()
                .map(|c| to_sql(config, c).map(|s| format!("({s})")))
                .collect::<Result<Vec<_>>>()?;
            Ok(parts.join(joiner))
        }
        FilterExpression::Comparison { attribute, comparator, value } => {
            if find_attribute(&config.filterable_fields, attribute).is_none() {
                return Err(Error::UnknownAttribute { attribute: attribute.clone() });
            }
            let rhs = match (comparator, value) {
                (Comparator::In | Comparator::Nin, FilterValue::List(items)) => {
                    let items = items.iter().map(literal).collect::<Result<Vec<_>>>()?;
                    format!("({})", items.join(", "))
                }
                (_, v) => literal(v)?,
            };
            let op = match comparator {
                Comparator::Eq => "=",
                Comparator::Ne => "!=",
                Comparator::Gt => ">",
                Comparator::Gte => ">=",
                Comparator::Lt => "<",
                Comparator::Lte => "<=",
                Comparator::In => "IN",
                Comparator::Nin => "NOT IN",
                Comparator::Like => "LIKE",
            };
            Ok(format!("{attribute} IS NOT NULL AND {attribute} {op} {rhs}"))
        }
    }
}

fn literal(value: &FilterValue) -> Result<String> {
    match value {
        FilterValue::Bool(b) => Ok(b.to_string()),
        FilterValue::Integer(i) => Ok(i.to_string()),
        FilterValue::Number(n) if n.is_finite() => Ok(n.to_string()),
        FilterValue::Number(n) => Err(Error::InvalidFilter { reason: format!("{n} is not a finite number") }),
        FilterValue::Date(d) => Ok(format!("date '{}'", d.format(DATE_FORMAT))),
        FilterValue::String(s) => Ok(sql_quote(s)),
        FilterValue::List(_) => Err(Error::InvalidFilter { reason: "nested lists are not supported".to_string() }),
    }
}
