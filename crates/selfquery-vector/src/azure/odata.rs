//! Filter tree to an OData `$filter` expression.

use selfquery_core::filter::DATE_FORMAT;
use selfquery_core::{Comparator, Error, FilterExpression, FilterValue, Operator, Result};

pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Filter selecting `namespace`, narrowed by `filter` when present.
pub fn build_filter(namespace: &str, filter: Option<&FilterExpression>) -> Result<String> {
    let scope = format!("namespace eq {}", quote(namespace));
    match filter {
        None => Ok(scope),
        Some(f) => Ok(format!("{scope} and ({})", to_odata(f)?)),
    }
}

pub fn to_odata(filter: &FilterExpression) -> Result<String> {
    match filter {
        FilterExpression::Composite { operator: Operator::Not, children } => match children.as_slice() {
            [only] => Ok(format!("not ({})", to_odata(only)?)),
            _ => Err(Error::InvalidFilter { reason: "not() takes exactly 1 argument".to_string() }),
        },
        FilterExpression::Composite { operator, children } => {
            if children.is_empty() {
                return Err(Error::InvalidFilter { reason: format!("{}() needs at least 1 argument", operator.as_str()) });
            }
            let joiner = if *operator == Operator::And { " and " } else { " or " };
            let parts = children
                .iter()
                .map(|c| to_odata(c).map(|s| format!("({s})")))
                .collect::<Result<Vec<_>>>()?;
            Ok(parts.join(joiner))
        }
        FilterExpression::Comparison { attribute, comparator, value } => comparison(attribute, *comparator, value),
    }
}

/// OData treats `null ne x` as true; `ne` and `nin` are guarded so a missing
/// attribute makes every leaf false.
fn comparison(attribute: &str, comparator: Comparator, value: &FilterValue) -> Result<String> {
    let op = match comparator {
        Comparator::Eq => "eq",
        Comparator::Ne => return Ok(format!("({attribute} ne null and {attribute} ne {})", literal(value)?)),
        Comparator::Gt => "gt",
        Comparator::Gte => "ge",
        Comparator::Lt => "lt",
        Comparator::Lte => "le",
        Comparator::In => return membership(attribute, value),
        Comparator::Nin => {
            return membership(attribute, value).map(|m| format!("({attribute} ne null and not {m})"))
        }
        Comparator::Like => {
            return Err(Error::InvalidFilter { reason: "like() is not supported by Azure AI Search filters".to_string() })
        }
    };
    Ok(format!("{attribute} {op} {}", literal(value)?))
}

/// `search.in` for string lists; an `or` chain otherwise.
fn membership(attribute: &str, value: &FilterValue) -> Result<String> {
    let FilterValue::List(items) = value else {
        return Err(Error::InvalidFilter { reason: format!("in(\"{attribute}\", ..) needs a list value") });
    };
    let strings: Option<Vec<&str>> = items
        .iter()
        .map(|v| match v {
            FilterValue::String(s) if !s.contains('|') => Some(s.as_str()),
            _ => None,
        })
        .collect();
    if let Some(strings) = strings {
        return Ok(format!("search.in({attribute}, {}, '|')", quote(&strings.join("|"))));
    }
    let parts = items
        .iter()
        .map(|v| literal(v).map(|l| format!("{attribute} eq {l}")))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("({})", parts.join(" or ")))
}

fn literal(value: &FilterValue) -> Result<String> {
    match value {
        FilterValue::Bool(b) => Ok(b.to_string()),
        FilterValue::Integer(i) => Ok(i.to_string()),
        FilterValue::Number(n) if n.is_finite() => Ok(n.to_string()),
        FilterValue::Number(n) => Err(Error::InvalidFilter { reason: format!("{n} is not a finite number") }),
        FilterValue::Date(d) => Ok(format!("{}T00:00:00Z", d.format(DATE_FORMAT))),
        FilterValue::String(s) => Ok(quote(s)),
        FilterValue::List(_) => Err(Error::InvalidFilter { reason: "lists are only valid with in()/nin()".to_string() }),
    }
}
