//! Parsing of the language model's reply.
//!
//! The reply is untrusted text. It must contain one JSON object
//! (`{"query": .., "filter": .., "limit": ..}`), optionally inside a Markdown
//! code fence, whose `filter` is written in the function-call DSL:
//!
//! ```text
//! and(eq("country", "Japan"), gt("population", 2000000), in("tag", ["a", "b"]))
//! lt("founded", date("1900-01-01"))
//! ```

use chrono::NaiveDate;
use serde_json::Value;

use selfquery_core::filter::DATE_FORMAT;
use selfquery_core::{Comparator, Error, FilterExpression, FilterValue, Operator, Result};

/// Filter text meaning "no constraint".
pub const NO_FILTER: &str = "NO_FILTER";

/// Translator output before schema validation and limit policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuery {
    pub query: String,
    pub filter: Option<FilterExpression>,
    pub limit: Option<i64>,
}

fn parse_error(reason: impl Into<String>, output: &str) -> Error {
    Error::TranslationParse { reason: reason.into(), output: output.to_string() }
}

/// The JSON object embedded in `text`, ignoring fences and surrounding prose.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

pub fn parse_output(text: &str) -> Result<RawQuery> {
    let json = extract_json(text).ok_or_else(|| parse_error("no JSON object in output", text))?;
    let value: Value = serde_json::from_str(json).map_err(|e| parse_error(format!("invalid JSON: {e}"), text))?;
    let Value::Object(obj) = value else {
        return Err(parse_error("output is not a JSON object", text));
    };

    let query = match obj.get("query") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => return Err(parse_error(format!("\"query\" must be a string, got {other}"), text)),
    };

    let filter = match obj.get("filter") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() || s.trim() == NO_FILTER => None,
        Some(Value::String(s)) => Some(parse_filter(s).map_err(|reason| parse_error(reason, text))?),
        Some(other) => return Err(parse_error(format!("\"filter\" must be a string, got {other}"), text)),
    };

    let limit = match obj.get("limit") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Some(i),
            None => return Err(parse_error(format!("\"limit\" must be an integer, got {n}"), text)),
        },
        Some(other) => return Err(parse_error(format!("\"limit\" must be an integer, got {other}"), text)),
    };

    Ok(RawQuery { query, filter, limit })
}

/// Parse a DSL filter expression. Errors are human-readable reasons.
pub fn parse_filter(src: &str) -> std::result::Result<FilterExpression, String> {
    let mut p = Parser { src, pos: 0 };
    let expr = p.expression()?;
    p.skip_ws();
    if p.pos < src.len() {
        return Err(format!("unexpected trailing input at offset {}: {:?}", p.pos, &src[p.pos..]));
    }
    Ok(expr)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> std::result::Result<(), String> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(format!("expected '{c}' at offset {}", self.pos))
        }
    }

    fn ident(&mut self) -> std::result::Result<&'a str, String> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_')).unwrap_or(rest.len());
        if len == 0 {
            return Err(format!("expected a name at offset {}", self.pos));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn expression(&mut self) -> std::result::Result<FilterExpression, String> {
        let name = self.ident()?;
        let lowered = name.to_ascii_lowercase();
        self.expect('(')?;
        if let Some(op) = Operator::parse(&lowered) {
            let mut children = vec![self.expression()?];
            while self.eat(',') {
                children.push(self.expression()?);
            }
            self.expect(')')?;
            return Ok(FilterExpression::Composite { operator: op, children });
        }
        let comparator = Comparator::parse(&lowered).ok_or_else(|| format!("unknown function '{name}'"))?;
        let attribute = self.attribute()?;
        self.expect(',')?;
        let value = self.value()?;
        self.expect(')')?;
        Ok(FilterExpression::Comparison { attribute, comparator, value })
    }

    /// Quoted or bare attribute name.
    fn attribute(&mut self) -> std::result::Result<String, String> {
        self.skip_ws();
        match self.peek() {
            Some('"' | '\'') => self.string(),
            _ => self.ident().map(str::to_string),
        }
    }

    fn value(&mut self) -> std::result::Result<FilterValue, String> {
        self.skip_ws();
        match self.peek() {
            Some('"' | '\'') => self.string().map(FilterValue::String),
            Some('[') => {
                self.pos += 1;
                let mut items = Vec::new();
                if !self.eat(']') {
                    items.push(self.value()?);
                    while self.eat(',') {
                        items.push(self.value()?);
                    }
                    self.expect(']')?;
                }
                Ok(FilterValue::List(items))
            }
            Some(c) if c == '-' || c == '+' || c.is_ascii_digit() => self.number(),
            Some(_) => {
                let word = self.ident()?;
                match word.to_ascii_lowercase().as_str() {
                    "true" => Ok(FilterValue::Bool(true)),
                    "false" => Ok(FilterValue::Bool(false)),
                    "date" => {
                        self.expect('(')?;
                        let raw = self.string()?;
                        self.expect(')')?;
                        NaiveDate::parse_from_str(&raw, DATE_FORMAT)
                            .map(FilterValue::Date)
                            .map_err(|_| format!("invalid date \"{raw}\", expected YYYY-MM-DD"))
                    }
                    other => Err(format!("unexpected word '{other}' where a value was expected")),
                }
            }
            None => Err("unexpected end of filter".to_string()),
        }
    }

    fn number(&mut self) -> std::result::Result<FilterValue, String> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')))
            .unwrap_or(rest.len());
        let text = &rest[..len];
        self.pos += len;
        if let Ok(i) = text.parse::<i64>() {
            return Ok(FilterValue::Integer(i));
        }
        text.parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(FilterValue::Number)
            .ok_or_else(|| format!("invalid number {text:?}"))
    }

    fn string(&mut self) -> std::result::Result<String, String> {
        self.skip_ws();
        let quote = self.peek().ok_or("expected a string")?;
        let start = self.pos;
        self.pos += quote.len_utf8();
        let mut out = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, escaped)) => out.push(escaped),
                    None => break,
                },
                c if c == quote => {
                    self.pos += i + c.len_utf8();
                    return Ok(out);
                }
                c => out.push(c),
            }
        }
        Err(format!("unterminated string starting at offset {start}"))
    }
}
