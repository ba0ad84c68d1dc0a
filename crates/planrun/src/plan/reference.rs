//! Reference expressions: the `@step_id.field` mini-language embedded in
//! step arguments, with a small hand-written parser and resolution against
//! the execution context.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{PlanError, PlanResult};

/// Field name that stands for "the whole stored result".
const RESULT_SENTINEL: &str = "result";

/// A parsed reference expression.
///
/// Syntax: sentinel `@`, an optional `[...]` or `{...}` delimiter around the
/// step id (to separate it from following punctuation), then a `.`-separated
/// field path. An empty path means the whole result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub step_id: String,
    pub path: Vec<String>,
}

impl Reference {
    /// Parse a string as a reference expression.
    ///
    /// Returns `None` for anything that is not a well-formed reference;
    /// such strings are treated as plain literals by the resolver.
    pub fn parse(raw: &str) -> Option<Self> {
        let rest = raw.strip_prefix('@')?;
        let (id, tail) = match rest.chars().next()? {
            '[' => {
                let end = rest.find(']')?;
                (&rest[1..end], &rest[end + 1..])
            }
            '{' => {
                let end = rest.find('}')?;
                (&rest[1..end], &rest[end + 1..])
            }
            _ => match rest.find('.') {
                Some(dot) => (&rest[..dot], &rest[dot..]),
                None => (rest, ""),
            },
        };
        if id.is_empty() {
            return None;
        }
        let path = match tail.strip_prefix('.') {
            Some("") => return None,
            Some(fields) => fields.split('.').map(str::to_string).collect(),
            None if tail.is_empty() => Vec::new(),
            // A delimited id followed by anything other than `.field` is not
            // a reference.
            None => return None,
        };
        Some(Self {
            step_id: id.to_string(),
            path,
        })
    }

    /// Map the raw id token onto a known step id.
    ///
    /// The raw token wins when it is known. Otherwise the trailing digit run
    /// is tried, tolerating plans that emit `step_3` for a step declared as
    /// `3` (or vice versa). This tolerance is a documented ambiguity: a step
    /// legitimately named `table2` will be read as step `2` when no `table2`
    /// step exists.
    pub fn canonical_id<F>(&self, known: F) -> Option<String>
    where
        F: Fn(&str) -> bool,
    {
        if known(&self.step_id) {
            return Some(self.step_id.clone());
        }
        let digits = trailing_digits(&self.step_id)?;
        if known(digits) {
            return Some(digits.to_string());
        }
        None
    }

    /// Resolve this reference against completed step results.
    pub fn resolve(&self, context: &HashMap<String, Value>) -> PlanResult<Value> {
        let id = self
            .canonical_id(|id| context.contains_key(id))
            .ok_or_else(|| PlanError::UnresolvedDependency {
                step_id: self.step_id.clone(),
            })?;
        let mut current = &context[id.as_str()];
        for field in &self.path {
            current = match current {
                Value::Object(map) if map.contains_key(field) => &map[field],
                // `result` is the sentinel for the whole stored value and is
                // the only field valid on non-object results.
                _ if field.as_str() == RESULT_SENTINEL => current,
                _ => {
                    return Err(PlanError::UnresolvedField {
                        step_id: id,
                        field: field.clone(),
                    })
                }
            };
        }
        Ok(current.clone())
    }
}

/// Extract the trailing run of ASCII digits from an id token.
fn trailing_digits(token: &str) -> Option<&str> {
    let bytes = token.as_bytes();
    let end = bytes.iter().rposition(|b| b.is_ascii_digit())? + 1;
    let mut start = end;
    while start > 0 && bytes[start - 1].is_ascii_digit() {
        start -= 1;
    }
    Some(&token[start..end])
}

/// Recursively collect every reference expression inside a value.
pub fn collect_references(value: &Value, out: &mut Vec<Reference>) {
    match value {
        Value::String(s) => {
            if let Some(reference) = Reference::parse(s) {
                out.push(reference);
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                collect_references(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_references(v, out);
            }
        }
        _ => {}
    }
}

/// Resolve a single value, substituting reference expressions and recursing
/// through nested objects and arrays. Non-reference values pass through
/// unchanged.
pub fn resolve_value(value: &Value, context: &HashMap<String, Value>) -> PlanResult<Value> {
    match value {
        Value::String(s) => match Reference::parse(s) {
            Some(reference) => reference.resolve(context),
            None => Ok(value.clone()),
        },
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), resolve_value(v, context)?)))
            .collect::<PlanResult<Map<String, Value>>>()
            .map(Value::Object),
        Value::Array(items) => items
            .iter()
            .map(|v| resolve_value(v, context))
            .collect::<PlanResult<Vec<Value>>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

/// Resolve a step's full argument map against the execution context.
pub fn resolve_args(
    args: &Map<String, Value>,
    context: &HashMap<String, Value>,
) -> PlanResult<Map<String, Value>> {
    args.iter()
        .map(|(k, v)| Ok((k.clone(), resolve_value(v, context)?)))
        .collect()
}
