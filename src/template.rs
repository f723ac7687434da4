//! Placeholder resolution for prompts and tool parameters.
//!
//! Supported placeholders:
//!
//! - `{{input}}` / `{{input.a.b}}`: the run input, optionally narrowed by a path
//! - `{{steps.X}}` / `{{steps.X.items.0}}`: the output of completed step `X`
//!
//! Numeric path segments index into arrays. Only steps that have already
//! completed are visible; referencing any other step is an error.

use indexmap::IndexMap;
use serde_json::Value;

use crate::{Error, Result};

/// The data a template may read from.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub input: &'a Value,
    pub steps: &'a IndexMap<String, Value>,
}

#[derive(Debug, PartialEq)]
enum Segment<'t> {
    Literal(&'t str),
    Placeholder(&'t str),
}

fn tokenize(template: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        if open > 0 {
            segments.push(Segment::Literal(&rest[..open]));
        }
        segments.push(Segment::Placeholder(rest[open + 2..open + 2 + close].trim()));
        rest = &rest[open + 2 + close + 2..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    segments
}

fn lookup<'v>(root: &'v Value, path: &[&str], expr: &str) -> Result<&'v Value> {
    path.iter().try_fold(root, |value, segment| {
        let next = match value {
            Value::Object(map) => map.get(*segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        next.ok_or_else(|| {
            Error::Template(format!(
                "'{segment}' not found while resolving '{{{{{expr}}}}}'"
            ))
        })
    })
}

impl<'a> Scope<'a> {
    /// Create a scope over the run input and completed step outputs.
    pub fn new(input: &'a Value, steps: &'a IndexMap<String, Value>) -> Self {
        Self { input, steps }
    }

    /// Resolve one placeholder expression (without braces).
    pub fn get(&self, expr: &str) -> Result<&'a Value> {
        let mut parts = expr.split('.');
        match parts.next() {
            Some("input") => {
                let path: Vec<&str> = parts.collect();
                lookup(self.input, &path, expr)
            }
            Some("steps") => {
                let Some(step) = parts.next().filter(|s| !s.is_empty()) else {
                    return Err(Error::Template(format!("'{{{{{expr}}}}}' is missing a step name")));
                };
                let output = self.steps.get(step).ok_or_else(|| {
                    Error::Template(format!(
                        "step '{step}' has not completed; referenced by '{{{{{expr}}}}}'"
                    ))
                })?;
                let path: Vec<&str> = parts.collect();
                lookup(output, &path, expr)
            }
            _ => Err(Error::Template(format!(
                "unknown placeholder '{{{{{expr}}}}}'; expected 'input' or 'steps.<name>'"
            ))),
        }
    }

    /// Render a template to text.
    ///
    /// String values are inserted verbatim; other values as compact JSON.
    pub fn render(&self, template: &str) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        for segment in tokenize(template) {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(expr) => match self.get(expr)? {
                    Value::String(s) => out.push_str(s),
                    other => out.push_str(&other.to_string()),
                },
            }
        }
        Ok(out)
    }

    /// Resolve placeholders inside a JSON value.
    ///
    /// A string consisting of exactly one placeholder is replaced by the
    /// referenced value itself, preserving its JSON type.
    pub fn resolve(&self, value: &Value) -> Result<Value> {
        match value {
            Value::String(s) => match tokenize(s).as_slice() {
                [Segment::Placeholder(expr)] => Ok(self.get(expr)?.clone()),
                [] | [Segment::Literal(_)] => Ok(value.clone()),
                _ => Ok(Value::String(self.render(s)?)),
            },
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), self.resolve(v)?)))
                .collect::<Result<serde_json::Map<_, _>>>()
                .map(Value::Object),
            other => Ok(other.clone()),
        }
    }
}
