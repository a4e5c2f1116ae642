//! Nested schemas for whole-document validation.
//!
//! Legacy configuration files (`pserv.yaml`, `sources.yaml`) are validated
//! as a tree: a [`Schema`] maps field names to [`Field`]s, and fields may
//! themselves be schemas or repeated sub-documents. Every field has a
//! default, so an empty document validates to the full set of defaults.

use crate::error::Invalid;
use crate::validators::Int;
use serde_json::{Map, Value};

/// One entry in a schema.
#[derive(Debug, Clone)]
pub enum Field {
    /// A string. `if_empty` replaces an empty string.
    String {
        if_missing: Option<String>,
        if_empty: Option<String>,
    },
    /// A bounded integer.
    Int(Int),
    /// A list of strings. A bare string is accepted as a one-element list.
    Set { if_missing: Option<Vec<String>> },
    /// A nested mapping, defaulted field by field.
    Schema(Schema),
    /// An ordered sequence of sub-documents, each validated by `item`.
    ForEach {
        item: Box<Field>,
        if_missing: Vec<Value>,
    },
}

impl Field {
    pub fn string(if_missing: impl Into<String>) -> Self {
        Field::String {
            if_missing: Some(if_missing.into()),
            if_empty: None,
        }
    }

    /// A string that defaults to null.
    pub fn optional_string() -> Self {
        Field::String {
            if_missing: None,
            if_empty: None,
        }
    }

    pub fn int(min: i64, max: i64, if_missing: i64) -> Self {
        Field::Int(Int {
            min: Some(min),
            max: Some(max),
            if_missing,
        })
    }

    pub fn set<S: Into<String>>(if_missing: Option<Vec<S>>) -> Self {
        Field::Set {
            if_missing: if_missing.map(|v| v.into_iter().map(Into::into).collect()),
        }
    }

    /// Repeated `item`, defaulting to an empty sequence.
    pub fn for_each(item: Field) -> Self {
        Field::ForEach {
            item: Box::new(item),
            if_missing: Vec::new(),
        }
    }

    /// The value used when the field is absent or null.
    pub fn default_value(&self) -> Value {
        match self {
            Field::String { if_missing, .. } => {
                if_missing.clone().map(Value::String).unwrap_or(Value::Null)
            }
            Field::Int(int) => Value::from(int.if_missing),
            Field::Set { if_missing } => match if_missing {
                Some(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
                None => Value::Null,
            },
            Field::Schema(schema) => schema.defaults(),
            Field::ForEach { if_missing, .. } => Value::Array(if_missing.clone()),
        }
    }

    /// Validate `raw`, filling defaults. `None` and null both mean absent.
    pub fn validate(&self, raw: Option<&Value>) -> Result<Value, Invalid> {
        let raw = match raw {
            None | Some(Value::Null) => return Ok(self.default_value()),
            Some(raw) => raw,
        };
        match self {
            Field::String { if_empty, .. } => {
                let s = match raw {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => {
                        return Err(Invalid::new(format!(
                            "The input must be a string (not {})",
                            other
                        )))
                    }
                };
                match if_empty {
                    Some(replacement) if s.is_empty() => Ok(Value::String(replacement.clone())),
                    _ => Ok(Value::String(s)),
                }
            }
            Field::Int(int) => {
                let n = match raw {
                    Value::Number(n) => n.as_i64(),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                }
                .ok_or_else(|| Invalid::new(format!("Please enter an integer value (not {})", raw)))?;
                int.check_range(n).map(Value::from)
            }
            Field::Set { .. } => match raw {
                Value::String(_) => Ok(Value::Array(vec![raw.clone()])),
                Value::Array(items) => {
                    for (index, item) in items.iter().enumerate() {
                        if !item.is_string() {
                            return Err(Invalid::new(format!(
                                "Set members must be strings (not {})",
                                item
                            ))
                            .within(index));
                        }
                    }
                    Ok(raw.clone())
                }
                other => Err(Invalid::new(format!(
                    "Expected a string or a list of strings (not {})",
                    other
                ))),
            },
            Field::Schema(schema) => schema.validate(raw),
            Field::ForEach { item, .. } => {
                let items = match raw {
                    Value::Array(items) => items.as_slice(),
                    single => std::slice::from_ref(single),
                };
                items
                    .iter()
                    .enumerate()
                    .map(|(index, entry)| item.validate(Some(entry)).map_err(|e| e.within(index)))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
        }
    }
}

/// A mapping of named fields.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, Field)>,
    /// `(required, present)`: when `present` is non-empty, `required` must be too.
    require_if_present: Vec<(String, String)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.push((name.into(), field));
        self
    }

    pub fn require_if_present(
        mut self,
        required: impl Into<String>,
        present: impl Into<String>,
    ) -> Self {
        self.require_if_present.push((required.into(), present.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// The fully defaulted document.
    pub fn defaults(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(name, field)| (name.clone(), field.default_value()))
                .collect(),
        )
    }

    /// Validate a mapping. Keys not declared in the schema are rejected.
    pub fn validate(&self, raw: &Value) -> Result<Value, Invalid> {
        let input = match raw {
            Value::Null => return Ok(self.defaults()),
            Value::Object(map) => map,
            other => {
                return Err(Invalid::new(format!(
                    "The input must be a mapping (not {})",
                    other
                )))
            }
        };

        if let Some(extra) = input.keys().find(|k| self.get(k).is_none()) {
            let expected: Vec<&str> = self.names().collect();
            return Err(Invalid::new(format!(
                "The input field {:?} was not expected (expected one of: {})",
                extra,
                expected.join(", ")
            )));
        }

        let mut out = Map::new();
        for (name, field) in &self.fields {
            let value = field
                .validate(input.get(name))
                .map_err(|e| e.within(name))?;
            out.insert(name.clone(), value);
        }

        for (required, present) in &self.require_if_present {
            if is_present(out.get(present)) && !is_present(out.get(required)) {
                return Err(Invalid::new("You must give a value for this field").within(required));
            }
        }

        Ok(Value::Object(out))
    }
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(_) => true,
    }
}

/// Follow `steps` through nested schemas and repeated items.
pub fn field_at<'a>(root: &'a Field, steps: &[&str]) -> Option<&'a Field> {
    let mut target = root;
    for step in steps {
        target = match target {
            Field::Schema(schema) => schema.get(step)?,
            Field::ForEach { item, .. } => match item.as_ref() {
                Field::Schema(schema) => schema.get(step)?,
                _ => return None,
            },
            _ => return None,
        };
    }
    Some(target)
}
