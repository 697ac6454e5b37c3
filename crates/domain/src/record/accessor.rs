use serde_json::Value;

use crate::errors::CoreError;

/// Uniform field lookup over heterogeneous record bodies.
///
/// Keys are dotted paths (`entity.domain`); numeric segments index arrays.
pub trait Accessor {
    fn get_string(&self, key: &str) -> Option<String>;
    fn get_string_array(&self, key: &str) -> Option<Vec<String>>;
    fn get_int(&self, key: &str) -> Option<i64>;
    fn get_float(&self, key: &str) -> Option<f64>;
    fn get_bool(&self, key: &str) -> Option<bool>;
    fn exists(&self, key: &str) -> bool;
    fn set(&mut self, key: &str, value: Value) -> Result<(), CoreError>;
}

/// Accessor over a JSON document.
pub struct JsonAccessor<'a> {
    root: &'a mut Value,
}

impl<'a> JsonAccessor<'a> {
    pub fn new(root: &'a mut Value) -> Self {
        Self { root }
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        let mut current = &*self.root;
        for segment in key.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Same JSON type, where all numbers count as one family.
    fn compatible(existing: &Value, new: &Value) -> bool {
        matches!(
            (existing, new),
            (Value::String(_), Value::String(_))
                | (Value::Bool(_), Value::Bool(_))
                | (Value::Number(_), Value::Number(_))
                | (Value::Array(_), Value::Array(_))
                | (Value::Object(_), Value::Object(_))
                | (Value::Null, _)
        )
    }

    /// Overflow check for numeric targets: a value that currently fits i64
    /// must not be replaced by one that only fits u64.
    fn numeric_overflow(existing: &Value, new: &Value) -> bool {
        match (existing, new) {
            (Value::Number(old), Value::Number(n)) => {
                old.is_i64() && !n.is_i64() && n.is_u64()
            }
            _ => false,
        }
    }
}

impl Accessor for JsonAccessor<'_> {
    fn get_string(&self, key: &str) -> Option<String> {
        self.lookup(key)?.as_str().map(str::to_string)
    }

    fn get_string_array(&self, key: &str) -> Option<Vec<String>> {
        self.lookup(key)?
            .as_array()?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        self.lookup(key)?.as_i64()
    }

    fn get_float(&self, key: &str) -> Option<f64> {
        self.lookup(key)?.as_f64()
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.lookup(key)?.as_bool()
    }

    fn exists(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), CoreError> {
        if let Some(existing) = self.lookup(key) {
            if !Self::compatible(existing, &value) {
                return Err(CoreError::TypeMismatch {
                    field: key.to_string(),
                    message: format!(
                        "cannot replace {} with {}",
                        json_type_name(existing),
                        json_type_name(&value)
                    ),
                });
            }
            if Self::numeric_overflow(existing, &value) {
                return Err(CoreError::TypeMismatch {
                    field: key.to_string(),
                    message: "numeric overflow".to_string(),
                });
            }
        }

        // Walk to the parent, creating intermediate objects as needed.
        let mut current = &mut *self.root;
        let segments: Vec<&str> = key.split('.').collect();
        let (last, path) = segments.split_last().ok_or_else(|| CoreError::TypeMismatch {
            field: key.to_string(),
            message: "empty key".to_string(),
        })?;

        for segment in path {
            current = match current {
                Value::Object(map) => map
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(serde_json::Map::new())),
                Value::Array(items) => {
                    let idx = segment.parse::<usize>().map_err(|_| CoreError::TypeMismatch {
                        field: key.to_string(),
                        message: format!("{segment} is not an array index"),
                    })?;
                    items.get_mut(idx).ok_or_else(|| CoreError::TypeMismatch {
                        field: key.to_string(),
                        message: format!("index {idx} out of bounds"),
                    })?
                }
                _ => {
                    return Err(CoreError::TypeMismatch {
                        field: key.to_string(),
                        message: format!("{segment} is not traversable"),
                    })
                }
            };
        }

        match current {
            Value::Object(map) => {
                map.insert(last.to_string(), value);
                Ok(())
            }
            Value::Array(items) => {
                let idx = last.parse::<usize>().map_err(|_| CoreError::TypeMismatch {
                    field: key.to_string(),
                    message: format!("{last} is not an array index"),
                })?;
                match items.get_mut(idx) {
                    Some(slot) => {
                        *slot = value;
                        Ok(())
                    }
                    None => Err(CoreError::TypeMismatch {
                        field: key.to_string(),
                        message: format!("index {idx} out of bounds"),
                    }),
                }
            }
            _ => Err(CoreError::TypeMismatch {
                field: key.to_string(),
                message: "parent is not a container".to_string(),
            }),
        }
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
