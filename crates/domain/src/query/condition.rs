use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::record::Accessor;

/// Typed value of a predicate, fixed at parse time by the operator family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    StrSet(Vec<String>),
    /// Placeholder for operators that take no value (`exists`).
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Equals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    FloatEquals,
    FloatGreaterThan,
    FloatGreaterThanOrEqual,
    FloatLessThan,
    FloatLessThanOrEqual,
    SameAs,
    Contains,
    StartsWith,
    EndsWith,
    In,
    Matches,
    Is,
    Exists,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "==",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::FloatEquals => "f==",
            Operator::FloatGreaterThan => "f>",
            Operator::FloatGreaterThanOrEqual => "f>=",
            Operator::FloatLessThan => "f<",
            Operator::FloatLessThanOrEqual => "f<=",
            Operator::SameAs => "sameas",
            Operator::Contains => "contains",
            Operator::StartsWith => "startswith",
            Operator::EndsWith => "endswith",
            Operator::In => "in",
            Operator::Matches => "matches",
            Operator::Is => "is",
            Operator::Exists => "exists",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "==" => Some(Operator::Equals),
            ">" => Some(Operator::GreaterThan),
            ">=" => Some(Operator::GreaterThanOrEqual),
            "<" => Some(Operator::LessThan),
            "<=" => Some(Operator::LessThanOrEqual),
            "f==" => Some(Operator::FloatEquals),
            "f>" => Some(Operator::FloatGreaterThan),
            "f>=" => Some(Operator::FloatGreaterThanOrEqual),
            "f<" => Some(Operator::FloatLessThan),
            "f<=" => Some(Operator::FloatLessThanOrEqual),
            "sameas" => Some(Operator::SameAs),
            "contains" => Some(Operator::Contains),
            "startswith" => Some(Operator::StartsWith),
            "endswith" => Some(Operator::EndsWith),
            "in" => Some(Operator::In),
            "matches" => Some(Operator::Matches),
            "is" => Some(Operator::Is),
            "exists" => Some(Operator::Exists),
            _ => None,
        }
    }

    pub fn takes_value(&self) -> bool {
        !matches!(self, Operator::Exists)
    }

    /// Type-pun a raw token into this operator's value type.
    pub fn parse_value(&self, raw: &str) -> Result<Value, String> {
        match self {
            Operator::Equals
            | Operator::GreaterThan
            | Operator::GreaterThanOrEqual
            | Operator::LessThan
            | Operator::LessThanOrEqual => raw
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("expected integer value, got {raw:?}")),
            Operator::FloatEquals
            | Operator::FloatGreaterThan
            | Operator::FloatGreaterThanOrEqual
            | Operator::FloatLessThan
            | Operator::FloatLessThanOrEqual => raw
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("expected float value, got {raw:?}")),
            Operator::SameAs
            | Operator::Contains
            | Operator::StartsWith
            | Operator::EndsWith
            | Operator::Matches => Ok(Value::Str(raw.to_string())),
            Operator::In => Ok(Value::StrSet(
                raw.split(',').map(str::to_string).collect(),
            )),
            Operator::Is => match raw {
                "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(Value::Bool(true)),
                "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(Value::Bool(false)),
                _ => Err(format!("expected boolean value, got {raw:?}")),
            },
            Operator::Exists => Ok(Value::None),
        }
    }
}

/// Boolean condition tree over record fields.
///
/// `Error` is a sentinel produced when a value fails to parse: the parser
/// keeps position information, and `check` surfaces the message at
/// query-validation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Where {
        key: String,
        op: Operator,
        value: Value,
    },
    Error {
        message: String,
        offset: usize,
    },
}

impl Condition {
    pub fn where_(key: &str, op: Operator, value: Value) -> Self {
        Condition::Where {
            key: key.to_string(),
            op,
            value,
        }
    }

    /// Validate the tree. Error sentinels and invalid regexes fail here.
    pub fn check(&self) -> Result<(), CoreError> {
        match self {
            Condition::And(parts) | Condition::Or(parts) => {
                for p in parts {
                    p.check()?;
                }
                Ok(())
            }
            Condition::Not(inner) => inner.check(),
            Condition::Where { op, value, .. } => {
                if *op == Operator::Matches {
                    if let Value::Str(pattern) = value {
                        fancy_regex::Regex::new(pattern).map_err(|e| {
                            CoreError::InvalidQuery(format!("invalid regex {pattern:?}: {e}"))
                        })?;
                    }
                }
                Ok(())
            }
            Condition::Error { message, offset } => Err(CoreError::parse(*offset, message.clone())),
        }
    }

    /// Evaluate bottom-up against an accessor; And/Or short-circuit. A
    /// missing field never matches (except through `Not`).
    pub fn matches(&self, accessor: &dyn Accessor) -> bool {
        match self {
            Condition::And(parts) => parts.iter().all(|p| p.matches(accessor)),
            Condition::Or(parts) => parts.iter().any(|p| p.matches(accessor)),
            Condition::Not(inner) => !inner.matches(accessor),
            Condition::Where { key, op, value } => match_predicate(accessor, key, *op, value),
            Condition::Error { .. } => false,
        }
    }

    /// Canonical text form.
    pub fn print(&self) -> String {
        match self {
            Condition::And(parts) => {
                let inner: Vec<String> = parts.iter().map(Condition::print).collect();
                format!("({})", inner.join(" and "))
            }
            Condition::Or(parts) => {
                let inner: Vec<String> = parts.iter().map(Condition::print).collect();
                format!("({})", inner.join(" or "))
            }
            Condition::Not(inner) => format!("not {}", inner.print()),
            Condition::Where { key, op, value } => {
                if op.takes_value() {
                    format!("{} {} {}", quote_token(key), op.as_str(), print_value(value))
                } else {
                    format!("{} {}", quote_token(key), op.as_str())
                }
            }
            Condition::Error { message, .. } => format!("[invalid: {message}]"),
        }
    }
}

fn print_value(value: &Value) -> String {
    match value {
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Str(s) => quote_token(s),
        Value::StrSet(set) => quote_token(&set.join(",")),
        Value::None => String::new(),
    }
}

/// Quote a token when it would not survive tokenisation bare.
fn quote_token(s: &str) -> String {
    let needs_quoting = s.is_empty()
        || s.chars()
            .any(|c| c.is_whitespace() || c == '(' || c == ')' || c == '"' || c == '\\');
    if needs_quoting {
        let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        s.to_string()
    }
}

fn match_predicate(accessor: &dyn Accessor, key: &str, op: Operator, value: &Value) -> bool {
    match (op, value) {
        (Operator::Equals, Value::Int(v)) => accessor.get_int(key) == Some(*v),
        (Operator::GreaterThan, Value::Int(v)) => accessor.get_int(key).is_some_and(|x| x > *v),
        (Operator::GreaterThanOrEqual, Value::Int(v)) => {
            accessor.get_int(key).is_some_and(|x| x >= *v)
        }
        (Operator::LessThan, Value::Int(v)) => accessor.get_int(key).is_some_and(|x| x < *v),
        (Operator::LessThanOrEqual, Value::Int(v)) => {
            accessor.get_int(key).is_some_and(|x| x <= *v)
        }
        (Operator::FloatEquals, Value::Float(v)) => accessor.get_float(key) == Some(*v),
        (Operator::FloatGreaterThan, Value::Float(v)) => {
            accessor.get_float(key).is_some_and(|x| x > *v)
        }
        (Operator::FloatGreaterThanOrEqual, Value::Float(v)) => {
            accessor.get_float(key).is_some_and(|x| x >= *v)
        }
        (Operator::FloatLessThan, Value::Float(v)) => {
            accessor.get_float(key).is_some_and(|x| x < *v)
        }
        (Operator::FloatLessThanOrEqual, Value::Float(v)) => {
            accessor.get_float(key).is_some_and(|x| x <= *v)
        }
        (Operator::SameAs, Value::Str(v)) => accessor.get_string(key).as_deref() == Some(v),
        (Operator::Contains, Value::Str(v)) => {
            accessor.get_string(key).is_some_and(|s| s.contains(v))
        }
        (Operator::StartsWith, Value::Str(v)) => {
            accessor.get_string(key).is_some_and(|s| s.starts_with(v))
        }
        (Operator::EndsWith, Value::Str(v)) => {
            accessor.get_string(key).is_some_and(|s| s.ends_with(v))
        }
        (Operator::In, Value::StrSet(set)) => accessor
            .get_string(key)
            .is_some_and(|s| set.iter().any(|v| *v == s)),
        (Operator::Matches, Value::Str(pattern)) => match fancy_regex::Regex::new(pattern) {
            Ok(re) => accessor
                .get_string(key)
                .is_some_and(|s| re.is_match(&s).unwrap_or(false)),
            Err(_) => false,
        },
        (Operator::Is, Value::Bool(v)) => accessor.get_bool(key) == Some(*v),
        (Operator::Exists, _) => accessor.exists(key),
        // Mis-typed value for the operator: never matches.
        _ => false,
    }
}
