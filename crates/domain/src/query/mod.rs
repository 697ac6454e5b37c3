use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::record::{Accessor, Record, RecordKey};

mod condition;
mod parser;

pub use condition::{Condition, Operator, Value};
pub use parser::parse_query;

/// A query over one database: key prefix plus an optional condition tree.
///
/// `checked` is set once `check` validated the condition; storage layers
/// refuse unchecked queries so parse-time error conditions surface with
/// their position info instead of failing silently mid-iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub db_name: String,
    pub db_key_prefix: String,
    pub filter: Option<Condition>,
    pub order_by: Option<String>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
    pub checked: bool,
}

impl Query {
    /// New query for `db:keyprefix`.
    pub fn new(prefix: &str) -> Self {
        let (db_name, db_key_prefix) = match prefix.split_once(':') {
            Some((db, key)) => (db.to_string(), key.to_string()),
            None => (prefix.to_string(), String::new()),
        };
        Self {
            db_name,
            db_key_prefix,
            filter: None,
            order_by: None,
            limit: None,
            offset: None,
            checked: false,
        }
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(condition);
        self.checked = false;
        self
    }

    pub fn limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn order_by(mut self, key: &str) -> Self {
        self.order_by = Some(key.to_string());
        self
    }

    /// Validate the condition tree. Deferred parse errors surface here.
    pub fn check(mut self) -> Result<Self, CoreError> {
        if let Some(cond) = &self.filter {
            cond.check()?;
        }
        if self.db_name.is_empty() {
            return Err(CoreError::InvalidQuery("missing database name".to_string()));
        }
        self.checked = true;
        Ok(self)
    }

    pub fn is_checked(&self) -> bool {
        self.checked
    }

    pub fn matches_key(&self, key: &RecordKey) -> bool {
        key.db == self.db_name && key.key.starts_with(&self.db_key_prefix)
    }

    /// Evaluate prefix and condition against a record.
    pub fn matches(&self, record: &mut Record) -> bool {
        if !self.matches_key(&record.key.clone()) {
            return false;
        }
        match &self.filter {
            Some(cond) => cond.matches(&record.accessor()),
            None => true,
        }
    }

    /// Evaluate the condition only, against any accessor.
    pub fn matches_accessor(&self, accessor: &dyn Accessor) -> bool {
        match &self.filter {
            Some(cond) => cond.matches(accessor),
            None => true,
        }
    }

    /// Canonical text form; `parse_query(print())` reconstructs the query.
    pub fn print(&self) -> String {
        let mut out = format!("query {}:{}", self.db_name, self.db_key_prefix);
        if let Some(cond) = &self.filter {
            out.push_str(" where ");
            out.push_str(&cond.print());
        }
        if let Some(order) = &self.order_by {
            out.push_str(" orderby ");
            out.push_str(order);
        }
        if let Some(limit) = self.limit {
            out.push_str(&format!(" limit {limit}"));
        }
        if let Some(offset) = self.offset {
            out.push_str(&format!(" offset {offset}"));
        }
        out
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.print())
    }
}
