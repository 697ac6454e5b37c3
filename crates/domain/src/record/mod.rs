use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

mod accessor;
pub use accessor::{Accessor, JsonAccessor};

/// Record body encodings. Only JSON is in active use; the format tag is
/// persisted so future encodings can coexist in one table.
pub const FORMAT_JSON: u8 = 1;

/// A record key: database name plus a `/`-separated key path, written
/// `db:key/path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub db: String,
    pub key: String,
}

impl RecordKey {
    pub fn new(db: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            key: key.into(),
        }
    }

    /// Parse `db:key/path`. The key part may be empty (database root).
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s.split_once(':') {
            Some((db, key)) if !db.is_empty() => Ok(Self::new(db, key)),
            _ => Err(CoreError::InvalidQuery(format!("invalid record key: {s}"))),
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.db, self.key)
    }
}

/// Lifecycle metadata persisted with every record. Shadow delete sets
/// `deleted` to a timestamp instead of removing the row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub created: i64,
    pub modified: i64,
    pub expires: i64,
    pub deleted: i64,
    pub secret: bool,
    pub crownjewel: bool,
}

impl RecordMeta {
    pub fn now() -> Self {
        let now = Utc::now().timestamp();
        Self {
            created: now,
            modified: now,
            ..Default::default()
        }
    }

    pub fn touch(&mut self) {
        self.modified = Utc::now().timestamp();
        self.deleted = 0;
    }

    pub fn shadow_delete(&mut self) {
        self.deleted = Utc::now().timestamp();
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted != 0
    }

    pub fn is_expired(&self) -> bool {
        self.expires != 0 && self.expires <= Utc::now().timestamp()
    }
}

/// A stored record: key, lifecycle metadata, and a structured JSON body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub key: RecordKey,
    pub meta: RecordMeta,
    pub format: u8,
    pub body: serde_json::Value,
}

impl Record {
    pub fn new(db: impl Into<String>, key: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            key: RecordKey::new(db, key),
            meta: RecordMeta::now(),
            format: FORMAT_JSON,
            body,
        }
    }

    /// Serialise a typed value into a record body.
    pub fn from_value<T: Serialize>(
        db: impl Into<String>,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Self, CoreError> {
        let body = serde_json::to_value(value).map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(Self::new(db, key, body))
    }

    /// Deserialise the body back into a typed value.
    pub fn parse_body<T: for<'de> Deserialize<'de>>(&self) -> Result<T, CoreError> {
        serde_json::from_value(self.body.clone()).map_err(|e| CoreError::Storage(e.to_string()))
    }

    /// Field accessor over the body, used by the query evaluator and the
    /// debug tooling.
    pub fn accessor(&mut self) -> JsonAccessor<'_> {
        JsonAccessor::new(&mut self.body)
    }

    pub fn is_valid(&self) -> bool {
        !self.meta.is_deleted() && !self.meta.is_expired()
    }
}
