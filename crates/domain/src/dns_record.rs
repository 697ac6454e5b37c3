use serde::{Deserialize, Serialize};

/// Persistable textual form of one resource record.
///
/// Wire records are converted to this form before storage; parsing back is
/// lenient and drops malformed lines silently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RrEntry {
    pub name: String,
    pub ttl: u32,
    pub rtype: String,
    pub rdata: String,
}

impl RrEntry {
    pub fn new(
        name: impl Into<String>,
        ttl: u32,
        rtype: impl Into<String>,
        rdata: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            ttl,
            rtype: rtype.into(),
            rdata: rdata.into(),
        }
    }

    /// Zone-file style line: `name ttl IN type rdata`.
    pub fn to_line(&self) -> String {
        format!("{}\t{}\tIN\t{}\t{}", self.name, self.ttl, self.rtype, self.rdata)
    }

    /// Parse one line; `None` for malformed input.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let name = parts.next()?;
        let ttl: u32 = parts.next()?.parse().ok()?;
        let class = parts.next()?;
        if !class.eq_ignore_ascii_case("IN") {
            return None;
        }
        let rtype = parts.next()?;
        let rdata = parts.collect::<Vec<_>>().join(" ");
        if rdata.is_empty() {
            return None;
        }
        Some(Self::new(name, ttl, rtype, rdata))
    }
}

/// A record set as stored: one textual RR per line.
pub type RrSet = Vec<RrEntry>;

pub fn serialize_rrset(entries: &[RrEntry]) -> String {
    entries
        .iter()
        .map(RrEntry::to_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse a stored record set, silently dropping lines that fail to parse.
pub fn deserialize_rrset(text: &str) -> RrSet {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(RrEntry::parse_line)
        .collect()
}
