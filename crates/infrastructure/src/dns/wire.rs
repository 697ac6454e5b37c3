//! Conversion between wire-format DNS messages and the persistable
//! record form.

use hickory_proto::op::{Message, MessageType};
use hickory_proto::rr::Record as WireRecord;
use hickory_proto::serialize::binary::BinDecodable;
use std::net::IpAddr;

use vigil_domain::{fqdn, CoreError, IpScope, ResolverInfo, ResolverScope, RrCache, RrEntry};

fn to_entry(record: &WireRecord) -> RrEntry {
    RrEntry::new(
        fqdn::normalize(&record.name().to_string()),
        record.ttl(),
        record.record_type().to_string(),
        record.data().to_string(),
    )
}

/// Resolver descriptor for a server we only know by address.
fn observed_resolver(ip: Option<IpAddr>) -> ResolverInfo {
    let scope = match ip.map(|ip| IpScope::classify(ip).band()) {
        Some(vigil_domain::ScopeBand::Localhost) => ResolverScope::Localhost,
        Some(vigil_domain::ScopeBand::Lan) => ResolverScope::Lan,
        _ => ResolverScope::Global,
    };
    ResolverInfo {
        name: ip.map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".to_string()),
        kind: "plain".to_string(),
        source: "observed".to_string(),
        ip,
        scope,
    }
}

/// Parse an intercepted port-53 payload.
///
/// Returns `Ok(None)` for queries (nothing to learn), a response snapshot
/// for answers, and an error for payloads that are not DNS at all; the
/// caller blocks those flows.
pub fn parse_dns_payload(
    payload: &[u8],
    remote_ip: Option<IpAddr>,
) -> Result<Option<RrCache>, CoreError> {
    let message =
        Message::from_bytes(payload).map_err(|e| CoreError::InvalidDnsMessage(e.to_string()))?;

    if message.header().message_type() != MessageType::Response {
        return Ok(None);
    }

    let Some(query) = message.queries().first() else {
        return Err(CoreError::InvalidDnsMessage(
            "response without question section".to_string(),
        ));
    };

    let mut cache = RrCache::new(
        fqdn::normalize(&query.name().to_string()),
        query.query_type().to_string(),
        observed_resolver(remote_ip),
    );
    cache.rcode = u16::from(message.header().response_code().low());
    cache.answers = message.answers().iter().map(to_entry).collect();
    cache.ns = message.name_servers().iter().map(to_entry).collect();
    cache.extra = message.additionals().iter().map(to_entry).collect();

    Ok(Some(cache))
}
