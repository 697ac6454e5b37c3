//! Vigil Domain Layer
pub mod config;
pub mod connection;
pub mod dga;
pub mod dns_record;
pub mod endpoints;
pub mod entity;
pub mod errors;
pub mod fqdn;
pub mod netenv;
pub mod packet;
pub mod process;
pub mod profile;
pub mod query;
pub mod record;
pub mod rrcache;
pub mod similarity;
pub mod verdict;

pub use config::{CliOverrides, Config};
pub use connection::{Connection, ConnectionKind, HandlerStage, Reason};
pub use dns_record::{RrEntry, RrSet};
pub use endpoints::{EndpointMatch, EndpointRule, Selector};
pub use entity::Entity;
pub use errors::CoreError;
pub use netenv::{IpScope, OnlineStatus, ScopeBand};
pub use packet::{Direction, IpProtocol, IpVersion, PacketInfo};
pub use process::{Process, ProcessContext};
pub use profile::{
    CustomFilterList, DefaultAction, LayeredProfile, Profile, ProfileSettings, ResolvedProfile,
};
pub use query::{parse_query, Condition, Operator, Query, Value};
pub use record::{Accessor, JsonAccessor, Record, RecordKey, RecordMeta};
pub use rrcache::{ResolverInfo, ResolverScope, RrCache};
pub use verdict::{PacketAction, Verdict};
