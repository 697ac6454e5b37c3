//! Vigil Application Layer
//!
//! Ports for every external collaborator, the policy decider chain, DNS
//! response sanitisation and DNS↔IP linkage, entity enrichment, and the
//! prompt / pre-authenticated-port services.
pub mod deciders;
pub mod dns;
pub mod ports;
pub mod services;
pub mod use_cases;

pub use deciders::{Decision, DeciderChain, FilterDeps, TunnelState};
pub use dns::linkage::{DnsLinkage, ResolvedDomain, GLOBAL_SCOPE};
pub use dns::sanitise::sanitize_response;
