//! The policy decider chain: ordered predicates over a connection and its
//! lazily-enriched entity, run under the connection's layered profile.
//! The first decider that concludes wins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use vigil_domain::config::{options, FilterConfig};
use vigil_domain::{Connection, ConnectionKind, DefaultAction, Reason, ResolvedProfile};

use crate::ports::{
    ConnectionsViewPort, FilterListPort, NetEnvPort, ProcessLookupPort, ResolverPort,
};
use crate::services::{EntityEnricher, PromptService};
use crate::DnsLinkage;

mod auto_permit;
mod bypass;
mod connectivity;
mod endpoints;
mod heuristics;
mod lists;
mod policy;
mod resolver_scope;
mod system;

pub(crate) use endpoints::check_rules;

/// Outcome of one decider chain run.
#[derive(Debug, Clone)]
pub enum Decision {
    Allowed(Reason),
    Denied(Reason),
    /// Allowed, but the flow is sent through the tunnel.
    RerouteToTunnel(Reason),
    NoMatch,
}

impl Decision {
    pub fn is_concluded(&self) -> bool {
        !matches!(self, Decision::NoMatch)
    }
}

/// SPN/tunnel status as reported by the transport collaborator.
#[derive(Debug, Default)]
pub struct TunnelState {
    connected: AtomicBool,
}

impl TunnelState {
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

/// Everything the deciders consult besides the connection itself.
pub struct FilterDeps {
    pub config: FilterConfig,
    /// PID of this process; connections by the firewall itself are
    /// accepted as internal.
    pub own_pid: u32,
    pub netenv: Arc<dyn NetEnvPort>,
    pub resolver: Arc<dyn ResolverPort>,
    pub filter_lists: Arc<dyn FilterListPort>,
    pub process_lookup: Arc<dyn ProcessLookupPort>,
    pub connections: Arc<dyn ConnectionsViewPort>,
    pub enricher: EntityEnricher,
    /// Shared with the re-evaluation engine, which cancels prompts that a
    /// configuration change made moot.
    pub prompts: Arc<PromptService>,
    pub linkage: Arc<DnsLinkage>,
    pub tunnel: Arc<TunnelState>,
}

pub struct DeciderChain {
    deps: Arc<FilterDeps>,
}

impl DeciderChain {
    pub fn new(deps: Arc<FilterDeps>) -> Self {
        Self { deps }
    }

    pub fn deps(&self) -> &FilterDeps {
        &self.deps
    }

    /// Run the full chain. Mutates connection flags (internal, inspecting)
    /// as side effects of individual deciders, but never the verdict; the
    /// caller applies the returned decision.
    pub async fn decide(&self, conn: &mut Connection, profile: &ResolvedProfile) -> Decision {
        let deps = &*self.deps;

        if let Some(d) = system::check_own_process(deps, conn) {
            return self.finish(conn, profile, d).await;
        }
        if let Some(d) = system::check_broadcast_reply(deps, conn) {
            return self.finish(conn, profile, d).await;
        }
        if let Some(d) = policy::check_connection_type(deps, conn, profile) {
            return self.finish(conn, profile, d).await;
        }
        if let Some(d) = policy::check_scopes(conn, profile) {
            return self.finish(conn, profile, d).await;
        }

        // Endpoint rules may need location and list facets; fetch them
        // before evaluation so a rule does not fail on missing data.
        if endpoints::rules_need_entity_data(conn, profile) {
            self.deps.enricher.fetch_data(&mut conn.entity).await;
        }
        if let Some(d) = endpoints::check_endpoint_lists(deps, conn, profile).await {
            return self.finish(conn, profile, d).await;
        }

        if let Some(d) = resolver_scope::check_dns_horizon(conn) {
            return self.finish(conn, profile, d).await;
        }
        if let Some(d) = connectivity::check_portal_grace(deps, conn) {
            return self.finish(conn, profile, d).await;
        }
        if let Some(d) = bypass::check_bypass_prevention(deps, conn, profile).await {
            return self.finish(conn, profile, d).await;
        }

        self.deps.enricher.fetch_data(&mut conn.entity).await;

        if let Some(d) = lists::check_filter_lists(deps, conn, profile) {
            return self.finish(conn, profile, d).await;
        }
        if let Some(d) = heuristics::check_domain_heuristics(conn, profile) {
            return self.finish(conn, profile, d).await;
        }
        if let Some(d) = lists::check_custom_filter_list(conn, profile) {
            return self.finish(conn, profile, d).await;
        }
        if let Some(d) = auto_permit::check_auto_permit(conn, profile) {
            return self.finish(conn, profile, d).await;
        }

        let d = self.default_action(conn, profile).await;
        self.finish(conn, profile, d).await
    }

    async fn default_action(&self, conn: &mut Connection, profile: &ResolvedProfile) -> Decision {
        match profile.default_action {
            DefaultAction::Permit => Decision::Allowed(Reason::with_option(
                "allowed by default action",
                options::DEFAULT_ACTION,
            )),
            DefaultAction::Block => Decision::Denied(Reason::with_option(
                "blocked by default action",
                options::DEFAULT_ACTION,
            )),
            DefaultAction::Ask => {
                let (verdict, reason) = self.deps.prompts.decide(conn).await;
                if verdict == vigil_domain::Verdict::Accept {
                    Decision::Allowed(reason)
                } else {
                    Decision::Denied(reason)
                }
            }
        }
    }

    /// Post-processing on a concluded decision: the CNAME chain re-test
    /// for DNS requests, then the tunnel policy. Deny always beats a
    /// re-route.
    async fn finish(
        &self,
        conn: &mut Connection,
        profile: &ResolvedProfile,
        decision: Decision,
    ) -> Decision {
        let decision = match decision {
            Decision::Allowed(reason) => {
                match self.check_cname_chain(conn, profile).await {
                    Some(denied) => denied,
                    None => Decision::Allowed(reason),
                }
            }
            other => other,
        };

        match decision {
            Decision::Allowed(reason)
                if self.deps.tunnel.is_connected()
                    && !conn.internal
                    && !conn.direction.is_inbound()
                    && conn.kind == ConnectionKind::Ip
                    && conn.entity.ip_scope().band() == vigil_domain::ScopeBand::Internet =>
            {
                debug!(conn = %conn.id, "Rerouting through tunnel");
                Decision::RerouteToTunnel(reason)
            }
            other => other,
        }
    }

    /// Re-test the CNAME targets of an allowed DNS request against the
    /// endpoint rules and filter lists; any deny wins.
    async fn check_cname_chain(
        &self,
        conn: &mut Connection,
        profile: &ResolvedProfile,
    ) -> Option<Decision> {
        if !profile.cname_filtering || conn.kind != ConnectionKind::DnsRequest {
            return None;
        }
        let cnames = conn.entity.cnames.clone();
        for cname in cnames {
            let mut entity = vigil_domain::Entity::from_domain(&cname);
            self.deps.enricher.fetch_data(&mut entity).await;

            let rules: Vec<_> = profile.outbound_rules().cloned().collect();
            if let Some(Decision::Denied(mut reason)) = check_rules(&rules, &entity, options::ENDPOINTS)
            {
                reason.message = format!("CNAME {cname}: {}", reason.message);
                return Some(Decision::Denied(reason.with_context(
                    serde_json::json!({"cname": cname}),
                )));
            }

            if let Some(Decision::Denied(mut reason)) =
                lists::entity_list_denial(&entity, profile, &self.deps.config)
            {
                reason.message = format!("CNAME {cname}: {}", reason.message);
                return Some(Decision::Denied(reason));
            }
        }
        None
    }
}
