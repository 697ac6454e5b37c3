use std::sync::Arc;
use tracing::{debug, warn};

use vigil_domain::Entity;

use crate::ports::{FilterListPort, GeoIpPort};

/// Populates entity facets on demand.
///
/// Each facet is guarded by the entity's own one-shot flags: a successful
/// lookup sets values and flag together, a failed lookup leaves the flag
/// clear so the next call retries. The caller's re-evaluation cadence
/// bounds the retry rate.
pub struct EntityEnricher {
    geoip: Arc<dyn GeoIpPort>,
    lists: Arc<dyn FilterListPort>,
}

impl EntityEnricher {
    pub fn new(geoip: Arc<dyn GeoIpPort>, lists: Arc<dyn FilterListPort>) -> Self {
        Self { geoip, lists }
    }

    /// Fetch everything the decider chain may need: location first (list
    /// lookups by ASN/country depend on it), then list memberships.
    pub async fn fetch_data(&self, entity: &mut Entity) {
        self.fetch_location(entity).await;
        self.fetch_lists(entity).await;
    }

    pub async fn fetch_location(&self, entity: &mut Entity) {
        if entity.location_fetched() {
            return;
        }
        let Some(ip) = entity.ip else {
            // Domain-only entities (DNS requests) have no address to
            // locate; the facet is decided, empty.
            entity.set_location(None, None);
            return;
        };
        if entity.ip_scope().is_local_network() {
            // Local addresses have no meaningful geo data.
            entity.set_location(None, None);
            return;
        }
        match self.geoip.location(ip).await {
            Ok(Some(location)) if location.is_useful() => {
                entity.set_location(Some(location.country), Some(location.asn));
            }
            Ok(_) => {
                // No data or too inaccurate: the facet is decided, empty.
                entity.set_location(None, None);
            }
            Err(e) => {
                debug!(ip = %ip, error = %e, "Location lookup failed, will retry");
                entity.clear_location();
            }
        }
    }

    /// Populate the four list-membership facets. Unavailable list data is
    /// a degradation: the guards stay clear and the chain continues with
    /// list checks disabled.
    pub async fn fetch_lists(&self, entity: &mut Entity) {
        if !self.lists.ready() {
            warn!("filterlists disabled: list cache unavailable");
            return;
        }

        if !entity.domain_lists_fetched() {
            let mut merged = Vec::new();
            let mut ok = true;
            for domain in entity.list_lookup_domains() {
                match self.lists.lookup_domain(&domain).await {
                    Ok(ids) => merged.extend(ids),
                    Err(e) => {
                        debug!(domain = %domain, error = %e, "Domain list lookup failed");
                        ok = false;
                        break;
                    }
                }
            }
            if ok {
                entity.set_domain_lists(merged);
            }
        }

        if !entity.ip_lists_fetched() {
            if let Some(ip) = entity.ip {
                match self.lists.lookup_ip(ip).await {
                    Ok(ids) => entity.set_ip_lists(ids),
                    Err(e) => debug!(ip = %ip, error = %e, "IP list lookup failed"),
                }
            } else {
                entity.set_ip_lists(Vec::new());
            }
        }

        if !entity.asn_lists_fetched() && entity.location_fetched() {
            match entity.asn {
                Some(asn) => match self.lists.lookup_asn(asn).await {
                    Ok(ids) => entity.set_asn_lists(ids),
                    Err(e) => debug!(asn, error = %e, "ASN list lookup failed"),
                },
                None => entity.set_asn_lists(Vec::new()),
            }
        }

        if !entity.country_lists_fetched() && entity.location_fetched() {
            match entity.country.clone() {
                Some(country) => match self.lists.lookup_country(&country).await {
                    Ok(ids) => entity.set_country_lists(ids),
                    Err(e) => debug!(country = %country, error = %e, "Country list lookup failed"),
                },
                None => entity.set_country_lists(Vec::new()),
            }
        }
    }
}
