use arc_swap::ArcSwap;
use async_trait::async_trait;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use vigil_application::ports::{FilterListPort, StorageInterface};
use vigil_domain::{CoreError, Query};

use super::index::DomainListIndex;

/// One filter list's entries, as loaded from the record store (list
/// content fetching happens outside the core).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListSource {
    pub id: String,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub networks: Vec<IpNetwork>,
    #[serde(default)]
    pub asns: Vec<u32>,
    #[serde(default)]
    pub countries: Vec<String>,
}

/// Compiled membership index, swapped atomically on reload.
#[derive(Default)]
struct CompiledIndex {
    ids: Vec<String>,
    domains: DomainListIndex,
    networks: Vec<(IpNetwork, u64)>,
    asns: HashMap<u32, u64>,
    countries: HashMap<String, u64>,
}

impl CompiledIndex {
    fn compile(sources: &[ListSource]) -> Self {
        let mut compiled = CompiledIndex::default();
        for (i, source) in sources.iter().enumerate().take(64) {
            let mask = 1u64 << i;
            compiled.ids.push(source.id.clone());
            for domain in &source.domains {
                compiled.domains.insert(domain, mask);
            }
            for network in &source.networks {
                compiled.networks.push((*network, mask));
            }
            for asn in &source.asns {
                *compiled.asns.entry(*asn).or_default() |= mask;
            }
            for country in &source.countries {
                *compiled.countries.entry(country.clone()).or_default() |= mask;
            }
        }
        if sources.len() > 64 {
            warn!(count = sources.len(), "More than 64 filter lists, extra lists ignored");
        }
        compiled
    }

    fn mask_to_ids(&self, mask: u64) -> Vec<String> {
        self.ids
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1u64 << i) != 0)
            .map(|(_, id)| id.clone())
            .collect()
    }
}

/// Filter-list membership engine.
///
/// All lookup state lives in memory; the compiled index is swapped
/// atomically during `reload`, so lookups never block. Until the first
/// successful load the engine reports not-ready and the decider chain
/// degrades to "filterlists disabled".
pub struct FilterListEngine {
    index: ArcSwap<CompiledIndex>,
    ready: AtomicBool,
}

impl FilterListEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            index: ArcSwap::from_pointee(CompiledIndex::default()),
            ready: AtomicBool::new(false),
        })
    }

    /// Compile and swap in new list sources.
    pub fn load(&self, sources: &[ListSource]) {
        let compiled = CompiledIndex::compile(sources);
        info!(lists = compiled.ids.len(), "Filter list index compiled");
        self.index.store(Arc::new(compiled));
        self.ready.store(true, Ordering::Release);
    }

    /// Load list sources from `cache:filterlists/` records.
    pub async fn load_from_storage(
        &self,
        storage: &Arc<dyn StorageInterface>,
    ) -> Result<(), CoreError> {
        let query = Query::new("cache:filterlists/").check()?;
        let mut iterator = storage.query(&query, true, true).await?;
        let mut sources = Vec::new();
        while let Some(record) = iterator.next().await {
            match record.parse_body::<ListSource>() {
                Ok(source) => sources.push(source),
                Err(e) => warn!(key = %record.key, error = %e, "Skipping malformed list source"),
            }
        }
        if sources.is_empty() {
            warn!("No filter list sources in storage; lookups stay disabled");
            return Ok(());
        }
        self.load(&sources);
        Ok(())
    }
}

#[async_trait]
impl FilterListPort for FilterListEngine {
    fn ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn lookup_domain(&self, domain: &str) -> Result<Vec<String>, CoreError> {
        let index = self.index.load();
        let mask = index.domains.lookup(domain);
        Ok(index.mask_to_ids(mask))
    }

    async fn lookup_ip(&self, ip: IpAddr) -> Result<Vec<String>, CoreError> {
        let index = self.index.load();
        let mut mask = 0u64;
        for (network, list_mask) in &index.networks {
            if network.contains(ip) {
                mask |= list_mask;
            }
        }
        Ok(index.mask_to_ids(mask))
    }

    async fn lookup_asn(&self, asn: u32) -> Result<Vec<String>, CoreError> {
        let index = self.index.load();
        Ok(index.mask_to_ids(index.asns.get(&asn).copied().unwrap_or(0)))
    }

    async fn lookup_country(&self, country: &str) -> Result<Vec<String>, CoreError> {
        let index = self.index.load();
        Ok(index.mask_to_ids(index.countries.get(country).copied().unwrap_or(0)))
    }
}
