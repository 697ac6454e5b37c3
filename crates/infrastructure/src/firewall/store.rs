use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

use vigil_application::ports::{ConnectionsViewPort, NetEnvPort};
use vigil_domain::{netenv, Connection, ConnectionKind, IpProtocol, Process};

pub type SharedConn = Arc<Mutex<Connection>>;

/// The two live-connection tables: IP connections and DNS request
/// records, both keyed by connection ID.
///
/// The tables are guarded by read/write locks; the individual connections
/// carry their own lock and must still be locked to read mutable state.
/// `clone_snapshot` hands out a shallow snapshot safe to iterate without
/// holding the table lock.
pub struct ConnectionStore {
    conns: RwLock<HashMap<String, SharedConn, FxBuildHasher>>,
    dns_conns: RwLock<HashMap<String, SharedConn, FxBuildHasher>>,
    netenv: Arc<dyn NetEnvPort>,
}

impl ConnectionStore {
    pub fn new(netenv: Arc<dyn NetEnvPort>) -> Self {
        Self {
            conns: RwLock::new(HashMap::with_hasher(FxBuildHasher)),
            dns_conns: RwLock::new(HashMap::with_hasher(FxBuildHasher)),
            netenv,
        }
    }

    fn table(&self, kind: ConnectionKind) -> &RwLock<HashMap<String, SharedConn, FxBuildHasher>> {
        match kind {
            ConnectionKind::Ip => &self.conns,
            ConnectionKind::DnsRequest => &self.dns_conns,
        }
    }

    pub fn add(&self, conn: Connection) -> SharedConn {
        let kind = conn.kind;
        let id = conn.id.clone();
        let shared = Arc::new(Mutex::new(conn));
        self.table(kind)
            .write()
            .expect("connection table lock")
            .insert(id, Arc::clone(&shared));
        shared
    }

    pub fn get(&self, id: &str) -> Option<SharedConn> {
        self.conns
            .read()
            .expect("connection table lock")
            .get(id)
            .cloned()
    }

    pub fn get_dns(&self, id: &str) -> Option<SharedConn> {
        self.dns_conns
            .read()
            .expect("connection table lock")
            .get(id)
            .cloned()
    }

    pub fn delete(&self, kind: ConnectionKind, id: &str) {
        self.table(kind)
            .write()
            .expect("connection table lock")
            .remove(id);
    }

    pub fn find_by_prefix(&self, prefix: &str) -> Vec<SharedConn> {
        self.conns
            .read()
            .expect("connection table lock")
            .iter()
            .filter(|(id, _)| id.starts_with(prefix))
            .map(|(_, conn)| Arc::clone(conn))
            .collect()
    }

    /// Shallow snapshot of both tables.
    pub fn clone_snapshot(&self) -> HashMap<String, SharedConn, FxBuildHasher> {
        let mut snapshot: HashMap<String, SharedConn, FxBuildHasher> =
            HashMap::with_hasher(FxBuildHasher);
        for (id, conn) in self.conns.read().expect("connection table lock").iter() {
            snapshot.insert(id.clone(), Arc::clone(conn));
        }
        for (id, conn) in self.dns_conns.read().expect("connection table lock").iter() {
            snapshot.insert(id.clone(), Arc::clone(conn));
        }
        snapshot
    }

    pub fn list(&self) -> Vec<SharedConn> {
        self.clone_snapshot().into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.conns.read().expect("connection table lock").len()
            + self.dns_conns.read().expect("connection table lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Connections still live (`ended == 0`). Feeds the active-count
    /// metric.
    pub async fn active(&self) -> usize {
        let mut count = 0;
        for conn in self.list() {
            if !conn.lock().await.has_ended() {
                count += 1;
            }
        }
        count
    }
}

impl ConnectionsViewPort for ConnectionStore {
    /// Scan the live IP table for an outbound broadcast/multicast query
    /// this inbound packet could be a reply to. Connections currently
    /// owned by a handler are skipped; a live query connection is idle.
    fn find_broadcast_query(
        &self,
        protocol: IpProtocol,
        local_ip: IpAddr,
        local_port: u16,
        pid: u32,
    ) -> Option<IpAddr> {
        let networks = self.netenv.local_networks();
        let table = self.conns.read().expect("connection table lock");
        for conn in table.values() {
            let Ok(conn) = conn.try_lock() else {
                continue;
            };
            if conn.direction.is_inbound()
                || conn.has_ended()
                || conn.protocol != protocol
                || conn.local_port != local_port
                || conn.pid() != Some(pid)
            {
                continue;
            }
            if conn.local_ip != local_ip && !conn.local_ip.is_unspecified() {
                continue;
            }
            let Some(remote) = conn.entity.ip else {
                continue;
            };
            if netenv::is_broadcast_or_multicast(remote, &networks) {
                return Some(remote);
            }
        }
        None
    }

    fn snapshot(&self) -> Vec<Connection> {
        self.list()
            .into_iter()
            .filter_map(|conn| conn.try_lock().ok().map(|c| c.clone()))
            .collect()
    }
}

/// Processes attributed to live connections, keyed by PID. Holds the
/// profile handles the re-evaluation engine needs.
pub struct ProcessRegistry {
    processes: DashMap<u32, Process, FxBuildHasher>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self {
            processes: DashMap::with_hasher(FxBuildHasher),
        }
    }

    pub fn insert(&self, process: Process) {
        self.processes.insert(process.pid, process);
    }

    pub fn get(&self, pid: u32) -> Option<Process> {
        self.processes.get(&pid).map(|p| p.clone())
    }

    pub fn remove(&self, pid: u32) {
        self.processes.remove(&pid);
    }

    /// Mark profiles matching `scope` (`source/id`) as outdated so the
    /// next usage recomputes them.
    pub fn mark_profiles_outdated(&self, scope: Option<&str>) {
        for entry in self.processes.iter() {
            let profile = entry.value().profile();
            match scope {
                Some(scope) if profile.scoped_id() != scope => {}
                _ => profile.mark_outdated(),
            }
        }
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}
