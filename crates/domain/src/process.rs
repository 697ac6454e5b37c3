use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::profile::LayeredProfile;

/// Snapshot of the process a connection was attributed to. Persisted with
/// the connection record, so it must stay serialisable and self-contained.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessContext {
    pub pid: u32,
    pub name: String,
    pub path: String,
    pub cmdline: String,
    pub profile_id: String,
    pub profile_source: String,
    pub primary_profile_id: String,
}

/// A process as reported by the process-identification collaborator.
#[derive(Clone)]
pub struct Process {
    pub pid: u32,
    pub path: String,
    pub name: String,
    pub exec_name: String,
    pub parent_pid: u32,
    pub cmdline: String,
    profile: Arc<LayeredProfile>,
}

impl Process {
    pub fn new(
        pid: u32,
        path: impl Into<String>,
        name: impl Into<String>,
        exec_name: impl Into<String>,
        parent_pid: u32,
        cmdline: impl Into<String>,
        profile: Arc<LayeredProfile>,
    ) -> Self {
        Self {
            pid,
            path: path.into(),
            name: name.into(),
            exec_name: exec_name.into(),
            parent_pid,
            cmdline: cmdline.into(),
            profile,
        }
    }

    pub fn profile(&self) -> Arc<LayeredProfile> {
        Arc::clone(&self.profile)
    }

    pub fn context(&self) -> ProcessContext {
        let local = self.profile.local_layer();
        ProcessContext {
            pid: self.pid,
            name: self.name.clone(),
            path: self.path.clone(),
            cmdline: self.cmdline.clone(),
            profile_id: local.id.clone(),
            profile_source: local.source.clone(),
            primary_profile_id: format!("{}/{}", local.source, local.id),
        }
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("path", &self.path)
            .finish()
    }
}
