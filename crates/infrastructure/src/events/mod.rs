use tokio::sync::mpsc;

/// Events that invalidate existing verdicts and feed the re-evaluation
/// worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Global configuration changed.
    ConfigChange,
    /// One profile changed; scoped to `source/id`.
    ProfileChange { scope: String },
    /// The SPN/tunnel transitioned to connected.
    TunnelConnected,
    /// Account state changed.
    AccountUpdate,
    /// A connection was re-attributed to a new process.
    ReAttribution { conn_id: String },
}

impl Trigger {
    /// Profile scope this trigger is limited to, if any.
    pub fn scope(&self) -> Option<&str> {
        match self {
            Trigger::ProfileChange { scope } => Some(scope),
            _ => None,
        }
    }
}

/// Non-blocking fan-in bus for invalidation triggers.
///
/// Emitting never blocks the hot path; when the bus is disabled or the
/// worker is gone, triggers are silently dropped (invalidation is
/// best-effort, the periodic workers catch up).
#[derive(Clone)]
pub struct TriggerBus {
    sender: Option<mpsc::UnboundedSender<Trigger>>,
}

impl TriggerBus {
    pub fn new_disabled() -> Self {
        Self { sender: None }
    }

    pub fn new_enabled() -> (Self, mpsc::UnboundedReceiver<Trigger>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { sender: Some(tx) }, rx)
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    pub fn emit(&self, trigger: Trigger) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(trigger);
        }
    }
}
