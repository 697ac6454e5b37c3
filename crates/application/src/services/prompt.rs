use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use vigil_domain::config::options;
use vigil_domain::{Connection, Reason, Verdict};

use crate::ports::{NotifierPort, Prompt, PromptAction};

const ACTION_PERMIT: &str = "permit";
const ACTION_BLOCK: &str = "block";

/// Raises deduplicated user prompts for the `Ask` default action and maps
/// the response to a verdict.
///
/// Responses are cached per prompt ID and profile revision, so repeated
/// connections to the same endpoint do not re-prompt until the profile
/// changes.
pub struct PromptService {
    notifier: Arc<dyn NotifierPort>,
    timeout: Duration,
    cache: DashMap<String, (u64, Verdict)>,
}

impl PromptService {
    pub fn new(notifier: Arc<dyn NotifierPort>, timeout_secs: u64) -> Self {
        Self {
            notifier,
            timeout: Duration::from_secs(timeout_secs),
            cache: DashMap::new(),
        }
    }

    /// Prompt ID schema: `filter:prompt-<profile-id>-<inbound?>-<ip-or-domain>`.
    pub fn prompt_id(conn: &Connection) -> String {
        let profile_id = conn
            .process_ctx
            .as_ref()
            .map(|p| p.profile_id.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let direction = if conn.direction.is_inbound() { "in" } else { "out" };
        let endpoint = conn
            .entity
            .domain
            .clone()
            .or_else(|| conn.entity.ip.map(|ip| ip.to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        format!("filter:prompt-{profile_id}-{direction}-{endpoint}")
    }

    /// Ask the user about this connection. Falls back to deny on timeout
    /// or dismissal.
    ///
    /// While a prompt is pending, its ID is recorded on the connection so
    /// the re-evaluation engine can cancel it; the handle is cleared as
    /// soon as the notifier concludes (answer or dismissal). A timed-out
    /// prompt may still be on screen, so its handle stays set.
    pub async fn decide(&self, conn: &mut Connection) -> (Verdict, Reason) {
        let id = Self::prompt_id(conn);

        if let Some(cached) = self.cache.get(&id) {
            let (revision, verdict) = *cached;
            if revision == conn.profile_revision {
                debug!(prompt = %id, verdict = %verdict, "Using cached prompt response");
                return (
                    verdict,
                    Reason::with_option("previously decided by user", options::DEFAULT_ACTION),
                );
            }
        }

        let endpoint = conn
            .entity
            .domain
            .clone()
            .or_else(|| conn.entity.ip.map(|ip| ip.to_string()))
            .unwrap_or_default();
        let process = conn
            .process_ctx
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "unknown process".to_string());

        let prompt = Prompt {
            event_id: id.clone(),
            title: format!("{process} wants to connect"),
            message: format!("{process} wants to connect to {endpoint}"),
            actions: vec![
                PromptAction {
                    id: ACTION_PERMIT.to_string(),
                    label: "Allow".to_string(),
                },
                PromptAction {
                    id: ACTION_BLOCK.to_string(),
                    label: "Block".to_string(),
                },
            ],
            expires: Utc::now().timestamp() + self.timeout.as_secs() as i64,
            event_data: json!({
                "conn_id": conn.id,
                "endpoint": endpoint,
            }),
        };

        conn.prompt_id = Some(id.clone());
        let selected = match tokio::time::timeout(self.timeout, self.notifier.prompt(prompt)).await
        {
            Ok(answer) => {
                conn.prompt_id = None;
                answer
            }
            // Timed out: the prompt may still be pending on screen, keep
            // the handle for cancellation.
            Err(_) => None,
        };

        let verdict = match selected.as_deref() {
            Some(ACTION_PERMIT) => Verdict::Accept,
            Some(ACTION_BLOCK) => Verdict::Block,
            // No answer: deny, but do not cache the fallback.
            _ => {
                return (
                    Verdict::Block,
                    Reason::with_option("no response to prompt", options::DEFAULT_ACTION),
                );
            }
        };

        self.cache.insert(id, (conn.profile_revision, verdict));
        (
            verdict,
            Reason::with_option("decided by user", options::DEFAULT_ACTION),
        )
    }

    pub async fn cancel_for(&self, conn: &Connection) {
        self.notifier.cancel(&Self::prompt_id(conn)).await;
    }

    /// Forget cached responses, e.g. on profile deletion.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
