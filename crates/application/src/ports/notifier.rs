use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct PromptAction {
    pub id: String,
    pub label: String,
}

/// A user prompt handed to the desktop notifier.
#[derive(Debug, Clone)]
pub struct Prompt {
    /// Deduplication ID, schema
    /// `filter:prompt-<profile-id>-<inbound?>-<ip-or-domain>`.
    pub event_id: String,
    pub title: String,
    pub message: String,
    pub actions: Vec<PromptAction>,
    /// Unix seconds after which the prompt expires.
    pub expires: i64,
    pub event_data: serde_json::Value,
}

#[async_trait]
pub trait NotifierPort: Send + Sync {
    /// Show the prompt and wait for the user. Returns the selected action
    /// ID, or `None` on dismissal or expiry.
    async fn prompt(&self, prompt: Prompt) -> Option<String>;

    /// Cancel an active prompt, e.g. because a re-evaluation made it moot.
    async fn cancel(&self, event_id: &str);
}
