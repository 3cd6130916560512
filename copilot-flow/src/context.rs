use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// One user-message/assistant-reply cycle of the conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub user_message: Option<String>,
    pub assistant_message: Option<String>,
    pub reasoning: Option<String>,
}

impl Interaction {
    pub fn user(message: impl Into<String>) -> Self {
        Self {
            user_message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn assistant(message: impl Into<String>) -> Self {
        Self {
            assistant_message: Some(message.into()),
            ..Self::default()
        }
    }

    /// True once the assistant side of the interaction has been filled in.
    pub fn is_answered(&self) -> bool {
        self.assistant_message.is_some()
    }
}

/// Shared session state handed to every turn and every tool call.
///
/// Cloning is cheap: all clones point at the same key/value map and the same
/// interaction history.
#[derive(Clone, Debug, Default)]
pub struct Context {
    data: Arc<DashMap<String, Value>>,
    history: Arc<RwLock<Vec<Interaction>>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: impl Into<String>, value: impl Serialize) {
        self.set_sync(key, value);
    }

    pub fn set_sync(&self, key: impl Into<String>, value: impl Serialize) {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                self.data.insert(key, value);
            }
            Err(e) => warn!(key = %key, error = %e, "Dropping context value that failed to serialize"),
        }
    }

    pub async fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_sync(key)
    }

    pub fn get_sync<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        self.data.remove(key).map(|(_, v)| v)
    }

    /// Drop every key/value entry. The interaction history is kept.
    pub async fn clear(&self) {
        self.data.clear();
    }

    /// Append a new interaction. History is append-only.
    pub async fn push_interaction(&self, interaction: Interaction) {
        self.history.write().await.push(interaction);
    }

    pub async fn push_user_message(&self, message: impl Into<String>) {
        self.push_interaction(Interaction::user(message)).await;
    }

    /// Fill the assistant side of the most recent interaction in place.
    ///
    /// Returns `false` when the history is empty.
    pub async fn complete_last(
        &self,
        assistant_message: impl Into<String>,
        reasoning: Option<String>,
    ) -> bool {
        let mut history = self.history.write().await;
        match history.last_mut() {
            Some(last) => {
                last.assistant_message = Some(assistant_message.into());
                last.reasoning = reasoning;
                true
            }
            None => false,
        }
    }

    pub async fn interactions(&self) -> Vec<Interaction> {
        self.history.read().await.clone()
    }

    pub async fn last_interaction(&self) -> Option<Interaction> {
        self.history.read().await.last().cloned()
    }

    /// The last `n` interactions, oldest first.
    pub async fn recent_interactions(&self, n: usize) -> Vec<Interaction> {
        let history = self.history.read().await;
        let start = history.len().saturating_sub(n);
        history[start..].to_vec()
    }

    pub async fn interaction_count(&self) -> usize {
        self.history.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_values_round_trip_through_clones() {
        let context = Context::new();
        let clone = context.clone();

        clone.set("report_text", "FINDINGS: none").await;
        let report: Option<String> = context.get("report_text").await;
        assert_eq!(report.as_deref(), Some("FINDINGS: none"));

        assert!(context.remove("report_text").await.is_some());
        assert!(context.get::<String>("report_text").await.is_none());
    }

    #[tokio::test]
    async fn test_clear_keeps_history() {
        let context = Context::new();
        context.set("case_id", 101).await;
        context.set("report_text", "FINDINGS: none").await;
        context.push_user_message("load case 101").await;

        context.clear().await;

        assert!(context.get::<u32>("case_id").await.is_none());
        assert!(context.get::<String>("report_text").await.is_none());
        assert_eq!(context.interaction_count().await, 1);
    }

    #[tokio::test]
    async fn test_get_with_wrong_type_is_none() {
        let context = Context::new();
        context.set("case_id", 101).await;
        assert!(context.get::<String>("case_id").await.is_none());
        assert_eq!(context.get_sync::<u32>("case_id"), Some(101));
    }

    #[tokio::test]
    async fn test_complete_last_only_touches_last_entry() {
        let context = Context::new();
        context.push_user_message("first").await;
        context.push_user_message("second").await;

        assert!(context.complete_last("answer", Some("trace".into())).await);

        let history = context.interactions().await;
        assert_eq!(history.len(), 2);
        assert!(!history[0].is_answered());
        assert_eq!(history[1].assistant_message.as_deref(), Some("answer"));
        assert_eq!(history[1].reasoning.as_deref(), Some("trace"));
    }

    #[tokio::test]
    async fn test_complete_last_on_empty_history() {
        let context = Context::new();
        assert!(!context.complete_last("orphan", None).await);
        assert_eq!(context.interaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_recent_interactions_window() {
        let context = Context::new();
        for i in 0..5 {
            context.push_user_message(format!("message {i}")).await;
        }

        let recent = context.recent_interactions(3).await;
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].user_message.as_deref(), Some("message 2"));
        assert_eq!(recent[2].user_message.as_deref(), Some("message 4"));

        assert_eq!(context.recent_interactions(10).await.len(), 5);
    }
}
