use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{context::Context, error::Result};

/// What a handler produced for one user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    /// Final natural-language reply shown to the user
    pub reply: String,
    /// Formatted trace of intermediate messages and tool calls, if any
    pub reasoning: Option<String>,
}

impl TurnOutcome {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            reasoning: None,
        }
    }

    pub fn with_reasoning(reply: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            reasoning: Some(reasoning.into()),
        }
    }
}

/// Answers a single user message against the session context.
///
/// Implementations may mutate the context (through tools) and may fail; the
/// runner decides whether a failure is retried.
#[async_trait]
pub trait TurnHandler: Send + Sync {
    /// Identifier used in logs
    fn id(&self) -> &str;

    async fn respond(&self, context: Context, message: &str) -> Result<TurnOutcome>;
}
