//! TurnRunner – loads a session, runs exactly **one** conversational turn under the retry
//! policy, and persists the session back to storage.
//!
//! A turn moves the session from `Idle` to `Processing` and back. Only one turn can be in
//! flight per session; a second submission while one is running is rejected with
//! [`FlowError::TurnInProgress`] rather than queued.
//!
//! ```rust,ignore
//! let runner = TurnRunner::new(handler, storage);
//! let result = runner.submit(&session_id, "Interpret the x-ray").await?;
//! println!("{}", result.response);
//! ```

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    error::{FlowError, Result},
    retry::RetryPolicy,
    storage::{Session, SessionStorage},
    turn::TurnHandler,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum TurnStatus {
    /// The handler produced a reply
    Answered,
    /// Every attempt failed; the last error was recorded as the reply
    Failed(String),
}

/// Outcome of one submitted turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub response: String,
    pub reasoning: Option<String>,
    pub attempts: u32,
    #[serde(flatten)]
    pub status: TurnStatus,
}

/// Resets the processing flag however the turn ends.
struct ProcessingGuard<'a> {
    session: &'a Session,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.session.end_turn();
    }
}

/// High-level helper that orchestrates the _load → respond (with retries) → save_ cycle.
#[derive(Clone)]
pub struct TurnRunner {
    handler: Arc<dyn TurnHandler>,
    storage: Arc<dyn SessionStorage>,
    retry: RetryPolicy,
}

impl TurnRunner {
    pub fn new(handler: Arc<dyn TurnHandler>, storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            handler,
            storage,
            retry: RetryPolicy::turn(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Submit one user message to the session and wait for the reply.
    pub async fn submit(&self, session_id: &str, message: &str) -> Result<TurnResult> {
        let message = message.trim();
        if message.is_empty() {
            return Err(FlowError::EmptyMessage);
        }

        // 1. Load session
        let session = self
            .storage
            .get(session_id)
            .await?
            .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))?;

        // 2. Idle -> Processing
        if !session.try_begin_turn() {
            warn!(session_id = %session_id, "Rejecting message while a turn is in flight");
            return Err(FlowError::TurnInProgress(session_id.to_string()));
        }
        let _guard = ProcessingGuard { session: &session };

        session.context.push_user_message(message).await;

        info!(
            session_id = %session_id,
            handler = %self.handler.id(),
            max_attempts = self.retry.max_attempts(),
            "Processing turn"
        );

        // 3. Respond, retrying the whole turn on failure
        let outcome = self
            .retry
            .run("turn", |_| {
                self.handler.respond(session.context.clone(), message)
            })
            .await;

        let result = match outcome.value {
            Ok(turn) => {
                session
                    .context
                    .complete_last(turn.reply.clone(), turn.reasoning.clone())
                    .await;
                info!(
                    session_id = %session_id,
                    attempts = outcome.attempts,
                    "Turn answered"
                );
                TurnResult {
                    response: turn.reply,
                    reasoning: turn.reasoning,
                    attempts: outcome.attempts,
                    status: TurnStatus::Answered,
                }
            }
            Err(e) => {
                let shown = e.to_string();
                session.context.complete_last(shown.clone(), None).await;
                error!(
                    session_id = %session_id,
                    attempts = outcome.attempts,
                    error = %e,
                    "Turn failed after all attempts"
                );
                TurnResult {
                    response: shown.clone(),
                    reasoning: None,
                    attempts: outcome.attempts,
                    status: TurnStatus::Failed(shown),
                }
            }
        };

        // 4. Persist so the next call sees the updated history
        self.storage.save(session.clone()).await?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::Context, storage::InMemorySessionStorage, turn::TurnOutcome};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, Instant};
    use tokio::sync::Notify;

    /// Fails until `succeed_on` attempts have been made.
    struct FlakyHandler {
        calls: AtomicU32,
        succeed_on: u32,
    }

    #[async_trait]
    impl TurnHandler for FlakyHandler {
        fn id(&self) -> &str {
            "flaky"
        }

        async fn respond(&self, context: Context, message: &str) -> Result<TurnOutcome> {
            let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt < self.succeed_on {
                return Err(FlowError::TurnFailed(format!("model unavailable ({attempt})")));
            }
            context.set("last_message", message).await;
            Ok(TurnOutcome::with_reasoning(
                format!("attempt {attempt}: {message}"),
                "Role: assistant",
            ))
        }
    }

    /// Blocks until released so a second submission can observe `Processing`.
    struct GatedHandler {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl TurnHandler for GatedHandler {
        fn id(&self) -> &str {
            "gated"
        }

        async fn respond(&self, _context: Context, _message: &str) -> Result<TurnOutcome> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(TurnOutcome::new("released"))
        }
    }

    async fn runner_with(
        handler: Arc<dyn TurnHandler>,
        backoff: Duration,
    ) -> (TurnRunner, Arc<InMemorySessionStorage>) {
        let storage = Arc::new(InMemorySessionStorage::new());
        storage.save(Session::new("s1")).await.unwrap();
        let runner =
            TurnRunner::new(handler, storage.clone()).with_retry(RetryPolicy::fixed(3, backoff));
        (runner, storage)
    }

    #[tokio::test]
    async fn test_turn_answered_first_try() {
        let handler = Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            succeed_on: 1,
        });
        let (runner, storage) = runner_with(handler, Duration::ZERO).await;

        let result = runner.submit("s1", "  hello  ").await.unwrap();
        assert_eq!(result.status, TurnStatus::Answered);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.response, "attempt 1: hello");

        let session = storage.get("s1").await.unwrap().unwrap();
        let last = session.context.last_interaction().await.unwrap();
        assert_eq!(last.user_message.as_deref(), Some("hello"));
        assert_eq!(last.assistant_message.as_deref(), Some("attempt 1: hello"));
        assert_eq!(last.reasoning.as_deref(), Some("Role: assistant"));
        assert_eq!(session.state(), crate::storage::TurnState::Idle);
    }

    #[tokio::test]
    async fn test_turn_succeeds_on_third_attempt_after_backoff() {
        let backoff = Duration::from_millis(25);
        let handler = Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            succeed_on: 3,
        });
        let (runner, storage) = runner_with(handler, backoff).await;

        let started = Instant::now();
        let result = runner.submit("s1", "draft the report").await.unwrap();

        assert!(started.elapsed() >= backoff * 2);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.response, "attempt 3: draft the report");

        let session = storage.get("s1").await.unwrap().unwrap();
        let history = session.context.interactions().await;
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].assistant_message.as_deref(),
            Some("attempt 3: draft the report")
        );
    }

    #[tokio::test]
    async fn test_exhausted_turn_records_error_as_reply() {
        let handler = Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            succeed_on: 10,
        });
        let (runner, storage) = runner_with(handler, Duration::ZERO).await;

        let result = runner.submit("s1", "anything").await.unwrap();
        assert_eq!(result.attempts, 3);
        assert!(matches!(result.status, TurnStatus::Failed(_)));
        assert!(result.response.contains("model unavailable (3)"));

        let session = storage.get("s1").await.unwrap().unwrap();
        let last = session.context.last_interaction().await.unwrap();
        assert_eq!(last.assistant_message, Some(result.response));
        assert_eq!(session.state(), crate::storage::TurnState::Idle);
    }

    #[tokio::test]
    async fn test_second_message_rejected_while_processing() {
        let handler = Arc::new(GatedHandler {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let (runner, storage) = runner_with(handler.clone(), Duration::ZERO).await;

        let first = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.submit("s1", "first").await })
        };
        handler.entered.notified().await;

        let session = storage.get("s1").await.unwrap().unwrap();
        assert_eq!(session.state(), crate::storage::TurnState::Processing);

        let second = runner.submit("s1", "second").await;
        assert!(matches!(second, Err(FlowError::TurnInProgress(_))));

        handler.release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.response, "released");

        let session = storage.get("s1").await.unwrap().unwrap();
        assert_eq!(session.context.interaction_count().await, 1);
        assert_eq!(session.state(), crate::storage::TurnState::Idle);
    }

    #[tokio::test]
    async fn test_unknown_session_and_blank_message() {
        let handler = Arc::new(FlakyHandler {
            calls: AtomicU32::new(0),
            succeed_on: 1,
        });
        let (runner, _) = runner_with(handler, Duration::ZERO).await;

        assert!(matches!(
            runner.submit("missing", "hi").await,
            Err(FlowError::SessionNotFound(_))
        ));
        assert!(matches!(
            runner.submit("s1", "   ").await,
            Err(FlowError::EmptyMessage)
        ));
    }
}
