pub mod context;
pub mod error;
pub mod retry;
pub mod runner;
pub mod storage;
pub mod turn;

// Re-export commonly used types
pub use context::{Context, Interaction};
pub use error::{FlowError, Result};
pub use retry::{Attempted, RetryPolicy};
pub use runner::{TurnResult, TurnRunner, TurnStatus};
pub use storage::{InMemorySessionStorage, Session, SessionStorage, TurnState};
pub use turn::{TurnHandler, TurnOutcome};
