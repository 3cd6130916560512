pub mod agent;
pub mod cases;
pub mod config;
pub mod llm;
pub mod models;
pub mod prompts;
pub mod records;
pub mod service;
pub mod tools;
pub mod workflow;
pub mod workstation;

pub use agent::CopilotAgent;
pub use config::ServiceConfig;
pub use models::*;
pub use service::{AppState, build_router, create_app};
pub use tools::Toolkit;
pub use workstation::Workstation;
