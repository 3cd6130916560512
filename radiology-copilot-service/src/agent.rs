//! The conversational turn handler: one rig agent per turn, bound to the
//! session's workstation, with the copilot's tools attached.

use async_trait::async_trait;
use copilot_flow::{Context, FlowError, Interaction, TurnHandler, TurnOutcome};
use rig::completion::{Message, Prompt};
use rig::message::{AssistantContent, ToolResultContent, UserContent};
use rig::prelude::*;
use rig::providers::openrouter;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::prompts::AGENT_INSTRUCTIONS;
use crate::tools::Toolkit;
use crate::tools::session_tools::{
    GenerateReport, GetClinicalData, GetNotificationEmail, InterpretXray, ListAvailableCases,
    LoadCase, SearchActionableFindings, SearchRecords, SendNotification, UpdateNotificationEmail,
    UpdateReport,
};
use crate::workstation::Workstation;

/// Prior interactions replayed to the model on every turn.
pub const HISTORY_WINDOW: usize = 3;
/// Tool round trips allowed before the agent must answer.
pub const MAX_TOOL_TURNS: usize = 5;

const TRACE_SEPARATOR_WIDTH: usize = 50;

pub struct CopilotAgent {
    api_key: Option<String>,
    model: String,
    kit: Arc<Toolkit>,
}

impl CopilotAgent {
    pub fn new(api_key: Option<String>, model: impl Into<String>, kit: Arc<Toolkit>) -> Self {
        Self {
            api_key,
            model: model.into(),
            kit,
        }
    }

    fn build_agent(
        &self,
        api_key: &str,
        station: &Workstation,
    ) -> rig::agent::Agent<openrouter::CompletionModel> {
        let client = openrouter::Client::new(api_key);
        let kit = &self.kit;
        client
            .agent(&self.model)
            .preamble(AGENT_INSTRUCTIONS)
            .tool(LoadCase::new(station.clone(), kit.clone()))
            .tool(ListAvailableCases::new(kit.clone()))
            .tool(InterpretXray::new(station.clone(), kit.clone()))
            .tool(GenerateReport::new(station.clone(), kit.clone()))
            .tool(UpdateReport::new(station.clone(), kit.clone()))
            .tool(SearchActionableFindings::new(station.clone(), kit.clone()))
            .tool(SendNotification::new(station.clone(), kit.clone()))
            .tool(UpdateNotificationEmail::new(station.clone(), kit.clone()))
            .tool(GetNotificationEmail::new(station.clone(), kit.clone()))
            .tool(GetClinicalData::new(station.clone(), kit.clone()))
            .tool(SearchRecords::new(kit.clone()))
            .build()
    }
}

#[async_trait]
impl TurnHandler for CopilotAgent {
    fn id(&self) -> &str {
        "radiology_copilot"
    }

    async fn respond(&self, context: Context, message: &str) -> copilot_flow::Result<TurnOutcome> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| FlowError::TurnFailed("OPENROUTER_API_KEY not set".to_string()))?;

        let station = Workstation::new(context.clone());
        let agent = self.build_agent(api_key, &station);

        let mut history = chat_history(&context).await;
        let replayed = history.len();
        info!(replayed, model = %self.model, "Prompting copilot agent");

        let reply = agent
            .prompt(message)
            .with_history(&mut history)
            .multi_turn(MAX_TOOL_TURNS)
            .await
            .map_err(|e| {
                warn!(error = %e, "Copilot agent failed");
                FlowError::TurnFailed(e.to_string())
            })?;

        let trace = format_trace(history.get(replayed..).unwrap_or_default());
        Ok(TurnOutcome::with_reasoning(reply, trace))
    }
}

/// The last answered interactions before the pending turn, as chat messages.
pub async fn chat_history(context: &Context) -> Vec<Message> {
    let mut recent = context.recent_interactions(HISTORY_WINDOW + 1).await;
    if recent.last().is_some_and(|last| !last.is_answered()) {
        recent.pop();
    }
    let skip = recent.len().saturating_sub(HISTORY_WINDOW);
    recent[skip..].iter().flat_map(to_messages).collect()
}

fn to_messages(interaction: &Interaction) -> Vec<Message> {
    let mut messages = Vec::new();
    if let Some(user) = &interaction.user_message {
        messages.push(Message::user(user.clone()));
    }
    if let Some(assistant) = &interaction.assistant_message {
        messages.push(Message::assistant(assistant.clone()));
    }
    messages
}

/// Render the messages of one turn for display beside the reply.
pub fn format_trace(messages: &[Message]) -> String {
    let separator = "-".repeat(TRACE_SEPARATOR_WIDTH);
    messages
        .iter()
        .map(|message| format!("{}\n{separator}\n", format_message(message)))
        .collect()
}

fn format_message(message: &Message) -> String {
    let mut lines = Vec::new();
    match message {
        Message::User { content } => {
            let mut role = "user";
            for part in content.iter() {
                match part {
                    UserContent::Text(text) => lines.push(format_content(&text.text)),
                    UserContent::ToolResult(result) => {
                        role = "tool";
                        for item in result.content.iter() {
                            if let ToolResultContent::Text(text) = item {
                                lines.push(format_content(&text.text));
                            }
                        }
                    }
                    _ => lines.push("Content: [attachment]".to_string()),
                }
            }
            lines.insert(0, format!("Role: {role}"));
        }
        Message::Assistant { content, .. } => {
            lines.push("Role: assistant".to_string());
            let mut calls = Vec::new();
            for part in content.iter() {
                match part {
                    AssistantContent::Text(text) => lines.push(format_content(&text.text)),
                    AssistantContent::ToolCall(call) => calls.push(format!(
                        "  Tool Name: {}\n  Arguments: {}",
                        call.function.name, call.function.arguments
                    )),
                    _ => {}
                }
            }
            if !calls.is_empty() {
                lines.push(format!("Tool Calls:\n{}", calls.join("\n")));
            }
        }
    }
    lines.join("\n")
}

/// JSON objects and arrays are pretty-printed; everything else is shown as is.
fn format_content(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => {
            let pretty = serde_json::to_string_pretty(&value).unwrap_or_else(|_| text.to_string());
            format!("Content (JSON):\n{pretty}")
        }
        _ => format!("Content: {text}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::tools::session_tools::tests::toolkit;
    use wiremock::MockServer;

    #[tokio::test]
    async fn test_history_window_excludes_pending_turn() {
        let context = Context::new();
        context
            .push_interaction(Interaction::assistant("Hello! How can I help?"))
            .await;
        for i in 1..=4 {
            context.push_user_message(format!("question {i}")).await;
            context.complete_last(format!("answer {i}"), None).await;
        }
        context.push_user_message("pending").await;

        let history = chat_history(&context).await;
        assert_eq!(history.len(), 2 * HISTORY_WINDOW);
        let trace = format_trace(&history);
        assert!(trace.starts_with("Role: user\nContent: question 2\n"));
        assert!(trace.contains("Role: assistant\nContent: answer 4\n"));
        assert!(!trace.contains("pending"));
    }

    #[tokio::test]
    async fn test_history_of_fresh_session_is_greeting_only() {
        let context = Context::new();
        context
            .push_interaction(Interaction::assistant("Hello! How can I help?"))
            .await;
        context.push_user_message("load case 101").await;

        let history = chat_history(&context).await;
        assert_eq!(history.len(), 1);
        assert_eq!(
            format_trace(&history),
            format!("Role: assistant\nContent: Hello! How can I help?\n{}\n", "-".repeat(50))
        );
    }

    #[test]
    fn test_trace_layout() {
        let trace = format_trace(&[
            Message::user("Interpret the image"),
            Message::assistant(r#"{"Pneumonia": 0.9}"#),
        ]);
        let separator = "-".repeat(50);
        let blocks: Vec<&str> = trace.split(&format!("\n{separator}\n")).collect();

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], "Role: user\nContent: Interpret the image");
        assert_eq!(
            blocks[1],
            "Role: assistant\nContent (JSON):\n{\n  \"Pneumonia\": 0.9\n}"
        );
        assert_eq!(blocks[2], "");
    }

    #[test]
    fn test_trace_shows_tool_calls_and_results() {
        let call = Message::Assistant {
            id: None,
            content: rig::OneOrMany::one(AssistantContent::tool_call(
                "call_1",
                "interpret_xray",
                serde_json::json!({ "image_url": null }),
            )),
        };
        let result = Message::tool_result("call_1", r#"{"Pneumonia": 0.91}"#);
        let trace = format_trace(&[call, result]);
        let separator = "-".repeat(50);
        let blocks: Vec<&str> = trace.split(&format!("\n{separator}\n")).collect();

        assert_eq!(
            blocks[0],
            "Role: assistant\nTool Calls:\n  Tool Name: interpret_xray\n  Arguments: {\"image_url\":null}"
        );
        assert_eq!(
            blocks[1],
            "Role: tool\nContent (JSON):\n{\n  \"Pneumonia\": 0.91\n}"
        );
    }

    #[tokio::test]
    async fn test_missing_key_fails_the_turn() {
        let server = MockServer::start().await;
        let agent = CopilotAgent::new(
            None,
            "any/model",
            toolkit(&server, Arc::new(ScriptedModel::default())),
        );
        let err = agent.respond(Context::new(), "hello").await.unwrap_err();
        assert!(matches!(err, FlowError::TurnFailed(ref m) if m.contains("OPENROUTER_API_KEY")));
    }
}
