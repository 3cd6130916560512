use async_trait::async_trait;
use rig::{agent::Agent, completion::Prompt, prelude::*, providers::openrouter};

/// Single-shot text completion, the seam the report and findings clients talk through.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, preamble: &str, prompt: &str) -> anyhow::Result<String>;
}

/// Build a preamble-only agent on OpenRouter.
pub fn get_llm_agent(
    api_key: Option<&str>,
    model: &str,
    preamble: &str,
) -> anyhow::Result<Agent<openrouter::CompletionModel>> {
    let api_key = api_key.ok_or_else(|| anyhow::anyhow!("OPENROUTER_API_KEY not set"))?;
    let client = openrouter::Client::new(api_key);
    Ok(client.agent(model).preamble(preamble).build())
}

pub struct OpenRouterModel {
    api_key: Option<String>,
    model: String,
}

impl OpenRouterModel {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            api_key,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TextModel for OpenRouterModel {
    async fn complete(&self, preamble: &str, prompt: &str) -> anyhow::Result<String> {
        let agent = get_llm_agent(self.api_key.as_deref(), &self.model, preamble)?;
        let response = agent.prompt(prompt).await?;
        Ok(response)
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned answers and records every prompt it was given.
    #[derive(Default)]
    pub struct ScriptedModel {
        answers: Mutex<VecDeque<anyhow::Result<String>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub fn answering(answers: Vec<anyhow::Result<String>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn last_prompt(&self) -> Option<String> {
            self.prompts.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl TextModel for ScriptedModel {
        async fn complete(&self, _preamble: &str, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted answer left")))
        }
    }

    #[tokio::test]
    async fn test_missing_key_is_an_error_not_a_panic() {
        let model = OpenRouterModel::new(None, "any/model");
        let err = model.complete("p", "q").await.unwrap_err();
        assert!(err.to_string().contains("OPENROUTER_API_KEY"));
    }
}
