use std::time::Duration;
use tracing::warn;

pub const DEFAULT_AGENT_MODEL: &str = "google/gemini-2.0-flash-001";
pub const DEFAULT_REPORT_MODEL: &str = "google/gemini-2.0-flash-001";
pub const DEFAULT_CLASSIFIER_URL: &str =
    "https://fborrzs1ffpbxfby.us-east-1.aws.endpoints.huggingface.cloud";
pub const DEFAULT_SENDGRID_BASE_URL: &str = "https://api.sendgrid.com";
pub const DEFAULT_TRANSCRIPTION_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
pub const DEFAULT_NOTIFICATION_FROM: &str = "alerts@radiology-copilot.local";

/// Dictations longer than this are cropped before upload
pub const MAX_DURATION_AUDIO_SECS: u64 = 10;

/// Runtime configuration, read from the environment once at startup.
///
/// Missing secrets do not stop the service: the client that needs them
/// answers with an explicit error instead.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub openrouter_api_key: Option<String>,
    pub agent_model: String,
    pub report_model: String,
    pub classifier_url: String,
    pub classifier_api_key: Option<String>,
    pub sendgrid_api_key: Option<String>,
    pub sendgrid_base_url: String,
    pub notification_from: String,
    pub openai_api_key: Option<String>,
    pub transcription_url: String,
    pub max_audio_duration: Duration,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let config = Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(3000),
            openrouter_api_key: secret("OPENROUTER_API_KEY"),
            agent_model: var_or("AGENT_MODEL", DEFAULT_AGENT_MODEL),
            report_model: var_or("REPORT_MODEL", DEFAULT_REPORT_MODEL),
            classifier_url: var_or("CLASSIFIER_URL", DEFAULT_CLASSIFIER_URL),
            classifier_api_key: secret("CLASSIFIER_API_KEY"),
            sendgrid_api_key: secret("SENDGRID_API_KEY"),
            sendgrid_base_url: var_or("SENDGRID_BASE_URL", DEFAULT_SENDGRID_BASE_URL),
            notification_from: var_or("NOTIFICATION_FROM", DEFAULT_NOTIFICATION_FROM),
            openai_api_key: secret("OPENAI_API_KEY"),
            transcription_url: var_or("TRANSCRIPTION_URL", DEFAULT_TRANSCRIPTION_URL),
            max_audio_duration: Duration::from_secs(
                std::env::var("MAX_DURATION_AUDIO")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(MAX_DURATION_AUDIO_SECS),
            ),
        };
        config.warn_missing_secrets();
        config
    }

    fn warn_missing_secrets(&self) {
        let secrets = [
            ("OPENROUTER_API_KEY", &self.openrouter_api_key),
            ("CLASSIFIER_API_KEY", &self.classifier_api_key),
            ("SENDGRID_API_KEY", &self.sendgrid_api_key),
            ("OPENAI_API_KEY", &self.openai_api_key),
        ];
        for (name, value) in secrets {
            if value.is_none() {
                warn!(variable = name, "Secret not set; the dependent client will report an error");
            }
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            openrouter_api_key: None,
            agent_model: DEFAULT_AGENT_MODEL.to_string(),
            report_model: DEFAULT_REPORT_MODEL.to_string(),
            classifier_url: DEFAULT_CLASSIFIER_URL.to_string(),
            classifier_api_key: None,
            sendgrid_api_key: None,
            sendgrid_base_url: DEFAULT_SENDGRID_BASE_URL.to_string(),
            notification_from: DEFAULT_NOTIFICATION_FROM.to_string(),
            openai_api_key: None,
            transcription_url: DEFAULT_TRANSCRIPTION_URL.to_string(),
            max_audio_duration: Duration::from_secs(MAX_DURATION_AUDIO_SECS),
        }
    }
}

fn secret(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
