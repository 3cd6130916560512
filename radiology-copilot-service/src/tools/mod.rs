pub mod classifier;
pub mod findings;
pub mod notification;
pub mod report;
pub mod session_tools;
pub mod transcription;

use std::sync::Arc;

use crate::cases::CaseStore;
use crate::config::ServiceConfig;
use crate::llm::OpenRouterModel;
use crate::records::RecordStore;

pub use classifier::{ClassifierError, ImageClassifier};
pub use findings::FindingsExtractor;
pub use notification::Notifier;
pub use report::ReportDrafter;
pub use session_tools::ToolError;
pub use transcription::{Transcriber, TranscriptionError};

/// Everything the agent's tools call into. Shared by all sessions; per-session
/// state lives in the `Workstation` each tool is bound to.
pub struct Toolkit {
    pub cases: CaseStore,
    pub records: RecordStore,
    pub classifier: ImageClassifier,
    pub drafter: ReportDrafter,
    pub findings: FindingsExtractor,
    pub notifier: Notifier,
}

impl Toolkit {
    pub fn from_config(config: &ServiceConfig, http: reqwest::Client) -> Self {
        let report_model = Arc::new(OpenRouterModel::new(
            config.openrouter_api_key.clone(),
            config.report_model.clone(),
        ));

        Self {
            cases: CaseStore::samples(),
            records: RecordStore::samples(),
            classifier: ImageClassifier::new(
                http.clone(),
                config.classifier_url.clone(),
                config.classifier_api_key.clone(),
            ),
            drafter: ReportDrafter::new(report_model.clone()),
            findings: FindingsExtractor::new(report_model),
            notifier: Notifier::new(
                http,
                config.sendgrid_base_url.clone(),
                config.sendgrid_api_key.clone(),
                config.notification_from.clone(),
            ),
        }
    }
}
