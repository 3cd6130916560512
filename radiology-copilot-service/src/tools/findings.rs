use std::sync::Arc;
use tracing::{error, info, warn};

use crate::llm::TextModel;
use crate::models::Finding;
use crate::prompts::{self, ACTIONABLE_FINDINGS_INSTRUCTIONS, FINDINGS_PREAMBLE};
use crate::workstation::Workstation;

/// Extracts actionable findings from the session's current report.
pub struct FindingsExtractor {
    model: Arc<dyn TextModel>,
}

impl FindingsExtractor {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    /// Stores the result on the workstation. Any failure yields an empty list.
    pub async fn extract(&self, station: &Workstation) -> Vec<Finding> {
        let report = station.report().await;
        let prompt = prompts::render(ACTIONABLE_FINDINGS_INSTRUCTIONS, &[("report", &report)]);

        let findings = match self.model.complete(FINDINGS_PREAMBLE, &prompt).await {
            Ok(raw) => parse_findings(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "Model answer is not a findings list");
                Vec::new()
            }),
            Err(e) => {
                error!(error = %e, "Actionable findings request failed");
                Vec::new()
            }
        };

        info!(count = findings.len(), "Actionable findings extracted");
        station.set_actionable_findings(&findings).await;
        findings
    }
}

/// Parse a findings list, tolerating a fenced ```json block around it.
pub fn parse_findings(raw: &str) -> serde_json::Result<Vec<Finding>> {
    let mut text = raw.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        text = stripped;
    } else if let Some(stripped) = text.strip_prefix("```") {
        text = stripped;
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped;
    }
    serde_json::from_str(text.trim())
}
