use std::sync::Arc;
use tracing::{error, info};

use crate::llm::TextModel;
use crate::models::Classification;
use crate::prompts::{
    self, DRAFT_REPORT_INSTRUCTIONS, REPORT_DRAFTER_PREAMBLE, REPORT_TEMPLATE,
    UPDATE_REPORT_INSTRUCTIONS,
};
use crate::workstation::Workstation;

/// Probability at or above which a finding counts as present.
pub const REPORT_PROBABILITY_CUTOFF: f64 = 0.5;

/// Conditions whose probability reaches `cutoff` (inclusive), highest first.
pub fn positive_findings(classification: &Classification, cutoff: f64) -> Vec<(&str, f64)> {
    let mut positive: Vec<(&str, f64)> = classification
        .iter()
        .filter(|(_, p)| **p >= cutoff)
        .map(|(name, p)| (name.as_str(), *p))
        .collect();
    positive.sort_by(|a, b| b.1.total_cmp(&a.1));
    positive
}

/// Drafts and revises the free-text report through the LLM.
///
/// Both operations overwrite the session's report. A failed call leaves an
/// empty report behind.
pub struct ReportDrafter {
    model: Arc<dyn TextModel>,
}

impl ReportDrafter {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    /// Draft a report from classifier output or any serialized findings payload.
    pub async fn draft(&self, station: &Workstation, findings: &str) -> String {
        let positive = serde_json::from_str::<Classification>(findings)
            .map(|c| digest(&positive_findings(&c, REPORT_PROBABILITY_CUTOFF)))
            .unwrap_or_else(|_| "(see findings above)".to_string());

        let prompt = prompts::render(
            DRAFT_REPORT_INSTRUCTIONS,
            &[
                ("cutoff", &REPORT_PROBABILITY_CUTOFF.to_string()),
                ("template", REPORT_TEMPLATE),
                ("findings", findings),
                ("positive", &positive),
            ],
        );

        let report = self.call("draft", &prompt).await;
        station.set_report(report.clone()).await;
        report
    }

    /// Rewrite the current report according to free-text instructions.
    pub async fn revise(&self, station: &Workstation, instructions: &str) -> String {
        let current = station.report().await;
        let prompt = prompts::render(
            UPDATE_REPORT_INSTRUCTIONS,
            &[("report", &current), ("changes", instructions)],
        );

        let report = self.call("revise", &prompt).await;
        station.set_report(report.clone()).await;
        report
    }

    async fn call(&self, operation: &str, prompt: &str) -> String {
        match self.model.complete(REPORT_DRAFTER_PREAMBLE, prompt).await {
            Ok(text) => {
                info!(operation, chars = text.len(), "Report text generated");
                text.trim().to_string()
            }
            Err(e) => {
                error!(operation, error = %e, "Report generation failed");
                String::new()
            }
        }
    }
}

fn digest(positive: &[(&str, f64)]) -> String {
    if positive.is_empty() {
        return "None".to_string();
    }
    positive
        .iter()
        .map(|(name, p)| format!("- {name}: {p}"))
        .collect::<Vec<_>>()
        .join("\n")
}
