use copilot_flow::Context;
use serde::Serialize;

use crate::models::{Case, Classification, Finding};
use crate::workflow::Stage;

pub mod session_keys {
    pub const CURRENT_CASE: &str = "current_case";
    pub const IMAGE_URL: &str = "image_url";
    pub const REPORT_TEXT: &str = "report_text";
    pub const CLASSIFICATION: &str = "classification";
    pub const ACTIONABLE_FINDINGS: &str = "actionable_findings";
    pub const NOTIFICATION_EMAIL: &str = "notification_email";
    pub const STAGE: &str = "stage";
}

/// Typed view over a session's shared state.
///
/// Every tool receives one of these explicitly; nothing reads session state
/// from anywhere else.
#[derive(Clone, Debug)]
pub struct Workstation {
    context: Context,
}

/// Point-in-time copy of the workstation, for display.
#[derive(Debug, Clone, Serialize)]
pub struct WorkstationSnapshot {
    pub current_case: Option<u32>,
    pub image_url: Option<String>,
    pub report: String,
    pub notification_email: String,
    pub stage: Stage,
    pub classification: Option<Classification>,
    pub actionable_findings: Vec<Finding>,
}

impl Workstation {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    pub async fn current_case(&self) -> Option<u32> {
        self.context.get(session_keys::CURRENT_CASE).await
    }

    pub async fn image_url(&self) -> Option<String> {
        self.context.get(session_keys::IMAGE_URL).await
    }

    /// Open a case: everything derived from the previous image is discarded.
    pub async fn open_case(&self, case: &Case) {
        self.context.set(session_keys::CURRENT_CASE, case.id).await;
        self.context
            .set(session_keys::IMAGE_URL, case.image_url.clone())
            .await;
        self.context.set(session_keys::REPORT_TEXT, "").await;
        self.context.remove(session_keys::CLASSIFICATION).await;
        self.context.remove(session_keys::ACTIONABLE_FINDINGS).await;
        self.set_stage(Stage::CaseLoaded).await;
    }

    /// The current report, or an empty string.
    pub async fn report(&self) -> String {
        self.context
            .get(session_keys::REPORT_TEXT)
            .await
            .unwrap_or_default()
    }

    /// Replace the report wholesale. Last writer wins.
    pub async fn set_report(&self, text: impl Into<String>) {
        self.context
            .set(session_keys::REPORT_TEXT, text.into())
            .await;
    }

    pub async fn classification(&self) -> Option<Classification> {
        self.context.get(session_keys::CLASSIFICATION).await
    }

    pub async fn set_classification(&self, classification: &Classification) {
        self.context
            .set(session_keys::CLASSIFICATION, classification)
            .await;
    }

    pub async fn actionable_findings(&self) -> Vec<Finding> {
        self.context
            .get(session_keys::ACTIONABLE_FINDINGS)
            .await
            .unwrap_or_default()
    }

    pub async fn set_actionable_findings(&self, findings: &[Finding]) {
        self.context
            .set(session_keys::ACTIONABLE_FINDINGS, findings)
            .await;
    }

    /// The stored notification address, or an empty string.
    pub async fn notification_email(&self) -> String {
        self.context
            .get(session_keys::NOTIFICATION_EMAIL)
            .await
            .unwrap_or_default()
    }

    /// Callers validate the address first.
    pub(crate) async fn store_notification_email(&self, email: &str) {
        self.context
            .set(session_keys::NOTIFICATION_EMAIL, email.to_string())
            .await;
    }

    pub async fn stage(&self) -> Stage {
        self.context
            .get(session_keys::STAGE)
            .await
            .unwrap_or(Stage::NoCase)
    }

    pub async fn set_stage(&self, stage: Stage) {
        self.context.set(session_keys::STAGE, stage).await;
    }

    pub async fn snapshot(&self) -> WorkstationSnapshot {
        WorkstationSnapshot {
            current_case: self.current_case().await,
            image_url: self.image_url().await,
            report: self.report().await,
            notification_email: self.notification_email().await,
            stage: self.stage().await,
            classification: self.classification().await,
            actionable_findings: self.actionable_findings().await,
        }
    }
}
