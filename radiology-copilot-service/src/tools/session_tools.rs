//! The agent-facing tools.
//!
//! Each tool is bound to one session's `Workstation` and the shared
//! `Toolkit`. Failures are answered as `{"error": ...}` values so the agent
//! can explain them; `ToolError` is reserved for output that cannot be
//! serialized at all.

use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use super::Toolkit;
use crate::models::FindingsInput;
use crate::workflow::{self, Stage};
use crate::workstation::Workstation;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

macro_rules! session_tool {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Clone)]
            pub struct $name {
                station: Workstation,
                kit: Arc<Toolkit>,
            }

            impl $name {
                pub fn new(station: Workstation, kit: Arc<Toolkit>) -> Self {
                    Self { station, kit }
                }
            }
        )*
    };
}

/// Tools that read only shared data and never touch the session.
macro_rules! shared_tool {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Clone)]
            pub struct $name {
                kit: Arc<Toolkit>,
            }

            impl $name {
                pub fn new(kit: Arc<Toolkit>) -> Self {
                    Self { kit }
                }
            }
        )*
    };
}

shared_tool!(ListAvailableCases, SearchRecords);

session_tool!(
    LoadCase,
    InterpretXray,
    GenerateReport,
    UpdateReport,
    SearchActionableFindings,
    SendNotification,
    UpdateNotificationEmail,
    GetNotificationEmail,
    GetClinicalData,
);

#[derive(Debug, Default, Deserialize)]
pub struct NoArgs {}

#[derive(Debug, Deserialize)]
pub struct LoadCaseArgs {
    pub case_number: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct InterpretXrayArgs {
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateReportArgs {
    #[serde(default)]
    pub findings: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReportArgs {
    pub requested_changes: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SendNotificationArgs {
    #[serde(default)]
    pub findings: Value,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailArgs {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchRecordsArgs {
    pub kind: String,
    pub query: String,
}

fn no_parameters() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// Case numbers arrive as numbers or as numeric strings depending on the model.
fn case_number(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl Tool for LoadCase {
    const NAME: &'static str = "load_case";
    type Error = ToolError;
    type Args = LoadCaseArgs;
    type Output = Value;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Open a case on the workstation by its number. Discards the current report."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "case_number": { "type": "integer", "description": "Case number, e.g. 101" }
                },
                "required": ["case_number"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let case = case_number(&args.case_number).and_then(|id| self.kit.cases.get(id));
        let Some(case) = case else {
            info!(case_number = %args.case_number, "Unknown case requested");
            return Ok(json!({
                "success": false,
                "error": "unknown_case",
                "available_cases": self.kit.cases.ids(),
            }));
        };

        self.station.open_case(case).await;
        info!(case_id = case.id, "Case loaded");
        Ok(json!({
            "success": true,
            "case_number": case.id,
            "image_url": case.image_url,
            "message": format!("Case {} loaded.", case.id),
        }))
    }
}

impl Tool for ListAvailableCases {
    const NAME: &'static str = "list_available_cases";
    type Error = ToolError;
    type Args = NoArgs;
    type Output = Value;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "List the case numbers available on the worklist.".to_string(),
            parameters: no_parameters(),
        }
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        Ok(json!({ "cases": self.kit.cases.ids() }))
    }
}

impl Tool for InterpretXray {
    const NAME: &'static str = "interpret_xray";
    type Error = ToolError;
    type Args = InterpretXrayArgs;
    type Output = Value;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Classify a chest x-ray. Returns a probability per condition. Defaults to the loaded case image."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "image_url": { "type": "string", "description": "Image to classify instead of the loaded one" }
                }
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let explicit = args.image_url.filter(|url| !url.trim().is_empty());
        let image_url = match explicit {
            Some(url) => url,
            None => {
                if let Err(refused) = workflow::require(&self.station, Self::NAME, Stage::CaseLoaded).await {
                    return Ok(refused.to_json());
                }
                match self.station.image_url().await {
                    Some(url) => url,
                    None => return Ok(json!({ "error": "no_image" })),
                }
            }
        };

        match self.kit.classifier.classify(&image_url).await {
            Ok(classification) => {
                self.station.set_classification(&classification).await;
                workflow::advance(&self.station, Stage::Classified).await;
                Ok(serde_json::to_value(classification)?)
            }
            Err(e) => Ok(e.to_json()),
        }
    }
}

impl Tool for GenerateReport {
    const NAME: &'static str = "generate_report";
    type Error = ToolError;
    type Args = GenerateReportArgs;
    type Output = Value;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Draft a structured chest radiograph report from the image interpretation. Replaces the current report."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "findings": { "description": "Findings to report on. Defaults to the last interpretation." }
                }
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        if let Err(refused) = workflow::require(&self.station, Self::NAME, Stage::Classified).await {
            return Ok(refused.to_json());
        }

        let findings = match args.findings {
            Some(Value::String(text)) if !text.trim().is_empty() => text,
            Some(value @ (Value::Object(_) | Value::Array(_))) => value.to_string(),
            _ => serde_json::to_string(&self.station.classification().await.unwrap_or_default())?,
        };

        let report = self.kit.drafter.draft(&self.station, &findings).await;
        if !report.is_empty() {
            workflow::advance(&self.station, Stage::Reported).await;
        }
        Ok(json!({ "report": report }))
    }
}

impl Tool for UpdateReport {
    const NAME: &'static str = "update_report";
    type Error = ToolError;
    type Args = UpdateReportArgs;
    type Output = Value;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Apply the radiologist's requested changes to the current report.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "requested_changes": { "type": "string", "description": "The edits, in the user's words" }
                },
                "required": ["requested_changes"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        if let Err(refused) = workflow::require(&self.station, Self::NAME, Stage::Reported).await {
            return Ok(refused.to_json());
        }
        let report = self
            .kit
            .drafter
            .revise(&self.station, &args.requested_changes)
            .await;
        Ok(json!({ "report": report }))
    }
}

impl Tool for SearchActionableFindings {
    const NAME: &'static str = "search_actionable_findings";
    type Error = ToolError;
    type Args = NoArgs;
    type Output = Value;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Find critical or actionable findings in the current report.".to_string(),
            parameters: no_parameters(),
        }
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        if let Err(refused) = workflow::require(&self.station, Self::NAME, Stage::Reported).await {
            return Ok(refused.to_json());
        }
        let findings = self.kit.findings.extract(&self.station).await;
        Ok(json!({ "findings": serde_json::to_value(findings)? }))
    }
}

impl Tool for SendNotification {
    const NAME: &'static str = "send_notification";
    type Error = ToolError;
    type Args = SendNotificationArgs;
    type Output = Value;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Email findings to the responsible provider. Uses the stored notification email unless one is given."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "findings": { "description": "Findings as returned by search_actionable_findings, a list of findings, or plain text. Defaults to the last extracted findings." },
                    "email": { "type": "string", "description": "Recipient for this notification only" }
                }
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let findings = match args.findings {
            Value::Null => FindingsInput::Structured(self.station.actionable_findings().await),
            value => FindingsInput::resolve(value),
        };
        let outcome = self
            .kit
            .notifier
            .notify(&self.station, findings, args.email)
            .await;
        Ok(serde_json::to_value(outcome)?)
    }
}

impl Tool for UpdateNotificationEmail {
    const NAME: &'static str = "update_notification_email";
    type Error = ToolError;
    type Args = EmailArgs;
    type Output = Value;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Change the email address notifications are sent to.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": { "email": { "type": "string" } },
                "required": ["email"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        if self.kit.notifier.set_email(&self.station, &args.email).await {
            Ok(json!({ "success": true, "email": args.email.trim() }))
        } else {
            Ok(json!({ "success": false, "error": "invalid_email" }))
        }
    }
}

impl Tool for GetNotificationEmail {
    const NAME: &'static str = "get_notification_email";
    type Error = ToolError;
    type Args = NoArgs;
    type Output = Value;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "The email address notifications are currently sent to (empty when unset)."
                .to_string(),
            parameters: no_parameters(),
        }
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        Ok(json!({ "email": self.kit.notifier.get_email(&self.station).await }))
    }
}

impl Tool for GetClinicalData {
    const NAME: &'static str = "get_clinical_data_from_patient";
    type Error = ToolError;
    type Args = NoArgs;
    type Output = Value;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Clinical history of the patient in the loaded case, as markdown, newest entry first."
                .to_string(),
            parameters: no_parameters(),
        }
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        if let Err(refused) = workflow::require(&self.station, Self::NAME, Stage::CaseLoaded).await {
            return Ok(refused.to_json());
        }
        let chart = match self.station.current_case().await {
            Some(study_id) => self.kit.records.chart_markdown(study_id),
            None => None,
        };
        Ok(match chart {
            Some(markdown) => json!({ "clinical_history": markdown }),
            None => json!({ "error": "no_clinical_data" }),
        })
    }
}

impl Tool for SearchRecords {
    const NAME: &'static str = "search_records";
    type Error = ToolError;
    type Args = SearchRecordsArgs;
    type Output = Value;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Search clinical records by study id or patient MRN (substring match).".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "kind": { "type": "string", "enum": ["Study ID", "Patient MRN"] },
                    "query": { "type": "string" }
                },
                "required": ["kind", "query"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let table = self.kit.records.search_by_label(&args.kind, &args.query);
        Ok(serde_json::to_value(table)?)
    }
}
