use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A sample study available for review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub id: u32,
    pub image_url: String,
}

/// Probability per named condition, as returned by the image classifier.
pub type Classification = BTreeMap<String, f64>;

/// Urgency tier of an actionable finding.
///
/// Anything outside the three known tiers is kept verbatim so that it can
/// still be rendered in a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Urgency {
    Critical,
    Urgent,
    Routine,
    Other(String),
}

impl From<String> for Urgency {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" => Urgency::Critical,
            "urgent" => Urgency::Urgent,
            "routine" => Urgency::Routine,
            _ => Urgency::Other(value),
        }
    }
}

impl From<Urgency> for String {
    fn from(value: Urgency) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Urgency::Critical => f.write_str("Critical"),
            Urgency::Urgent => f.write_str("Urgent"),
            Urgency::Routine => f.write_str("Routine"),
            Urgency::Other(raw) => f.write_str(raw),
        }
    }
}

/// A clinical observation with an urgency tier and a recommended action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(default)]
    pub finding: String,
    #[serde(default = "unspecified_urgency")]
    pub urgency: Urgency,
    #[serde(default)]
    pub recommendation: String,
}

fn unspecified_urgency() -> Urgency {
    Urgency::Other(String::new())
}

impl Finding {
    /// Stand-in for findings that arrived as free text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            finding: text.into(),
            urgency: Urgency::Other("High".to_string()),
            recommendation: "Please review".to_string(),
        }
    }
}

/// Findings handed to the notification client, resolved once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindingsInput {
    RawText(String),
    Structured(Vec<Finding>),
}

impl FindingsInput {
    /// Accepts a JSON-encoded array, a JSON object with a `findings` key, an
    /// already-structured array or object, or plain text.
    pub fn resolve(value: Value) -> Self {
        match value {
            Value::String(text) => match serde_json::from_str::<Value>(&text) {
                Ok(parsed @ (Value::Array(_) | Value::Object(_))) => {
                    Self::from_structured(parsed).unwrap_or(Self::RawText(text))
                }
                // A JSON string literal carries the text itself
                Ok(Value::String(inner)) => Self::RawText(inner),
                _ => Self::RawText(text),
            },
            other => {
                let fallback = other.to_string();
                Self::from_structured(other).unwrap_or(Self::RawText(fallback))
            }
        }
    }

    fn from_structured(value: Value) -> Option<Self> {
        let list = match value {
            Value::Object(mut map) => match map.remove("findings") {
                Some(inner @ Value::Array(_)) => inner,
                Some(Value::String(text)) => return Some(Self::resolve(Value::String(text))),
                Some(_) => return None,
                None => Value::Array(vec![Value::Object(map)]),
            },
            list @ Value::Array(_) => list,
            _ => return None,
        };
        serde_json::from_value::<Vec<Finding>>(list)
            .ok()
            .map(Self::Structured)
    }

    pub fn into_findings(self) -> Vec<Finding> {
        match self {
            Self::RawText(text) => vec![Finding::from_text(text)],
            Self::Structured(findings) => findings,
        }
    }
}

/// Result of a notification attempt, shaped for the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NotificationOutcome {
    pub fn sent(email: impl Into<String>) -> Self {
        Self {
            success: true,
            email: Some(email.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            email: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportUpdateRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmailUpdateRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordSearchQuery {
    pub kind: String,
    pub query: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_urgency_keeps_unknown_tiers() {
        let finding: Finding = serde_json::from_value(json!({
            "finding": "Pneumothorax",
            "urgency": "critical",
            "recommendation": "Immediate intervention required"
        }))
        .unwrap();
        assert_eq!(finding.urgency, Urgency::Critical);

        let odd: Urgency = "Semi-urgent".to_string().into();
        assert_eq!(odd.to_string(), "Semi-urgent");
        assert_eq!(serde_json::to_value(Urgency::Routine).unwrap(), json!("Routine"));
    }

    #[test]
    fn test_resolve_json_encoded_array() {
        let raw = json!(r#"[{"finding": "Mass", "urgency": "Urgent", "recommendation": "CT"}]"#);
        let FindingsInput::Structured(findings) = FindingsInput::resolve(raw) else {
            panic!("expected structured findings");
        };
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].urgency, Urgency::Urgent);
    }

    #[test]
    fn test_resolve_object_with_findings_key() {
        let raw = json!({"findings": [
            {"finding": "Effusion", "urgency": "Routine", "recommendation": "Follow up"},
            {"finding": "Cardiomegaly", "urgency": "Routine", "recommendation": "Echo"}
        ]});
        assert!(matches!(
            FindingsInput::resolve(raw),
            FindingsInput::Structured(ref f) if f.len() == 2
        ));
    }

    #[test]
    fn test_resolve_plain_text_falls_back() {
        let input = FindingsInput::resolve(json!("Large pleural effusion"));
        assert_eq!(input, FindingsInput::RawText("Large pleural effusion".into()));

        let findings = input.into_findings();
        assert_eq!(findings[0].urgency.to_string(), "High");
        assert_eq!(findings[0].recommendation, "Please review");
    }

    #[test]
    fn test_resolve_json_string_literal() {
        let input = FindingsInput::resolve(json!(r#""Large pleural effusion""#));
        assert_eq!(input, FindingsInput::RawText("Large pleural effusion".into()));
    }

    #[test]
    fn test_notification_outcome_shape() {
        let value = serde_json::to_value(NotificationOutcome::failed("no_email")).unwrap();
        assert_eq!(value, json!({"success": false, "error": "no_email"}));
    }
}
