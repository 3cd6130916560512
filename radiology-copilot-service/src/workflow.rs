//! Tool eligibility as an explicit stage contract.
//!
//! The stages form a chain `NoCase -> CaseLoaded -> Classified -> Reported`.
//! A tool names the stage it needs and is refused when the session has not
//! reached it yet. Loading a case always resets the chain to `CaseLoaded`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use tracing::info;

use crate::workstation::Workstation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    NoCase,
    CaseLoaded,
    Classified,
    Reported,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::NoCase => "no_case",
            Stage::CaseLoaded => "case_loaded",
            Stage::Classified => "classified",
            Stage::Reported => "reported",
        };
        f.write_str(name)
    }
}

/// A tool was called before its required stage was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreconditionFailed {
    pub tool: &'static str,
    pub required: Stage,
    pub current: Stage,
}

impl PreconditionFailed {
    pub fn to_json(&self) -> Value {
        json!({
            "error": "precondition_failed",
            "tool": self.tool,
            "required": self.required,
            "current": self.current,
        })
    }
}

/// Refuse `tool` unless the session has reached `required`.
pub async fn require(
    station: &Workstation,
    tool: &'static str,
    required: Stage,
) -> Result<(), PreconditionFailed> {
    let current = station.stage().await;
    if current >= required {
        Ok(())
    } else {
        info!(tool, %required, %current, "Tool refused, stage not reached");
        Err(PreconditionFailed {
            tool,
            required,
            current,
        })
    }
}

/// Move forward to `stage`. Never moves backwards; only opening a case does that.
pub async fn advance(station: &Workstation, stage: Stage) {
    if station.stage().await < stage {
        station.set_stage(stage).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use copilot_flow::Context;

    #[tokio::test]
    async fn test_report_requires_classification() {
        let station = Workstation::new(Context::new());
        station.set_stage(Stage::CaseLoaded).await;

        let refused = require(&station, "generate_report", Stage::Classified)
            .await
            .unwrap_err();
        assert_eq!(refused.current, Stage::CaseLoaded);
        assert_eq!(
            refused.to_json(),
            json!({
                "error": "precondition_failed",
                "tool": "generate_report",
                "required": "classified",
                "current": "case_loaded",
            })
        );

        advance(&station, Stage::Classified).await;
        assert!(require(&station, "generate_report", Stage::Classified).await.is_ok());
    }

    #[tokio::test]
    async fn test_advance_never_moves_backwards() {
        let station = Workstation::new(Context::new());
        advance(&station, Stage::Reported).await;
        advance(&station, Stage::Classified).await;
        assert_eq!(station.stage().await, Stage::Reported);
        assert!(require(&station, "update_report", Stage::Reported).await.is_ok());
    }
}
