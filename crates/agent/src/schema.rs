//! Strict contracts for model responses. A response either deserializes into
//! the expected shape or the call fails as a generation error; prose is never
//! scraped for values.

use serde::{Deserialize, Serialize};

use tenderflow_core::errors::DomainError;

/// Qualification verdict the model must return as a single JSON object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualificationAssist {
    pub qualified: bool,
    pub score: u8,
    pub reasons: Vec<String>,
}

pub fn parse_qualification_assist(raw: &str) -> Result<QualificationAssist, DomainError> {
    let assist: QualificationAssist = serde_json::from_str(raw.trim()).map_err(|err| {
        DomainError::Generation(format!("qualification response violates the schema: {err}"))
    })?;

    if assist.score > 100 {
        return Err(DomainError::Generation(format!(
            "qualification score {} is outside the 0-100 range",
            assist.score
        )));
    }

    Ok(assist)
}

/// The executive summary contract is plain text: non-empty after trimming.
pub fn validate_summary(raw: &str) -> Result<String, DomainError> {
    let summary = raw.trim();
    if summary.is_empty() {
        return Err(DomainError::Generation("summary response was empty".to_owned()));
    }
    Ok(summary.to_owned())
}
