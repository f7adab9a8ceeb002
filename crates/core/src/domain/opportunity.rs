use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpportunityId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: OpportunityId,
    pub alias: Option<String>,
    pub title: String,
    pub client: String,
    pub description: String,
    pub estimated_value: Decimal,
    pub submission_deadline: NaiveDate,
    pub location: String,
    pub line_items: Vec<LineItem>,
}

impl Opportunity {
    /// True when `token` names this opportunity by canonical id or ingestion alias.
    pub fn identifier_matches(&self, token: &str) -> bool {
        let token = token.trim();
        if token.eq_ignore_ascii_case(&self.id.0) {
            return true;
        }
        self.alias.as_deref().is_some_and(|alias| token.eq_ignore_ascii_case(alias))
    }
}

/// External records arrive with either `id` or `rfp_id` populated. The adapter
/// collapses them into one canonical identifier at the ingestion edge and keeps
/// the secondary spelling as an alias so selection by either still resolves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawOpportunityRecord {
    pub id: Option<String>,
    pub rfp_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub description: String,
    pub estimated_value: Decimal,
    pub submission_deadline: NaiveDate,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

impl RawOpportunityRecord {
    pub fn normalize(self) -> Result<Opportunity, DomainError> {
        let (canonical, alias) = match (self.id, self.rfp_id) {
            (Some(id), Some(rfp_id)) if id != rfp_id => (id, Some(rfp_id)),
            (Some(id), _) => (id, None),
            (None, Some(rfp_id)) => (rfp_id, None),
            (None, None) => {
                return Err(DomainError::InvariantViolation(
                    "opportunity record carries neither id nor rfp_id".to_owned(),
                ))
            }
        };

        Ok(Opportunity {
            id: OpportunityId(canonical),
            alias,
            title: self.title,
            client: self.client,
            description: self.description,
            estimated_value: self.estimated_value,
            submission_deadline: self.submission_deadline,
            location: self.location,
            line_items: self.line_items,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualificationOutcome {
    pub qualified: bool,
    pub score: u8,
    pub reasons: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedOpportunity {
    pub opportunity: Opportunity,
    pub qualification: QualificationOutcome,
    pub days_remaining: i64,
    pub priority_score: i64,
}
