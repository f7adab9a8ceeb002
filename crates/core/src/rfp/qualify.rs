use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::opportunity::{Opportunity, QualificationOutcome, RankedOpportunity};

/// How many prioritized opportunities are surfaced to the user. The full
/// ranked list stays on session state.
pub const TOP_PRESENTED: usize = 5;

const DEADLINE_POINTS: u8 = 30;
const VALUE_POINTS: u8 = 40;
const LOCATION_POINTS: u8 = 30;
const QUALIFICATION_THRESHOLD: u8 = 60;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualificationCriteria {
    pub minimum_value: Decimal,
    pub preferred_locations: Vec<String>,
    pub minimum_days_remaining: i64,
}

impl Default for QualificationCriteria {
    fn default() -> Self {
        Self {
            minimum_value: Decimal::new(1_000_000, 0),
            preferred_locations: vec![
                "Delhi".to_owned(),
                "Mumbai".to_owned(),
                "Pune".to_owned(),
                "Ahmedabad".to_owned(),
            ],
            minimum_days_remaining: 7,
        }
    }
}

pub fn days_remaining(deadline: NaiveDate, today: NaiveDate) -> i64 {
    deadline.signed_duration_since(today).num_days()
}

/// Rule-based qualification. A deadline inside the minimum window disqualifies
/// outright; value and location still contribute to the score so the caller can
/// report how close the opportunity came.
pub fn qualify_opportunity(
    opportunity: &Opportunity,
    criteria: &QualificationCriteria,
    today: NaiveDate,
) -> QualificationOutcome {
    let days = days_remaining(opportunity.submission_deadline, today);
    let mut score: u8 = 0;
    let mut reasons = Vec::new();

    let deadline_disqualified = days < criteria.minimum_days_remaining;
    if deadline_disqualified {
        reasons.push(format!(
            "submission deadline is {days} days away, under the {} day minimum",
            criteria.minimum_days_remaining
        ));
    } else {
        score += DEADLINE_POINTS;
        reasons.push(format!("submission deadline is {days} days away"));
    }

    if opportunity.estimated_value >= criteria.minimum_value {
        score += VALUE_POINTS;
        reasons.push(format!(
            "estimated value {} meets the {} minimum",
            opportunity.estimated_value, criteria.minimum_value
        ));
    } else {
        reasons.push(format!(
            "estimated value {} is under the {} minimum",
            opportunity.estimated_value, criteria.minimum_value
        ));
    }

    let location = opportunity.location.trim();
    let location_preferred = criteria.preferred_locations.is_empty()
        || criteria.preferred_locations.iter().any(|preferred| {
            preferred.trim().eq_ignore_ascii_case(location)
        });
    if location_preferred {
        score += LOCATION_POINTS;
        reasons.push(format!("location {location} is in the preferred set"));
    } else {
        reasons.push(format!("location {location} is outside the preferred set"));
    }

    QualificationOutcome {
        qualified: !deadline_disqualified && score >= QUALIFICATION_THRESHOLD,
        score,
        reasons,
    }
}

/// Rank qualified-or-not opportunities by urgency-adjusted score. Sort is
/// stable, so ties keep their input order.
pub fn prioritize(
    evaluated: Vec<(Opportunity, QualificationOutcome)>,
    today: NaiveDate,
) -> Vec<RankedOpportunity> {
    let mut ranked: Vec<RankedOpportunity> = evaluated
        .into_iter()
        .map(|(opportunity, qualification)| {
            let days = days_remaining(opportunity.submission_deadline, today);
            let priority_score = i64::from(qualification.score) + (100 - days);
            RankedOpportunity { opportunity, qualification, days_remaining: days, priority_score }
        })
        .collect();

    ranked.sort_by(|a, b| b.priority_score.cmp(&a.priority_score));
    ranked
}
