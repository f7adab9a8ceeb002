use crate::domain::opportunity::RankedOpportunity;
use crate::errors::DomainError;

const SCAN_KEYWORDS: [&str; 4] = ["scan", "find", "search", "look for"];
const SELECTION_KEYWORDS: [&str; 4] = ["select", "choose", "pick", "analyze"];

/// What the user's message asks for. Total over all inputs: anything the
/// classifier cannot place lands in `Neither`, never in an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    Scan,
    Selection,
    Neither,
}

pub fn classify(message: &str, opportunities: &[RankedOpportunity]) -> Intent {
    let text = message.trim().to_lowercase();
    if text.is_empty() {
        return Intent::Neither;
    }

    if text.chars().all(|ch| ch.is_ascii_digit()) {
        return Intent::Selection;
    }
    if SELECTION_KEYWORDS.iter().any(|keyword| text.contains(keyword)) {
        return Intent::Selection;
    }
    if opportunities
        .iter()
        .any(|ranked| ranked.opportunity.identifier_matches(&text))
    {
        return Intent::Selection;
    }
    if SCAN_KEYWORDS.iter().any(|keyword| text.contains(keyword)) {
        return Intent::Scan;
    }

    Intent::Neither
}

/// Resolve a selection utterance to a zero-based position in the ranked list.
/// Accepts a 1-based ordinal, an opportunity id, or an alias; ordinals outside
/// the list reject rather than clamp.
pub fn parse_selection_token(
    message: &str,
    opportunities: &[RankedOpportunity],
) -> Result<usize, DomainError> {
    let trimmed = message.trim();

    if let Some(position) = position_of_identifier(trimmed, opportunities) {
        return Ok(position);
    }

    for token in trimmed
        .split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'))
        .filter(|token| !token.is_empty())
    {
        if token.chars().all(|ch| ch.is_ascii_digit()) {
            let ordinal: usize = token
                .parse()
                .map_err(|_| DomainError::Selection(format!("ordinal {token} is out of range")))?;
            if ordinal >= 1 && ordinal <= opportunities.len() {
                return Ok(ordinal - 1);
            }
            return Err(DomainError::Selection(format!(
                "ordinal {ordinal} is outside the presented list of {}",
                opportunities.len()
            )));
        }
        if let Some(position) = position_of_identifier(token, opportunities) {
            return Ok(position);
        }
    }

    Err(DomainError::Selection(format!("no opportunity matches '{trimmed}'")))
}

fn position_of_identifier(token: &str, opportunities: &[RankedOpportunity]) -> Option<usize> {
    opportunities
        .iter()
        .position(|ranked| ranked.opportunity.identifier_matches(token))
}
