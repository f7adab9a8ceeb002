use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::matching::{CriterionVerdict, MatchResult, VerdictKind};
use crate::domain::product::Product;

/// How many ranked matches a single requirement yields.
pub const TOP_MATCHES: usize = 3;

const CORES_CLOSE_TOLERANCE: u32 = 2;

/// Structured requirement extracted from free-form tender text. Unset
/// attributes are excluded from scoring entirely: they contribute to neither
/// the achieved points nor the denominator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementSignature {
    pub voltage_grade: Option<String>,
    pub insulation: Option<String>,
    pub cores: Option<u32>,
    pub conductor_size_sqmm: Option<Decimal>,
    pub conductor_material: Option<String>,
    pub armoured: Option<bool>,
    pub cable_type: Option<String>,
    pub application: Option<String>,
}

impl RequirementSignature {
    pub fn set_count(&self) -> usize {
        [
            self.voltage_grade.is_some(),
            self.insulation.is_some(),
            self.cores.is_some(),
            self.conductor_size_sqmm.is_some(),
            self.conductor_material.is_some(),
            self.armoured.is_some(),
            self.cable_type.is_some(),
            self.application.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }
}

// Decimal classes listed before their integer prefixes so "1.1 kv" never
// resolves through a plain "1 kv" token.
const VOLTAGE_CLASSES: &[(&str, &str)] = &[
    ("1.1 kv", "1.1 kV"),
    ("1.1kv", "1.1 kV"),
    ("3.3 kv", "3.3 kV"),
    ("3.3kv", "3.3 kV"),
    ("6.6 kv", "6.6 kV"),
    ("6.6kv", "6.6 kV"),
    ("11 kv", "11 kV"),
    ("11kv", "11 kV"),
    ("22 kv", "22 kV"),
    ("22kv", "22 kV"),
    ("33 kv", "33 kV"),
    ("33kv", "33 kV"),
    ("66 kv", "66 kV"),
    ("66kv", "66 kV"),
    ("450/750 v", "450/750 V"),
    ("450/750v", "450/750 V"),
    ("300/500 v", "300/500 V"),
    ("300/500v", "300/500 V"),
];

pub fn extract_signature(text: &str) -> RequirementSignature {
    let normalized = text.to_lowercase();
    let tokens = tokenize(&normalized);

    RequirementSignature {
        voltage_grade: extract_voltage(&normalized),
        insulation: extract_insulation(&normalized, &tokens),
        cores: extract_cores(&tokens),
        conductor_size_sqmm: extract_size(&tokens),
        conductor_material: extract_conductor(&normalized),
        armoured: extract_armour(&normalized),
        cable_type: extract_cable_type(&normalized),
        application: extract_application(&normalized),
    }
}

fn tokenize(normalized: &str) -> Vec<&str> {
    normalized
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '(' | ')' | 'x' | '*'))
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric() && !matches!(c, '.' | '/')))
        .filter(|token| !token.is_empty())
        .collect()
}

fn extract_voltage(normalized: &str) -> Option<String> {
    VOLTAGE_CLASSES
        .iter()
        .find(|(token, _)| normalized.contains(token))
        .map(|(_, canonical)| (*canonical).to_owned())
}

fn extract_insulation(normalized: &str, tokens: &[&str]) -> Option<String> {
    if normalized.contains("xlpe") {
        return Some("XLPE".to_owned());
    }
    if normalized.contains("fr-lsh") || normalized.contains("frlsh") {
        return Some("FR-LSH".to_owned());
    }
    if normalized.contains("pvc") {
        return Some("PVC".to_owned());
    }
    if normalized.contains("rubber") {
        return Some("Rubber".to_owned());
    }
    // "pe" must be a standalone token; it is a substring of too many words.
    if tokens.iter().any(|token| *token == "pe") {
        return Some("PE".to_owned());
    }
    None
}

fn extract_cores(tokens: &[&str]) -> Option<u32> {
    for (index, token) in tokens.iter().enumerate() {
        if let Some(prefix) = token.strip_suffix('c') {
            if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit() || c == '.') {
                if let Some(cores) = parse_count(prefix) {
                    return Some(cores);
                }
            }
        }
        if matches!(*token, "core" | "cores") && index > 0 {
            if let Some(cores) = parse_count(tokens[index - 1]) {
                return Some(cores);
            }
        }
    }
    None
}

fn parse_count(token: &str) -> Option<u32> {
    token.parse::<Decimal>().ok().and_then(|value| value.to_u32())
}

fn extract_size(tokens: &[&str]) -> Option<Decimal> {
    for (index, token) in tokens.iter().enumerate() {
        if matches!(*token, "sqmm" | "sq.mm") {
            if index > 0 {
                if let Ok(size) = tokens[index - 1].parse::<Decimal>() {
                    return Some(size);
                }
            }
            continue;
        }
        if let Some(prefix) = token.strip_suffix("sqmm") {
            if let Ok(size) = prefix.parse::<Decimal>() {
                return Some(size);
            }
        }
    }
    None
}

fn extract_conductor(normalized: &str) -> Option<String> {
    if normalized.contains("copper") {
        return Some("Copper".to_owned());
    }
    if normalized.contains("aluminium") || normalized.contains("aluminum") {
        return Some("Aluminium".to_owned());
    }
    None
}

fn extract_armour(normalized: &str) -> Option<bool> {
    if normalized.contains("unarmoured") || normalized.contains("unarmored") {
        return Some(false);
    }
    if normalized.contains("armour") || normalized.contains("armored") {
        return Some(true);
    }
    None
}

fn extract_cable_type(normalized: &str) -> Option<String> {
    if normalized.contains("control") {
        return Some("Control".to_owned());
    }
    if normalized.contains("instrumentation") {
        return Some("Instrumentation".to_owned());
    }
    if normalized.contains("flexible") {
        return Some("Flexible".to_owned());
    }
    if normalized.contains("power") {
        return Some("Power".to_owned());
    }
    None
}

fn extract_application(normalized: &str) -> Option<String> {
    if normalized.contains("underground") {
        return Some("Underground".to_owned());
    }
    if normalized.contains("overhead") {
        return Some("Overhead".to_owned());
    }
    None
}

fn voltage_eq(left: &str, right: &str) -> bool {
    let squash = |value: &str| {
        value.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase()
    };
    squash(left) == squash(right)
}

fn text_eq(left: &str, right: &str) -> bool {
    canonical_material(left) == canonical_material(right)
}

fn canonical_material(value: &str) -> String {
    let lowered = value.trim().to_lowercase();
    if lowered == "aluminum" {
        "aluminium".to_owned()
    } else {
        lowered
    }
}

/// Score one product against one requirement signature. Returns awarded points
/// and the per-criterion verdict list, covering only the set attributes.
pub fn score_product(
    signature: &RequirementSignature,
    product: &Product,
) -> (Decimal, Vec<CriterionVerdict>) {
    let attrs = &product.attributes;
    let mut points = Decimal::ZERO;
    let mut verdicts = Vec::new();

    let mut record = |attribute: &str, verdict: VerdictKind, points: &mut Decimal| {
        match verdict {
            VerdictKind::Exact => *points += Decimal::ONE,
            VerdictKind::Partial => *points += Decimal::new(5, 1),
            VerdictKind::Miss => {}
        }
        verdicts.push(CriterionVerdict { attribute: attribute.to_owned(), verdict });
    };

    if let Some(required) = &signature.voltage_grade {
        let verdict = match &attrs.voltage_grade {
            Some(actual) if voltage_eq(required, actual) => VerdictKind::Exact,
            _ => VerdictKind::Miss,
        };
        record("voltage_grade", verdict, &mut points);
    }

    if let Some(required) = &signature.insulation {
        let verdict = match &attrs.insulation {
            Some(actual) if actual.trim().eq_ignore_ascii_case(required) => VerdictKind::Exact,
            _ => VerdictKind::Miss,
        };
        record("insulation", verdict, &mut points);
    }

    if let Some(required) = signature.cores {
        let verdict = match attrs.cores {
            Some(actual) if actual == required => VerdictKind::Exact,
            Some(actual) if actual.abs_diff(required) <= CORES_CLOSE_TOLERANCE => {
                VerdictKind::Partial
            }
            _ => VerdictKind::Miss,
        };
        record("cores", verdict, &mut points);
    }

    if let Some(required) = signature.conductor_size_sqmm {
        let verdict = match attrs.conductor_size_sqmm {
            Some(actual) if actual == required => VerdictKind::Exact,
            Some(actual) if size_is_close(actual, required) => VerdictKind::Partial,
            _ => VerdictKind::Miss,
        };
        record("conductor_size_sqmm", verdict, &mut points);
    }

    if let Some(required) = &signature.conductor_material {
        let verdict = match &attrs.conductor_material {
            Some(actual) if text_eq(actual, required) => VerdictKind::Exact,
            _ => VerdictKind::Miss,
        };
        record("conductor_material", verdict, &mut points);
    }

    if let Some(required) = signature.armoured {
        let verdict = match attrs.armoured {
            Some(actual) if actual == required => VerdictKind::Exact,
            _ => VerdictKind::Miss,
        };
        record("armoured", verdict, &mut points);
    }

    if let Some(required) = &signature.cable_type {
        let verdict = match &attrs.cable_type {
            Some(actual) if actual.trim().eq_ignore_ascii_case(required) => VerdictKind::Exact,
            _ => VerdictKind::Miss,
        };
        record("cable_type", verdict, &mut points);
    }

    if let Some(required) = &signature.application {
        let verdict = match &attrs.application {
            Some(actual) if actual.trim().eq_ignore_ascii_case(required) => VerdictKind::Exact,
            _ => VerdictKind::Miss,
        };
        record("application", verdict, &mut points);
    }

    (points, verdicts)
}

fn size_is_close(actual: Decimal, required: Decimal) -> bool {
    if required.is_zero() {
        return false;
    }
    let relative = ((actual - required) / required).abs();
    relative <= Decimal::new(25, 2)
}

/// Rank catalog products for one requirement text. A text yielding no
/// extractable attributes produces an empty list, never an error.
pub fn match_products(requirement_text: &str, catalog: &[Product]) -> Vec<MatchResult> {
    let signature = extract_signature(requirement_text);
    let set_count = signature.set_count();
    if set_count == 0 {
        return Vec::new();
    }

    let denominator = Decimal::from(set_count as u64);
    let mut results: Vec<MatchResult> = catalog
        .iter()
        .map(|product| {
            let (points, verdicts) = score_product(&signature, product);
            let match_pct = (points / denominator * Decimal::ONE_HUNDRED).round_dp(2);
            MatchResult { product: product.clone(), match_pct, verdicts }
        })
        .collect();

    results.sort_by(|a, b| b.match_pct.cmp(&a.match_pct));
    results.truncate(TOP_MATCHES);
    results
}
